//! 저장소 통합 테스트.
//!
//! ## 테스트 실행 조건
//!
//! 환경 변수 `DATABASE_URL`이 설정되어 있어야 합니다 (PostgreSQL, TimescaleDB 확장은 선택).
//! 설정되지 않은 경우 테스트가 건너뛰어집니다.
//!
//! 테스트마다 고유한 심볼을 사용하므로 같은 DB에서 반복 실행해도 됩니다.

use chrono::{DateTime, Duration, TimeZone, Utc};
use market_core::{
    ArbitrageDelta, Candle, ClusterBucket, LevelType, SeriesKey, Timeframe, Trade,
};
use market_store::{
    ConnectionMode, DataError, Database, FactKind, FactTable, MarketStore, Selector, SeriesId,
    SingleConnection, StatusUpdate, TimeRange,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::env;

/// 테스트용 풀 모드 저장소 생성.
async fn get_test_store() -> Option<MarketStore> {
    let database_url = env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .ok()?;

    let store = MarketStore::new(Database::from_pool(pool));
    store.database().migrate().await.ok()?;
    store.init().await.ok()?;
    Some(store)
}

macro_rules! test_store {
    () => {
        match get_test_store().await {
            Some(store) => store,
            None => {
                eprintln!("Skipping test: DATABASE_URL not set");
                return;
            }
        }
    };
}

/// 실행마다 달라지는 테스트 심볼.
fn unique_symbol(tag: &str) -> String {
    format!(
        "IT{}{}",
        tag,
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn minute(i: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(i)
}

fn candle(i: i64) -> Candle {
    let price = Decimal::from(100 + i);
    Candle::new(minute(i), price, price + dec!(1), price - dec!(1), price, dec!(10))
}

fn candles(range: std::ops::Range<i64>) -> Vec<Candle> {
    range.map(candle).collect()
}

/// 한 시리즈의 `levels` INSERT에만 걸리는 트리거를 설치합니다.
async fn install_level_trigger(store: &MarketStore, name: &str, series_id: SeriesId, body: &str) {
    let db = store.database();
    db.execute(sqlx::query(&format!(
        "CREATE OR REPLACE FUNCTION {name}() RETURNS trigger AS $$ BEGIN {body} RETURN NEW; END; $$ LANGUAGE plpgsql"
    )))
    .await
    .unwrap();
    db.execute(sqlx::query(&format!(
        "CREATE TRIGGER {name} BEFORE INSERT ON levels FOR EACH ROW \
         WHEN (NEW.series_id = {id}) EXECUTE FUNCTION {name}()",
        id = series_id.get()
    )))
    .await
    .unwrap();
}

async fn drop_level_trigger(store: &MarketStore, name: &str) {
    let db = store.database();
    db.execute(sqlx::query(&format!("DROP TRIGGER IF EXISTS {name} ON levels")))
        .await
        .unwrap();
    db.execute(sqlx::query(&format!("DROP FUNCTION IF EXISTS {name}()")))
        .await
        .unwrap();
}

async fn support_levels(store: &MarketStore, key: &SeriesKey) -> Vec<Decimal> {
    store
        .load_levels(
            Selector::One(key.symbol.clone()),
            Selector::One(key.timeframe),
            Some(LevelType::Support),
        )
        .await
        .unwrap()
        .iter()
        .map(|level| level.level_value)
        .collect()
}

fn candle_rows(table: FactTable) -> Vec<DateTime<Utc>> {
    match table {
        FactTable::Candles(table) => table.iter().map(|r| r.timestamp).collect(),
        FactTable::Trades(_) => panic!("expected candles"),
    }
}

#[tokio::test]
async fn test_resolve_is_idempotent_across_stores() {
    let store = test_store!();
    let other = test_store!();
    let key = SeriesKey::new(unique_symbol("RES"), Timeframe::H1);

    let (a, b) = tokio::join!(store.resolve(&key), other.resolve(&key));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);

    assert_eq!(store.resolve(&key).await.unwrap(), a);

    // 캐시가 오래된 새 저장소도 같은 ID를 얻음
    let late = test_store!();
    assert_eq!(late.resolve(&key).await.unwrap(), a);
}

#[tokio::test]
async fn test_replayed_batches_keep_one_row_per_timestamp() {
    let store = test_store!();
    let key = SeriesKey::new(unique_symbol("ING"), Timeframe::M1);

    assert_eq!(store.save_candles(&key, &candles(0..3)).await.unwrap(), 3);
    // 겹치는 배치: 2는 이미 있고 3, 4만 새로 들어감
    assert_eq!(store.save_candles(&key, &candles(2..5)).await.unwrap(), 2);
    // 전체 재전송
    assert_eq!(store.save_candles(&key, &candles(0..5)).await.unwrap(), 0);
    // 배치 내부 중복은 첫 행만
    let mut dup = candle(5);
    let first = dup.clone();
    dup.close = dec!(999);
    assert_eq!(store.save_candles(&key, &[first, dup]).await.unwrap(), 1);

    let table = store
        .load_range(FactKind::Candles, &key, TimeRange::all())
        .await
        .unwrap();
    assert_eq!(table.columns()[1], "timestamp");
    let timestamps = candle_rows(table);
    assert_eq!(timestamps, (0..6).map(minute).collect::<Vec<_>>());

    let rows = store.load_candles(&key, TimeRange::since(minute(5))).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.rows()[0].to_candle(), candle(5));

    assert_eq!(
        store.last_candle_timestamp(&key).await.unwrap(),
        Some(minute(5))
    );
}

#[tokio::test]
async fn test_time_range_boundaries_partition_data() {
    let store = test_store!();
    let key = SeriesKey::new(unique_symbol("RNG"), Timeframe::M1);
    store.save_candles(&key, &candles(0..10)).await.unwrap();

    let load = |range: TimeRange| {
        let store = store.clone();
        let key = key.clone();
        async move {
            candle_rows(
                store
                    .load_range(FactKind::Candles, &key, range)
                    .await
                    .unwrap(),
            )
        }
    };

    let whole = TimeRange::between(minute(0), minute(10));
    let (left, right) = whole.split_at(minute(5));

    let left_rows = load(left).await;
    let right_rows = load(right).await;
    assert_eq!(left_rows, (0..5).map(minute).collect::<Vec<_>>());
    assert_eq!(right_rows, (5..10).map(minute).collect::<Vec<_>>());

    let mut joined = left_rows;
    joined.extend(right_rows);
    assert_eq!(joined, load(whole).await);

    assert_eq!(load(TimeRange::until(minute(3))).await.len(), 3);
    assert!(load(TimeRange::between(minute(7), minute(2))).await.is_empty());
}

#[tokio::test]
async fn test_unknown_series_reads_are_empty() {
    let store = test_store!();
    let key = SeriesKey::new(unique_symbol("NONE"), Timeframe::H4);

    let candles = store
        .load_range(FactKind::Candles, &key, TimeRange::all())
        .await
        .unwrap();
    assert!(candles.is_empty());
    assert!(store.load_trades(&key, TimeRange::all()).await.unwrap().is_empty());
    assert!(store.load_clusters(&key, TimeRange::all()).await.unwrap().is_empty());
    assert_eq!(store.last_candle_timestamp(&key).await.unwrap(), None);
    assert!(store
        .load_levels(Selector::One(key.symbol.clone()), Selector::One(key.timeframe), None)
        .await
        .unwrap()
        .is_empty());
    assert!(store.load_symbol_status(&key.symbol).await.unwrap().is_none());

    // 조회는 시리즈를 만들지 않음
    assert_eq!(store.series().lookup(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_lowercase_symbol_series_round_trips() {
    let store = test_store!();
    let symbol = unique_symbol("low").to_lowercase();

    // 다른 프로세스가 소문자 심볼로 등록한 시리즈
    let (series_id,): (i32,) = store
        .database()
        .fetch_one(
            sqlx::query_as("INSERT INTO series (symbol, timeframe) VALUES ($1, '1h') RETURNING id")
                .bind(&symbol),
        )
        .await
        .unwrap();
    store
        .database()
        .execute(
            sqlx::query(
                "INSERT INTO candles (series_id, timestamp, open, high, low, close, volume) \
                 VALUES ($1, $2, 100, 101, 99, 100, 10)",
            )
            .bind(series_id)
            .bind(minute(0)),
        )
        .await
        .unwrap();

    let key = SeriesKey::new(&symbol, Timeframe::H1);

    let fresh = test_store!();
    assert_eq!(fresh.load_candles(&key, TimeRange::all()).await.unwrap().len(), 1);
    assert_eq!(fresh.resolve(&key).await.unwrap(), SeriesId(series_id));

    // 캐시에 없는 저장소는 충돌 후 기존 ID를 읽음
    assert_eq!(store.resolve(&key).await.unwrap(), SeriesId(series_id));
    assert_eq!(fresh.save_candles(&key, &candles(0..2)).await.unwrap(), 1);

    let (count,): (i64,) = store
        .database()
        .fetch_one(
            sqlx::query_as("SELECT COUNT(*) FROM series WHERE lower(symbol) = $1").bind(&symbol),
        )
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_trades_ingest_and_single_insert() {
    let store = test_store!();
    let symbol = unique_symbol("TRD");
    let key = SeriesKey::daily(&symbol);

    let trades: Vec<Trade> = (0..4)
        .map(|i| Trade::new(minute(i), dec!(50000) + Decimal::from(i), dec!(0.1), i % 2 == 0))
        .collect();
    assert_eq!(store.save_trades(&key, &trades).await.unwrap(), 4);

    assert!(store.add_trade(&symbol, &Trade::new(minute(4), dec!(1), dec!(1), false)).await.unwrap());
    assert!(!store.add_trade(&symbol, &trades[0]).await.unwrap());

    let table = store.load_trades(&key, TimeRange::all()).await.unwrap();
    assert_eq!(table.len(), 5);
    assert!(table.rows()[0].is_buyer);
    assert_eq!(table.rows()[0].to_trade(), trades[0]);
}

#[tokio::test]
async fn test_replace_level_is_atomic_for_readers() {
    let store = test_store!();
    let key = SeriesKey::daily(unique_symbol("LVL"));
    let series_id = store.resolve(&key).await.unwrap();

    store
        .replace_level(series_id, LevelType::Support, dec!(100), minute(0))
        .await
        .unwrap();

    let reader = {
        let store = store.clone();
        let key = key.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let table = store
                    .load_levels(
                        Selector::One(key.symbol.clone()),
                        Selector::One(key.timeframe),
                        Some(LevelType::Support),
                    )
                    .await
                    .unwrap();
                assert_eq!(table.len(), 1, "reader must always see exactly one level");
            }
        })
    };

    for i in 1..=50 {
        store
            .replace_level(series_id, LevelType::Support, Decimal::from(100 + i), minute(i))
            .await
            .unwrap();
    }
    reader.await.unwrap();

    let table = store
        .load_levels(
            Selector::Many(vec![key.symbol.clone(), unique_symbol("OTHER")]),
            Selector::Many(vec![Timeframe::D1, Timeframe::H1]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(table.len(), 1);
    let level = &table.rows()[0];
    assert_eq!(level.level_value, dec!(150));
    assert_eq!(level.kind(), Some(LevelType::Support));
    assert_eq!(level.timeframe(), Some(Timeframe::D1));

    let none = store
        .load_levels(Selector::Many(Vec::new()), Selector::One(Timeframe::D1), None)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_read_during_slow_replace_sees_previous_level() {
    let store = test_store!();
    let key = SeriesKey::daily(unique_symbol("SLOW"));
    let series_id = store.resolve(&key).await.unwrap();
    store
        .replace_level(series_id, LevelType::Support, dec!(1), minute(0))
        .await
        .unwrap();

    // 삭제와 삽입 사이에서 쓰기를 멈춤
    let trigger = format!("level_delay_{}", series_id.get());
    install_level_trigger(&store, &trigger, series_id, "PERFORM pg_sleep(1);").await;

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .replace_level(series_id, LevelType::Support, dec!(777), minute(1))
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let during = support_levels(&store, &key).await;
    assert!(!writer.is_finished(), "read must happen while the replace is in flight");
    assert_eq!(during, vec![dec!(1)]);

    writer.await.unwrap().unwrap();
    drop_level_trigger(&store, &trigger).await;

    assert_eq!(support_levels(&store, &key).await, vec![dec!(777)]);
}

#[tokio::test]
async fn test_failed_replace_keeps_previous_level() {
    let store = test_store!();
    let key = SeriesKey::daily(unique_symbol("FAIL"));
    let series_id = store.resolve(&key).await.unwrap();
    store
        .replace_level(series_id, LevelType::Support, dec!(1), minute(0))
        .await
        .unwrap();

    let trigger = format!("level_reject_{}", series_id.get());
    install_level_trigger(
        &store,
        &trigger,
        series_id,
        "RAISE EXCEPTION 'level insert rejected';",
    )
    .await;

    let err = store
        .replace_level(series_id, LevelType::Support, dec!(2), minute(1))
        .await
        .unwrap_err();
    drop_level_trigger(&store, &trigger).await;

    assert!(matches!(err, DataError::TransactionError(_)), "unexpected error: {err:?}");
    assert_eq!(support_levels(&store, &key).await, vec![dec!(1)]);
}

#[tokio::test]
async fn test_load_latest_returns_most_recent_delta_per_symbol() {
    let store = test_store!();
    let btc = unique_symbol("BTCUSDT");
    let eth = unique_symbol("ETHUSDT");

    store
        .save_arbitrage_deltas(
            minute(1),
            &[
                (btc.as_str(), ArbitrageDelta::new(dec!(1.0), dec!(0.1))),
                (eth.as_str(), ArbitrageDelta::new(dec!(7.0), dec!(0.7))),
            ],
        )
        .await
        .unwrap();
    store
        .save_arbitrage_deltas(minute(2), &[(btc.as_str(), ArbitrageDelta::new(dec!(2.0), dec!(0.2)))])
        .await
        .unwrap();

    let latest = store.load_latest(TimeRange::all()).await.unwrap();
    let btc_rows: Vec<_> = latest.iter().filter(|r| r.symbol == btc).collect();
    assert_eq!(btc_rows.len(), 1);
    assert_eq!(btc_rows[0].delta, dec!(2.0));
    assert_eq!(btc_rows[0].timestamp, minute(2));

    let eth_rows: Vec<_> = latest.iter().filter(|r| r.symbol == eth).collect();
    assert_eq!(eth_rows.len(), 1);
    assert_eq!(eth_rows[0].delta, dec!(7.0));

    let history = store
        .load_arbitrage_deltas(Some(btc.as_str()), TimeRange::all())
        .await
        .unwrap();
    assert_eq!(
        history.iter().map(|r| r.delta).collect::<Vec<_>>(),
        vec![dec!(1.0), dec!(2.0)]
    );
}

#[tokio::test]
async fn test_load_stats_aggregates_per_symbol() {
    let store = test_store!();
    let symbol = unique_symbol("STAT");

    for (i, delta) in [dec!(1), dec!(3), dec!(5)].into_iter().enumerate() {
        store
            .save_arbitrage_deltas(
                minute(i as i64),
                &[(symbol.as_str(), ArbitrageDelta::new(delta, delta / dec!(10)))],
            )
            .await
            .unwrap();
    }
    // 범위 밖
    store
        .save_arbitrage_deltas(minute(10), &[(symbol.as_str(), ArbitrageDelta::new(dec!(100), dec!(10)))])
        .await
        .unwrap();

    let stats = store
        .load_stats(TimeRange::between(minute(0), minute(10)))
        .await
        .unwrap();
    let row = stats
        .iter()
        .find(|r| r.symbol == symbol)
        .expect("stats row for symbol");

    assert_eq!(row.avg_delta, dec!(3));
    assert_eq!(row.min_delta, dec!(1));
    assert_eq!(row.max_delta, dec!(5));
    assert_eq!(row.avg_delta_percent, dec!(0.3));
    assert_eq!(row.max_delta_percent, dec!(0.5));
    assert_eq!(row.min_delta_percent, dec!(0.1));
}

#[tokio::test]
async fn test_clusters_round_trip_in_order() {
    let store = test_store!();
    let key = SeriesKey::new(unique_symbol("CLU"), Timeframe::CLUSTER_DEFAULT);
    let buckets = vec![
        ClusterBucket::new(dec!(101), dec!(2), dec!(1)),
        ClusterBucket::new(dec!(100), dec!(5), dec!(5)),
    ];

    assert_eq!(
        store
            .save_clusters(&key, minute(0), dec!(1), &buckets)
            .await
            .unwrap(),
        2
    );

    let table = store
        .load_default_clusters(&key.symbol, TimeRange::all())
        .await
        .unwrap();
    let prices: Vec<Decimal> = table.iter().map(|r| r.price).collect();
    assert_eq!(prices, vec![dec!(100), dec!(101)]);
    assert_eq!(table.rows()[1].to_bucket(), buckets[0]);
}

#[tokio::test]
async fn test_symbol_status_upsert_and_update() {
    let store = test_store!();
    let symbol = unique_symbol("STS");

    // 상태 행이 없으면 갱신되지 않음
    assert!(!store
        .update_symbol_status(&symbol, StatusUpdate::Active(false))
        .await
        .unwrap());

    store
        .upsert_symbol_status(&symbol, Some(minute(0)), Some(dec!(1500)), true)
        .await
        .unwrap();
    assert!(store
        .update_symbol_status(&symbol, StatusUpdate::ClusterSize(dec!(0.5)))
        .await
        .unwrap());

    let status = store.load_symbol_status(&symbol).await.unwrap().unwrap();
    assert_eq!(status.last_sync, Some(minute(0)));
    assert_eq!(status.last_volume, Some(dec!(1500)));
    assert_eq!(status.cluster_size, Some(dec!(0.5)));
    assert!(status.active);

    store
        .update_symbol_status(&symbol, StatusUpdate::Active(false))
        .await
        .unwrap();
    let inactive = store.list_symbol_status(false).await.unwrap();
    assert!(inactive.iter().any(|s| s.symbol == symbol));
    let active = store.list_symbol_status(true).await.unwrap();
    assert!(!active.iter().any(|s| s.symbol == symbol));
}

#[tokio::test]
async fn test_single_connection_mode_behaves_like_pool() {
    let Ok(database_url) = env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let options: PgConnectOptions = database_url.parse().unwrap();
    let db = Database::from_provider(SingleConnection::connect(&options).await.unwrap());
    db.migrate().await.unwrap();

    let store = MarketStore::new(db);
    store.init().await.unwrap();
    assert_eq!(store.mode(), ConnectionMode::Single);
    assert!(store.health_check().await.unwrap());
    assert_eq!(
        store
            .database()
            .prepare("SELECT id, symbol, timeframe FROM series")
            .await
            .unwrap(),
        vec!["id", "symbol", "timeframe"]
    );

    let key = SeriesKey::new(unique_symbol("SGL"), Timeframe::M5);
    assert_eq!(store.save_candles(&key, &candles(0..3)).await.unwrap(), 3);
    assert_eq!(store.save_candles(&key, &candles(1..4)).await.unwrap(), 1);

    let series_id = store.resolve(&key).await.unwrap();
    store
        .replace_level(series_id, LevelType::Pivot, dec!(42), minute(0))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.load_candles(&key, TimeRange::all()),
        store.load_levels(Selector::One(key.symbol.clone()), Selector::One(key.timeframe), None)
    );
    assert_eq!(a.unwrap().len(), 4);
    assert_eq!(b.unwrap().rows()[0].level_value, dec!(42));
}
