//! 거래소 간 차익 델타 저장소.

use crate::connection::Database;
use crate::error::Result;
use crate::range::TimeRange;
use crate::series::SeriesId;
use crate::storage::ingest::CHUNK_SIZE;
use crate::table::Table;
use chrono::{DateTime, Utc};
use market_core::ArbitrageDelta;
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, instrument};

/// 심볼이 붙은 델타 레코드.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ArbitrageDeltaRecord {
    pub series_id: SeriesId,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub delta: Decimal,
    pub delta_percent: Decimal,
}

/// 심볼별 델타 통계.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ArbitrageStats {
    pub symbol: String,
    pub avg_delta: Decimal,
    pub avg_delta_percent: Decimal,
    pub max_delta: Decimal,
    pub max_delta_percent: Decimal,
    pub min_delta: Decimal,
    pub min_delta_percent: Decimal,
}

const RECORD_COLUMNS: &str =
    "a.series_id, s.symbol, a.timestamp, a.delta, a.delta_percent \
     FROM arbitrage_delta AS a JOIN series AS s ON s.id = a.series_id";

fn stats_query(range: TimeRange) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT s.symbol, \
         avg(a.delta) AS avg_delta, avg(a.delta_percent) AS avg_delta_percent, \
         max(a.delta) AS max_delta, max(a.delta_percent) AS max_delta_percent, \
         min(a.delta) AS min_delta, min(a.delta_percent) AS min_delta_percent \
         FROM arbitrage_delta AS a JOIN series AS s ON s.id = a.series_id WHERE ",
    );
    range.push_predicate(&mut builder, "a.timestamp");
    builder.push(" GROUP BY s.symbol ORDER BY s.symbol");
    builder
}

fn latest_query(range: TimeRange) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT DISTINCT ON (s.symbol) ");
    builder.push(RECORD_COLUMNS).push(" WHERE ");
    range.push_predicate(&mut builder, "a.timestamp");
    builder.push(" ORDER BY s.symbol, a.timestamp DESC");
    builder
}

fn deltas_query(symbol: Option<&str>, range: TimeRange) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT ");
    builder.push(RECORD_COLUMNS).push(" WHERE ");
    if let Some(symbol) = symbol {
        builder.push("s.symbol = ").push_bind(symbol.to_string()).push(" AND ");
    }
    range.push_predicate(&mut builder, "a.timestamp");
    builder.push(" ORDER BY a.timestamp ASC, s.symbol ASC");
    builder
}

/// 차익 델타 저장소.
#[derive(Clone)]
pub struct ArbitrageRepository {
    db: Database,
}

impl ArbitrageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 한 시점의 여러 시리즈 델타를 저장합니다.
    #[instrument(skip(self, deltas), fields(count = deltas.len()))]
    pub async fn insert_batch(
        &self,
        timestamp: DateTime<Utc>,
        deltas: &[(SeriesId, ArbitrageDelta)],
    ) -> Result<usize> {
        if deltas.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;

        for chunk in deltas.chunks(CHUNK_SIZE) {
            let series_ids: Vec<i32> = chunk.iter().map(|(id, _)| id.get()).collect();
            let values: Vec<Decimal> = chunk.iter().map(|(_, d)| d.delta).collect();
            let percents: Vec<Decimal> = chunk.iter().map(|(_, d)| d.delta_percent).collect();

            let affected = self
                .db
                .execute(
                    sqlx::query(
                        r#"
                        INSERT INTO arbitrage_delta (series_id, timestamp, delta, delta_percent)
                        SELECT u.series_id, $1::timestamptz, u.delta, u.delta_percent
                        FROM UNNEST($2::integer[], $3::numeric[], $4::numeric[])
                            AS u(series_id, delta, delta_percent)
                        "#,
                    )
                    .bind(timestamp)
                    .bind(series_ids)
                    .bind(values)
                    .bind(percents),
                )
                .await?;
            inserted += affected as usize;
        }

        debug!(inserted, "Arbitrage deltas saved");
        Ok(inserted)
    }

    /// 범위 내 심볼별 평균/최대/최소.
    pub async fn stats(&self, range: TimeRange) -> Result<Table<ArbitrageStats>> {
        let mut builder = stats_query(range);
        self.db.fetch_table(&mut builder).await
    }

    /// 심볼별 가장 최근 델타.
    pub async fn latest(&self, range: TimeRange) -> Result<Table<ArbitrageDeltaRecord>> {
        let mut builder = latest_query(range);
        self.db.fetch_table(&mut builder).await
    }

    /// 범위 내 델타를 시간순으로 조회합니다. 심볼을 지정하지 않으면 전체입니다.
    pub async fn load(
        &self,
        symbol: Option<&str>,
        range: TimeRange,
    ) -> Result<Table<ArbitrageDeltaRecord>> {
        let mut builder = deltas_query(symbol, range);
        self.db.fetch_table(&mut builder).await
    }
}
