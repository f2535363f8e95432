//! TimescaleDB 캔들/체결 저장소.
//!
//! 두 테이블 모두 (series_id, timestamp)에 고유 제약이 있으며, 적재는
//! [`ingest_batch`]의 충돌 대체 경로를 사용합니다.

use crate::connection::Database;
use crate::error::Result;
use crate::range::TimeRange;
use crate::series::SeriesId;
use crate::storage::ingest::{ingest_batch, load_range, IngestRow, RangeRow};
use crate::table::Table;
use chrono::{DateTime, Utc};
use market_core::{Candle, Trade};
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, Postgres};
use tracing::instrument;

/// 데이터베이스의 캔들 레코드.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CandleRecord {
    pub series_id: SeriesId,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl CandleRecord {
    /// 도메인 캔들로 변환합니다.
    pub fn to_candle(&self) -> Candle {
        Candle::new(
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

impl RangeRow for CandleRecord {
    const SELECT: &'static str =
        "SELECT series_id, timestamp, open, high, low, close, volume FROM candles";
}

impl IngestRow for Candle {
    const TABLE: &'static str = "candles";

    fn bulk_insert(series_id: SeriesId, rows: &[Self]) -> Query<'static, Postgres, PgArguments> {
        let timestamps: Vec<DateTime<Utc>> = rows.iter().map(|c| c.timestamp).collect();
        let opens: Vec<Decimal> = rows.iter().map(|c| c.open).collect();
        let highs: Vec<Decimal> = rows.iter().map(|c| c.high).collect();
        let lows: Vec<Decimal> = rows.iter().map(|c| c.low).collect();
        let closes: Vec<Decimal> = rows.iter().map(|c| c.close).collect();
        let volumes: Vec<Decimal> = rows.iter().map(|c| c.volume).collect();

        sqlx::query(
            r#"
            INSERT INTO candles (series_id, timestamp, open, high, low, close, volume)
            SELECT $1::integer, * FROM UNNEST(
                $2::timestamptz[],
                $3::numeric[], $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[]
            )
            "#,
        )
        .bind(series_id)
        .bind(timestamps)
        .bind(opens)
        .bind(highs)
        .bind(lows)
        .bind(closes)
        .bind(volumes)
    }

    fn insert_ignore(series_id: SeriesId, row: &Self) -> Query<'static, Postgres, PgArguments> {
        sqlx::query(
            r#"
            INSERT INTO candles (series_id, timestamp, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (series_id, timestamp) DO NOTHING
            "#,
        )
        .bind(series_id)
        .bind(row.timestamp)
        .bind(row.open)
        .bind(row.high)
        .bind(row.low)
        .bind(row.close)
        .bind(row.volume)
    }
}

/// 데이터베이스의 체결 레코드.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TradeRecord {
    pub series_id: SeriesId,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
    pub is_buyer: bool,
}

impl TradeRecord {
    pub fn to_trade(&self) -> Trade {
        Trade::new(self.timestamp, self.price, self.volume, self.is_buyer)
    }
}

impl RangeRow for TradeRecord {
    const SELECT: &'static str =
        "SELECT series_id, timestamp, price, volume, is_buyer FROM trades";
}

impl IngestRow for Trade {
    const TABLE: &'static str = "trades";

    fn bulk_insert(series_id: SeriesId, rows: &[Self]) -> Query<'static, Postgres, PgArguments> {
        let timestamps: Vec<DateTime<Utc>> = rows.iter().map(|t| t.timestamp).collect();
        let prices: Vec<Decimal> = rows.iter().map(|t| t.price).collect();
        let volumes: Vec<Decimal> = rows.iter().map(|t| t.volume).collect();
        let buyers: Vec<bool> = rows.iter().map(|t| t.is_buyer).collect();

        sqlx::query(
            r#"
            INSERT INTO trades (series_id, timestamp, price, volume, is_buyer)
            SELECT $1::integer, * FROM UNNEST(
                $2::timestamptz[], $3::numeric[], $4::numeric[], $5::boolean[]
            )
            "#,
        )
        .bind(series_id)
        .bind(timestamps)
        .bind(prices)
        .bind(volumes)
        .bind(buyers)
    }

    fn insert_ignore(series_id: SeriesId, row: &Self) -> Query<'static, Postgres, PgArguments> {
        sqlx::query(
            r#"
            INSERT INTO trades (series_id, timestamp, price, volume, is_buyer)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (series_id, timestamp) DO NOTHING
            "#,
        )
        .bind(series_id)
        .bind(row.timestamp)
        .bind(row.price)
        .bind(row.volume)
        .bind(row.is_buyer)
    }
}

/// 캔들 저장소.
#[derive(Clone)]
pub struct CandleRepository {
    db: Database,
}

impl CandleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 캔들을 일괄 저장합니다. 이미 있는 시각은 건너뜁니다.
    pub async fn insert_batch(&self, series_id: SeriesId, candles: &[Candle]) -> Result<usize> {
        ingest_batch(&self.db, series_id, candles).await
    }

    /// 범위 내 캔들을 조회합니다.
    pub async fn load_range(
        &self,
        series_id: SeriesId,
        range: TimeRange,
    ) -> Result<Table<CandleRecord>> {
        load_range(&self.db, series_id, range).await
    }

    /// 가장 최근 캔들 시각을 조회합니다.
    #[instrument(skip(self))]
    pub async fn last_timestamp(&self, series_id: SeriesId) -> Result<Option<DateTime<Utc>>> {
        let (last,): (Option<DateTime<Utc>>,) = self
            .db
            .fetch_one(
                sqlx::query_as("SELECT MAX(timestamp) FROM candles WHERE series_id = $1")
                    .bind(series_id),
            )
            .await?;
        Ok(last)
    }

}

/// 체결 저장소.
#[derive(Clone)]
pub struct TradeRepository {
    db: Database,
}

impl TradeRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 체결을 일괄 저장합니다.
    pub async fn insert_batch(&self, series_id: SeriesId, trades: &[Trade]) -> Result<usize> {
        ingest_batch(&self.db, series_id, trades).await
    }

    /// 체결 하나를 저장합니다. 같은 시각이 이미 있으면 false.
    pub async fn insert(&self, series_id: SeriesId, trade: &Trade) -> Result<bool> {
        let affected = self
            .db
            .execute(Trade::insert_ignore(series_id, trade))
            .await?;
        Ok(affected > 0)
    }

    pub async fn load_range(
        &self,
        series_id: SeriesId,
        range: TimeRange,
    ) -> Result<Table<TradeRecord>> {
        load_range(&self.db, series_id, range).await
    }
}
