//! 거래량 클러스터 프로파일 저장소.
//!
//! 프로파일 하나는 (시리즈, 시각, 가격 간격)과 가격 구간별 거래량 행들로 저장됩니다.
//! 고유 제약이 없는 추가 전용 테이블입니다.

use crate::connection::Database;
use crate::error::Result;
use crate::range::TimeRange;
use crate::series::SeriesId;
use crate::storage::ingest::CHUNK_SIZE;
use crate::table::Table;
use chrono::{DateTime, Utc};
use market_core::ClusterBucket;
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, instrument};

/// 데이터베이스의 클러스터 행.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ClusterRecord {
    pub series_id: SeriesId,
    pub timestamp: DateTime<Utc>,
    pub step: Decimal,
    pub price: Decimal,
    pub volume: Decimal,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
}

impl ClusterRecord {
    pub fn to_bucket(&self) -> ClusterBucket {
        ClusterBucket {
            price: self.price,
            volume: self.volume,
            buy_volume: self.buy_volume,
            sell_volume: self.sell_volume,
        }
    }
}

/// 클러스터 저장소.
#[derive(Clone)]
pub struct ClusterRepository {
    db: Database,
}

impl ClusterRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 한 시점의 프로파일을 저장합니다.
    #[instrument(skip(self, buckets), fields(count = buckets.len()))]
    pub async fn insert_profile(
        &self,
        series_id: SeriesId,
        timestamp: DateTime<Utc>,
        step: Decimal,
        buckets: &[ClusterBucket],
    ) -> Result<usize> {
        if buckets.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;

        for chunk in buckets.chunks(CHUNK_SIZE) {
            let prices: Vec<Decimal> = chunk.iter().map(|b| b.price).collect();
            let volumes: Vec<Decimal> = chunk.iter().map(|b| b.volume).collect();
            let buys: Vec<Decimal> = chunk.iter().map(|b| b.buy_volume).collect();
            let sells: Vec<Decimal> = chunk.iter().map(|b| b.sell_volume).collect();

            let affected = self
                .db
                .execute(
                    sqlx::query(
                        r#"
                        INSERT INTO clusters
                            (series_id, timestamp, step, price, volume, buy_volume, sell_volume)
                        SELECT $1::integer, $2::timestamptz, $3::numeric, * FROM UNNEST(
                            $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[]
                        )
                        "#,
                    )
                    .bind(series_id)
                    .bind(timestamp)
                    .bind(step)
                    .bind(prices)
                    .bind(volumes)
                    .bind(buys)
                    .bind(sells),
                )
                .await?;
            inserted += affected as usize;
        }

        debug!(inserted, "Cluster profile saved");
        Ok(inserted)
    }

    /// 범위 내 클러스터 행을 시각, 가격 순으로 조회합니다.
    pub async fn load_range(
        &self,
        series_id: SeriesId,
        range: TimeRange,
    ) -> Result<Table<ClusterRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT series_id, timestamp, step, price, volume, buy_volume, sell_volume \
             FROM clusters WHERE series_id = ",
        );
        builder.push_bind(series_id).push(" AND ");
        range.push_predicate(&mut builder, "timestamp");
        builder.push(" ORDER BY timestamp ASC, price ASC");

        self.db.fetch_table(&mut builder).await
    }
}
