//! 심볼 동기화 상태 저장소.
//!
//! 일봉 시리즈마다 한 행을 유지합니다.

use crate::connection::Database;
use crate::error::Result;
use crate::series::SeriesId;
use chrono::{DateTime, Utc};
use market_core::Timeframe;
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::instrument;

/// 상태 컬럼 하나의 갱신.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    LastSync(DateTime<Utc>),
    LastVolume(Decimal),
    Active(bool),
    ClusterSize(Decimal),
}

impl StatusUpdate {
    /// 갱신 대상 컬럼.
    pub fn column(&self) -> &'static str {
        match self {
            StatusUpdate::LastSync(_) => "last_sync",
            StatusUpdate::LastVolume(_) => "last_volume",
            StatusUpdate::Active(_) => "active",
            StatusUpdate::ClusterSize(_) => "cluster_size",
        }
    }
}

fn update_query(series_id: SeriesId, update: StatusUpdate) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE symbol_status SET ");
    builder.push(update.column()).push(" = ");
    match update {
        StatusUpdate::LastSync(value) => builder.push_bind(value),
        StatusUpdate::LastVolume(value) | StatusUpdate::ClusterSize(value) => {
            builder.push_bind(value)
        }
        StatusUpdate::Active(value) => builder.push_bind(value),
    };
    builder.push(" WHERE series_id = ").push_bind(series_id);
    builder
}

/// 심볼 상태 레코드.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SymbolStatusRecord {
    pub series_id: SeriesId,
    pub symbol: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_volume: Option<Decimal>,
    pub active: bool,
    pub cluster_size: Option<Decimal>,
}

const SELECT_STATUS: &str = r#"
    SELECT st.series_id, s.symbol, st.last_sync, st.last_volume, st.active, st.cluster_size
    FROM symbol_status AS st JOIN series AS s ON s.id = st.series_id
"#;

/// 심볼 상태 저장소.
#[derive(Clone)]
pub struct SymbolStatusRepository {
    db: Database,
}

impl SymbolStatusRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 상태 행을 생성하거나 덮어씁니다. `cluster_size`는 유지됩니다.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        series_id: SeriesId,
        last_sync: Option<DateTime<Utc>>,
        last_volume: Option<Decimal>,
        active: bool,
    ) -> Result<()> {
        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO symbol_status (series_id, last_sync, last_volume, active)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (series_id) DO UPDATE SET
                        last_sync = EXCLUDED.last_sync,
                        last_volume = EXCLUDED.last_volume,
                        active = EXCLUDED.active
                    "#,
                )
                .bind(series_id)
                .bind(last_sync)
                .bind(last_volume)
                .bind(active),
            )
            .await?;
        Ok(())
    }

    /// 컬럼 하나를 갱신합니다. 상태 행이 없으면 false.
    #[instrument(skip(self))]
    pub async fn update(&self, series_id: SeriesId, update: StatusUpdate) -> Result<bool> {
        let mut builder = update_query(series_id, update);
        let affected = self.db.execute(builder.build()).await?;
        Ok(affected > 0)
    }

    pub async fn get(&self, series_id: SeriesId) -> Result<Option<SymbolStatusRecord>> {
        let sql = format!("{} WHERE st.series_id = $1", SELECT_STATUS);
        self.db
            .fetch_optional(sqlx::query_as(&sql).bind(series_id))
            .await
    }

    /// 활성 여부로 일봉 시리즈의 상태를 조회합니다.
    pub async fn list(&self, active: bool) -> Result<Vec<SymbolStatusRecord>> {
        let sql = format!(
            "{} WHERE st.active = $1 AND s.timeframe = $2 ORDER BY s.symbol",
            SELECT_STATUS
        );
        self.db
            .fetch_all(
                sqlx::query_as(&sql)
                    .bind(active)
                    .bind(Timeframe::DEFAULT.as_str()),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_update_query_targets_single_column() {
        let builder = update_query(SeriesId(4), StatusUpdate::ClusterSize(dec!(0.5)));
        assert_eq!(
            builder.sql(),
            "UPDATE symbol_status SET cluster_size = $1 WHERE series_id = $2"
        );

        let builder = update_query(SeriesId(4), StatusUpdate::Active(false));
        assert_eq!(
            builder.sql(),
            "UPDATE symbol_status SET active = $1 WHERE series_id = $2"
        );
    }

    #[test]
    fn test_status_columns() {
        assert_eq!(StatusUpdate::LastSync(Utc::now()).column(), "last_sync");
        assert_eq!(StatusUpdate::LastVolume(dec!(1)).column(), "last_volume");
    }
}
