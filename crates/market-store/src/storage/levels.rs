//! 가격 레벨 저장소.
//!
//! (시리즈, 레벨 유형)마다 현재 레벨 하나만 유지합니다. 교체는 한 트랜잭션 안에서
//! 기존 행 삭제 후 새 행 삽입으로 이뤄지므로, 다른 연결의 조회는 항상 이전 행 또는
//! 새 행 중 정확히 하나를 봅니다. 같은 시리즈에 대한 동시 교체는 호출자가 직렬화해야
//! 합니다.

use crate::connection::Database;
use crate::error::{DataError, Result};
use crate::series::SeriesId;
use crate::table::Table;
use chrono::{DateTime, Utc};
use market_core::{LevelType, Timeframe};
use rust_decimal::Decimal;
use sqlx::postgres::PgConnection;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, instrument, warn};

/// 단일 값 또는 값 목록 필터.
///
/// `Many`는 `= ANY(...)`로 바인딩되며, 빈 목록은 아무 행도 선택하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Selector<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Selector<U> {
        match self {
            Selector::One(value) => Selector::One(f(value)),
            Selector::Many(values) => Selector::Many(values.into_iter().map(f).collect()),
        }
    }

    /// 값이 필터에 해당하는지 확인합니다.
    pub fn matches(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        match self {
            Selector::One(v) => v == value,
            Selector::Many(values) => values.contains(value),
        }
    }
}

impl<T> From<Vec<T>> for Selector<T> {
    fn from(values: Vec<T>) -> Self {
        Selector::Many(values)
    }
}

fn push_selector(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &'static str,
    selector: Selector<String>,
) {
    match selector {
        Selector::One(value) => {
            builder.push(column).push(" = ").push_bind(value);
        }
        Selector::Many(values) => {
            builder.push(column).push(" = ANY(").push_bind(values).push(")");
        }
    }
}

/// 심볼/타임프레임 정보가 붙은 레벨 레코드.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LevelRecord {
    pub series_id: SeriesId,
    pub symbol: String,
    pub timeframe: String,
    pub level_type: i16,
    pub level_value: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl LevelRecord {
    pub fn kind(&self) -> Option<LevelType> {
        LevelType::from_code(self.level_type)
    }

    pub fn timeframe(&self) -> Option<Timeframe> {
        Timeframe::from_token(&self.timeframe)
    }
}

fn level_query(
    symbols: Selector<String>,
    timeframes: Selector<Timeframe>,
    level_type: Option<LevelType>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT l.series_id, s.symbol, s.timeframe, l.level_type, l.level_value, l.timestamp \
         FROM levels AS l JOIN series AS s ON s.id = l.series_id WHERE ",
    );

    push_selector(&mut builder, "s.symbol", symbols);
    builder.push(" AND ");
    push_selector(
        &mut builder,
        "s.timeframe",
        timeframes.map(|tf| tf.as_str().to_string()),
    );

    if let Some(level_type) = level_type {
        builder.push(" AND l.level_type = ").push_bind(level_type.code());
    }

    builder.push(" ORDER BY s.symbol, s.timeframe, l.level_type");
    builder
}

/// 레벨 저장소.
#[derive(Clone)]
pub struct LevelRepository {
    db: Database,
}

impl LevelRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 현재 레벨을 새 값으로 교체합니다.
    ///
    /// 실패하면 트랜잭션이 롤백되고 `DataError::TransactionError`를 반환합니다.
    #[instrument(skip(self, series_id, level_type), fields(series_id = %series_id, level_type = %level_type))]
    pub async fn replace(
        &self,
        series_id: SeriesId,
        level_type: LevelType,
        value: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        if let Err(e) = Self::replace_within(&mut *tx, series_id, level_type, value, timestamp).await
        {
            warn!(error = %e, "Level replace failed, rolling back");
            return Err(rolled_back(e));
        }

        tx.commit().await.map_err(rolled_back)?;

        debug!(%value, "Level replaced");
        Ok(())
    }

    /// 호출자의 트랜잭션 안에서 삭제 후 삽입을 실행합니다.
    pub async fn replace_within(
        conn: &mut PgConnection,
        series_id: SeriesId,
        level_type: LevelType,
        value: Decimal,
        timestamp: DateTime<Utc>,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM levels WHERE series_id = $1 AND level_type = $2")
            .bind(series_id)
            .bind(level_type.code())
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO levels (series_id, level_type, level_value, timestamp)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(series_id)
        .bind(level_type.code())
        .bind(value)
        .bind(timestamp)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// 심볼/타임프레임 필터로 레벨을 조회합니다.
    pub async fn load(
        &self,
        symbols: Selector<String>,
        timeframes: Selector<Timeframe>,
        level_type: Option<LevelType>,
    ) -> Result<Table<LevelRecord>> {
        let mut builder = level_query(symbols, timeframes, level_type);
        self.db.fetch_table(&mut builder).await
    }
}

fn rolled_back(err: sqlx::Error) -> DataError {
    DataError::TransactionError(format!("level replace rolled back: {}", DataError::from(err)))
}
