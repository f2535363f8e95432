//! 시리즈 식별자 해석.
//!
//! (심볼, 타임프레임) 쌍을 `series` 테이블의 정수 ID로 변환합니다.
//!
//! **캐싱**: 시작 시 전체 테이블을 읽어 메모리에 올리고, 이후 생성/조회된 ID도
//! 캐시합니다. ID는 한 번 부여되면 바뀌거나 재사용되지 않으므로 캐시가 무효화될
//! 일은 없습니다.
//!
//! **경합**: 다른 프로세스가 같은 쌍을 먼저 등록했으면 INSERT가 고유 제약 위반으로
//! 실패합니다. 이때 DB에서 실제 ID를 다시 읽어 캐시합니다.

use crate::connection::Database;
use crate::error::{DataError, Result};
use async_trait::async_trait;
use market_core::{SeriesKey, Timeframe};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, instrument, warn};

/// `series` 테이블의 대리 키.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct SeriesId(pub i32);

impl SeriesId {
    pub fn get(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 시리즈 차원 테이블 접근.
#[async_trait]
pub trait SeriesCatalog: Send + Sync {
    /// 등록된 모든 시리즈를 조회합니다.
    async fn load_all(&self) -> Result<Vec<(SeriesKey, SeriesId)>>;

    /// 새 시리즈를 등록합니다. 이미 있으면 `DataError::DuplicateError`.
    async fn insert(&self, key: &SeriesKey) -> Result<SeriesId>;

    /// 시리즈 ID를 조회합니다 (생성하지 않음).
    async fn find(&self, key: &SeriesKey) -> Result<Option<SeriesId>>;
}

#[derive(Debug, sqlx::FromRow)]
struct SeriesRow {
    id: i32,
    symbol: String,
    timeframe: String,
}

/// PostgreSQL `series` 테이블.
#[derive(Clone)]
pub struct PgSeriesCatalog {
    db: Database,
}

impl PgSeriesCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SeriesCatalog for PgSeriesCatalog {
    async fn load_all(&self) -> Result<Vec<(SeriesKey, SeriesId)>> {
        let rows: Vec<SeriesRow> = self
            .db
            .fetch_all(sqlx::query_as("SELECT id, symbol, timeframe FROM series"))
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match Timeframe::from_token(&row.timeframe) {
                Some(timeframe) => entries.push((
                    SeriesKey {
                        symbol: row.symbol,
                        timeframe,
                    },
                    SeriesId(row.id),
                )),
                None => {
                    warn!(id = row.id, symbol = %row.symbol, timeframe = %row.timeframe, "Skipping series with unknown timeframe");
                }
            }
        }
        Ok(entries)
    }

    async fn insert(&self, key: &SeriesKey) -> Result<SeriesId> {
        let (id,): (i32,) = self
            .db
            .fetch_one(
                sqlx::query_as("INSERT INTO series (symbol, timeframe) VALUES ($1, $2) RETURNING id")
                    .bind(&key.symbol)
                    .bind(key.timeframe.as_str()),
            )
            .await?;
        Ok(SeriesId(id))
    }

    async fn find(&self, key: &SeriesKey) -> Result<Option<SeriesId>> {
        let row: Option<(i32,)> = self
            .db
            .fetch_optional(
                sqlx::query_as("SELECT id FROM series WHERE symbol = $1 AND timeframe = $2")
                    .bind(&key.symbol)
                    .bind(key.timeframe.as_str()),
            )
            .await?;
        Ok(row.map(|(id,)| SeriesId(id)))
    }
}

/// 캐시를 갖춘 시리즈 ID 해석기.
///
/// 복제본은 같은 캐시를 공유합니다.
#[derive(Clone)]
pub struct SeriesResolver {
    catalog: Arc<dyn SeriesCatalog>,
    cache: Arc<RwLock<HashMap<SeriesKey, SeriesId>>>,
    loaded: Arc<OnceCell<usize>>,
}

impl SeriesResolver {
    pub fn new(catalog: impl SeriesCatalog + 'static) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cache: Arc::new(RwLock::new(HashMap::new())),
            loaded: Arc::new(OnceCell::new()),
        }
    }

    /// PostgreSQL 카탈로그로 생성합니다.
    pub fn postgres(db: Database) -> Self {
        Self::new(PgSeriesCatalog::new(db))
    }

    /// 전체 시리즈 테이블을 캐시에 적재합니다.
    ///
    /// 두 번째 호출부터는 아무 것도 하지 않고 처음 적재한 개수를 반환합니다.
    pub async fn init(&self) -> Result<usize> {
        self.loaded
            .get_or_try_init(|| async {
                let entries = self.catalog.load_all().await?;
                let count = entries.len();
                self.cache.write().await.extend(entries);
                info!(count, "Series cache loaded");
                Ok::<_, DataError>(count)
            })
            .await
            .copied()
    }

    /// 시리즈 ID를 반환하며, 없으면 등록합니다.
    #[instrument(skip(self, key), fields(series = %key))]
    pub async fn resolve(&self, key: &SeriesKey) -> Result<SeriesId> {
        if let Some(id) = self.cached(key).await {
            return Ok(id);
        }

        let id = match self.catalog.insert(key).await {
            Ok(id) => {
                info!(series_id = %id, "Series registered");
                id
            }
            Err(e) if e.is_conflict() => {
                debug!("Series registered concurrently, reading existing id");
                self.catalog.find(key).await?.ok_or_else(|| {
                    DataError::NotFound(format!("series {} missing after conflict", key))
                })?
            }
            Err(e) => return Err(e),
        };

        self.cache.write().await.insert(key.clone(), id);
        Ok(id)
    }

    /// 기본 타임프레임(일봉)으로 해석합니다.
    pub async fn resolve_default_timeframe(&self, symbol: &str) -> Result<SeriesId> {
        self.resolve(&SeriesKey::daily(symbol)).await
    }

    /// 등록된 시리즈 ID를 조회합니다. 등록하지 않습니다.
    pub async fn lookup(&self, key: &SeriesKey) -> Result<Option<SeriesId>> {
        if let Some(id) = self.cached(key).await {
            return Ok(Some(id));
        }

        let found = self.catalog.find(key).await?;
        if let Some(id) = found {
            self.cache.write().await.insert(key.clone(), id);
        }
        Ok(found)
    }

    /// 캐시에서만 조회합니다.
    pub async fn cached(&self, key: &SeriesKey) -> Option<SeriesId> {
        self.cache.read().await.get(key).copied()
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }
}
