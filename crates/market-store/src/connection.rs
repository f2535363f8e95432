//! 저장소 연결 제공자.
//!
//! 단일 영속 연결과 연결 풀, 두 가지 모드를 `ConnectionProvider` trait 하나로 감쌉니다.
//! 상위 계층은 `Database`만 사용하며 모드에 따라 분기하지 않습니다.
//!
//! 모든 작업은 `acquire()`로 얻은 핸들 위에서 실행되고, 핸들은 drop 시점에
//! 반환됩니다. 트랜잭션은 핸들에서 시작하며 commit 없이 drop되면 롤백됩니다.

use crate::error::{DataError, Result};
use crate::table::Table;
use async_trait::async_trait;
use market_core::StoreConfig;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{Column, Connection, Executor, FromRow, Postgres, QueryBuilder, Statement, Transaction};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

/// 연결 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// 단일 영속 연결 (작업은 직렬화됨)
    Single,
    /// 크기가 제한된 연결 풀
    Pooled,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Single => write!(f, "single"),
            ConnectionMode::Pooled => write!(f, "pooled"),
        }
    }
}

/// 획득한 연결 핸들.
///
/// `PgConnection`으로 deref되므로 `&mut *handle`을 sqlx executor로 사용할 수 있습니다.
pub enum ConnectionHandle {
    Single(OwnedMutexGuard<PgConnection>),
    Pooled(PoolConnection<Postgres>),
}

impl ConnectionHandle {
    /// 이 핸들 위에서 트랜잭션을 시작합니다.
    ///
    /// 반환된 트랜잭션은 `commit()` 없이 drop되면 롤백됩니다.
    pub async fn begin(&mut self) -> Result<Transaction<'_, Postgres>> {
        let conn: &mut PgConnection = self;
        conn.begin()
            .await
            .map_err(|e| DataError::TransactionError(e.to_string()))
    }
}

impl Deref for ConnectionHandle {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            ConnectionHandle::Single(guard) => guard,
            ConnectionHandle::Pooled(conn) => conn,
        }
    }
}

impl DerefMut for ConnectionHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            ConnectionHandle::Single(guard) => &mut *guard,
            ConnectionHandle::Pooled(conn) => &mut *conn,
        }
    }
}

/// 연결 제공자 trait.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// 연결 핸들을 획득합니다. 풀 모드에서 한도를 넘으면 대기합니다.
    async fn acquire(&self) -> Result<ConnectionHandle>;

    /// 연결 모드.
    fn mode(&self) -> ConnectionMode;
}

/// 단일 영속 연결.
pub struct SingleConnection {
    conn: Arc<Mutex<PgConnection>>,
}

impl SingleConnection {
    /// 연결을 수립합니다.
    pub async fn connect(options: &PgConnectOptions) -> Result<Self> {
        let conn = PgConnection::connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl ConnectionProvider for SingleConnection {
    async fn acquire(&self) -> Result<ConnectionHandle> {
        Ok(ConnectionHandle::Single(self.conn.clone().lock_owned().await))
    }

    fn mode(&self) -> ConnectionMode {
        ConnectionMode::Single
    }
}

/// 연결 풀.
pub struct PooledConnections {
    pool: PgPool,
}

impl PooledConnections {
    /// 설정에 따라 풀을 생성합니다.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(config.idle_timeout())
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// 기존 풀을 감쌉니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionProvider for PooledConnections {
    async fn acquire(&self) -> Result<ConnectionHandle> {
        Ok(ConnectionHandle::Pooled(self.pool.acquire().await?))
    }

    fn mode(&self) -> ConnectionMode {
        ConnectionMode::Pooled
    }
}

/// 데이터베이스 핸들.
///
/// 복제 비용이 낮으며 모든 복제본이 같은 연결 제공자를 공유합니다.
#[derive(Clone)]
pub struct Database {
    provider: Arc<dyn ConnectionProvider>,
}

impl Database {
    /// 설정의 `use_pool`에 따라 단일 연결 또는 풀로 연결합니다.
    ///
    /// 연결 실패는 `DataError::ConnectionError`로 반환됩니다.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        info!(host = %config.host, database = %config.database, use_pool = config.use_pool, "Connecting to database...");

        let db = if config.use_pool {
            Self::from_provider(PooledConnections::connect(config).await?)
        } else {
            Self::from_provider(SingleConnection::connect(&config.connect_options()).await?)
        };

        info!(mode = %db.mode(), "Database connection established");
        Ok(db)
    }

    /// 임의의 연결 제공자로 생성합니다.
    pub fn from_provider(provider: impl ConnectionProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// 기존 연결 풀에서 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self::from_provider(PooledConnections::from_pool(pool))
    }

    /// 연결 모드.
    pub fn mode(&self) -> ConnectionMode {
        self.provider.mode()
    }

    /// 연결 핸들을 획득합니다.
    pub async fn acquire(&self) -> Result<ConnectionHandle> {
        self.provider.acquire().await
    }

    /// 스키마 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");

        let mut conn = self.acquire().await?;
        sqlx::migrate!("../../migrations").run(&mut *conn).await?;

        info!("Migrations completed successfully");
        Ok(())
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        self.execute(sqlx::query("SELECT 1")).await?;
        Ok(true)
    }

    /// 문장을 실행하고 영향받은 행 수를 반환합니다.
    pub async fn execute(&self, query: Query<'_, Postgres, PgArguments>) -> Result<u64> {
        let mut conn = self.acquire().await?;
        let result = query.execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// 모든 행을 조회합니다.
    pub async fn fetch_all<T>(&self, query: QueryAs<'_, Postgres, T, PgArguments>) -> Result<Vec<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut conn = self.acquire().await?;
        Ok(query.fetch_all(&mut *conn).await?)
    }

    /// 최대 한 행을 조회합니다.
    pub async fn fetch_optional<T>(
        &self,
        query: QueryAs<'_, Postgres, T, PgArguments>,
    ) -> Result<Option<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut conn = self.acquire().await?;
        Ok(query.fetch_optional(&mut *conn).await?)
    }

    /// 정확히 한 행을 조회합니다.
    pub async fn fetch_one<T>(&self, query: QueryAs<'_, Postgres, T, PgArguments>) -> Result<T>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut conn = self.acquire().await?;
        Ok(query.fetch_one(&mut *conn).await?)
    }

    /// 문장을 준비하고 결과 컬럼 이름을 반환합니다.
    pub async fn prepare(&self, sql: &str) -> Result<Vec<String>> {
        let mut conn = self.acquire().await?;
        describe_columns(&mut conn, sql).await
    }

    /// 동적으로 만든 쿼리를 실행하고 컬럼 이름이 붙은 표로 반환합니다.
    ///
    /// 준비(컬럼 메타데이터)와 실행은 같은 핸들에서 이뤄집니다.
    #[instrument(skip_all)]
    pub async fn fetch_table<T>(&self, builder: &mut QueryBuilder<'_, Postgres>) -> Result<Table<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut conn = self.acquire().await?;
        let columns = describe_columns(&mut conn, builder.sql()).await?;
        let rows = builder.build_query_as::<T>().fetch_all(&mut *conn).await?;

        debug!(rows = rows.len(), columns = columns.len(), "Fetched table");
        Ok(Table::new(columns, rows))
    }
}

async fn describe_columns(conn: &mut PgConnection, sql: &str) -> Result<Vec<String>> {
    let statement = (&mut *conn).prepare(sql).await?;
    Ok(statement
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect())
}
