//! 저장소 오류 타입.

use thiserror::Error;

/// PostgreSQL 고유 제약 조건 위반 SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// 데이터 접근 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류 (시작 시 치명적, 실행 중에는 일시적)
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 레코드를 찾을 수 없음
    #[error("Record not found: {0}")]
    NotFound(String),

    /// 고유 제약 조건 위반
    #[error("Duplicate record: {0}")]
    DuplicateError(String),

    /// 트랜잭션 실패 (롤백 완료)
    #[error("Transaction failed: {0}")]
    TransactionError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DataError {
    /// 고유 제약 조건 위반인지 확인합니다.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DataError::DuplicateError(_))
    }

    /// 재시도로 해결될 수 있는 오류인지 확인합니다.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::ConnectionError(_) | DataError::PoolExhausted | DataError::TransactionError(_)
        )
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed => DataError::ConnectionError(err.to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                    DataError::DuplicateError(db_err.message().to_string())
                } else {
                    DataError::QueryError(db_err.message().to_string())
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DataError::InvalidData(err.to_string())
            }
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DataError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DataError::MigrationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
