//! 설정 관리.
//!
//! 저장소 연결 설정과 로깅 설정을 정의합니다. 설정 파일과 `MARKET__` 접두사
//! 환경 변수(`config` 크레이트), 또는 `DATABASE_*` 환경 변수(`dotenvy`)에서 로드합니다.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 저장소 설정
    pub store: StoreConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 저장소(TimescaleDB) 연결 설정.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// 호스트
    pub host: String,
    /// 포트
    #[serde(default = "default_port")]
    pub port: u16,
    /// 데이터베이스 이름
    #[serde(default = "default_database")]
    pub database: String,
    /// 사용자 이름
    pub username: String,
    /// 비밀번호
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    /// 연결 풀 사용 여부 (false면 단일 연결)
    #[serde(default)]
    pub use_pool: bool,
    /// 풀의 최대 연결 수
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// 풀의 최소 연결 수
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// 연결 타임아웃 (초)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 유휴 연결 타임아웃 (초)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// 시작 시 마이그레이션 실행 여부
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "timescaledb".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_run_migrations() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| SecretString::new(s.into()))
}

impl Clone for StoreConfig {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: SecretString::new(self.password.expose_secret().into()),
            use_pool: self.use_pool,
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
            run_migrations: self.run_migrations,
        }
    }
}

impl StoreConfig {
    /// 필수 값만으로 설정을 생성합니다. 나머지는 기본값입니다.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password: String = password.into();
        Self {
            host: host.into(),
            port: default_port(),
            database: default_database(),
            username: username.into(),
            password: SecretString::new(password.into()),
            use_pool: false,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_run_migrations(),
        }
    }

    /// 환경 변수에서 설정을 로드합니다.
    ///
    /// `.env` 파일이 있으면 먼저 읽습니다. `DATABASE_HOST`, `DATABASE_USER`,
    /// `DATABASE_PASSWORD`는 필수이며 나머지는 기본값을 사용합니다.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let required = |key: &str| {
            std::env::var(key).map_err(|_| {
                config::ConfigError::NotFound(format!("{} 환경변수가 설정되지 않았습니다", key))
            })
        };

        let mut store = Self::new(
            required("DATABASE_HOST")?,
            required("DATABASE_USER")?,
            required("DATABASE_PASSWORD")?,
        );
        store.port = env_var_parse("DATABASE_PORT", store.port);
        if let Ok(database) = std::env::var("DATABASE_NAME") {
            store.database = database;
        }
        store.use_pool = env_var_bool("DATABASE_USE_POOL", false);
        store.max_connections = env_var_parse("DATABASE_MAX_CONNECTIONS", store.max_connections);
        store.min_connections = env_var_parse("DATABASE_MIN_CONNECTIONS", store.min_connections);
        store.connect_timeout_secs =
            env_var_parse("DATABASE_CONNECT_TIMEOUT_SECS", store.connect_timeout_secs);
        store.idle_timeout_secs =
            env_var_parse("DATABASE_IDLE_TIMEOUT_SECS", store.idle_timeout_secs);
        store.run_migrations = env_var_bool("DATABASE_RUN_MIGRATIONS", store.run_migrations);

        Ok(store)
    }

    /// 연결 타임아웃을 Duration으로 반환합니다.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// 유휴 연결 타임아웃을 Duration으로 반환합니다.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// sqlx 연결 옵션을 생성합니다.
    ///
    /// URL 문자열을 조립하지 않으므로 자격증명에 특수문자가 있어도 이스케이프가 필요 없습니다.
    #[cfg(feature = "sqlx-support")]
    pub fn connect_options(&self) -> sqlx::postgres::PgConnectOptions {
        sqlx::postgres::PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .database(&self.database)
            .application_name("market-store")
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수 예: `MARKET__STORE__HOST=db.local`, `MARKET__STORE__USE_POOL=true`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("MARKET")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
