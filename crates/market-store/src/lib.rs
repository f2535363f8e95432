//! 시계열 시장 데이터 저장소.
//!
//! 이 crate는 다음을 제공합니다:
//! - 단일 연결/연결 풀 두 가지 모드의 연결 제공자
//! - (심볼, 타임프레임) → 시리즈 ID 해석 캐시
//! - 충돌 대체 경로를 갖춘 캔들/체결 일괄 적재
//! - 트랜잭션 기반 가격 레벨 교체
//! - 반개구간 시간 범위 조회
//!
//! ```no_run
//! use market_core::{Candle, SeriesKey, StoreConfig, Timeframe};
//! use market_store::{FactKind, MarketStore, TimeRange};
//!
//! # async fn run(candles: Vec<Candle>) -> market_store::Result<()> {
//! let config = StoreConfig::from_env().map_err(|e| market_store::DataError::ConfigError(e.to_string()))?;
//! let store = MarketStore::open(&config).await?;
//!
//! let key = SeriesKey::new("BTCUSDT", Timeframe::H1);
//! store.save_candles(&key, &candles).await?;
//! let table = store.load_range(FactKind::Candles, &key, TimeRange::all()).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod range;
pub mod series;
pub mod storage;
pub mod store;
pub mod table;

pub use connection::{
    ConnectionHandle, ConnectionMode, ConnectionProvider, Database, PooledConnections,
    SingleConnection,
};
pub use error::{DataError, Result};
pub use range::TimeRange;
pub use series::{PgSeriesCatalog, SeriesCatalog, SeriesId, SeriesResolver};
pub use storage::{
    ArbitrageDeltaRecord, ArbitrageStats, CandleRecord, ClusterRecord, IngestRow, LevelRecord,
    RangeRow, Selector, StatusUpdate, SymbolStatusRecord, TradeRecord,
};
pub use store::{FactKind, FactTable, MarketStore};
pub use table::Table;
