//! 테이블별 저장소.

pub mod arbitrage;
pub mod clusters;
pub mod ingest;
pub mod levels;
pub mod status;
pub mod timescale;

pub use arbitrage::{ArbitrageDeltaRecord, ArbitrageRepository, ArbitrageStats};
pub use clusters::{ClusterRecord, ClusterRepository};
pub use ingest::{ingest_batch, load_range, IngestRow, RangeRow, CHUNK_SIZE};
pub use levels::{LevelRecord, LevelRepository, Selector};
pub use status::{StatusUpdate, SymbolStatusRecord, SymbolStatusRepository};
pub use timescale::{CandleRecord, CandleRepository, TradeRecord, TradeRepository};
