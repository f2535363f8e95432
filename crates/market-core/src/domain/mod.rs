//! 저장소에 기록되는 시장 데이터 도메인 타입.

mod level;
mod market_data;

pub use level::*;
pub use market_data::*;
