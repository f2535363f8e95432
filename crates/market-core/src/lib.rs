//! # Market Core
//!
//! 시계열 시장 데이터 저장소의 핵심 타입을 제공합니다.
//!
//! 이 크레이트는 저장소 전반에서 사용되는 기본 타입을 제공합니다:
//! - 타임프레임과 시리즈 키 (심볼 + 타임프레임)
//! - 캔들, 체결, 클러스터, 가격 레벨, 차익 델타 레코드
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod logging;
pub mod types;

pub use crate::config::*;
pub use domain::*;
pub use logging::*;
pub use types::*;
