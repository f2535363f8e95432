//! 시리즈 식별 키.
//!
//! 하나의 시리즈는 (심볼, 타임프레임) 쌍으로 식별됩니다.
//! 예: `BTCUSDT` 1시간봉, `ETHUSDT` 일봉.
//!
//! 심볼은 저장된 그대로 비교합니다. 대소문자나 공백을 바꾸지 않습니다.

use crate::types::Timeframe;
use serde::{Deserialize, Serialize};
use std::fmt;

/// (심볼, 타임프레임) 시리즈 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// 거래소 심볼 (예: BTCUSDT)
    pub symbol: String,
    /// 타임프레임
    pub timeframe: Timeframe,
}

impl SeriesKey {
    /// 새 시리즈 키를 생성합니다.
    pub fn new(symbol: impl AsRef<str>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.as_ref().to_string(),
            timeframe,
        }
    }

    /// 기본 타임프레임(일봉) 시리즈 키를 생성합니다.
    pub fn daily(symbol: impl AsRef<str>) -> Self {
        Self::new(symbol, Timeframe::DEFAULT)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_key_keeps_symbol_as_given() {
        let key = SeriesKey::new("btcusdt", Timeframe::H1);
        assert_eq!(key.symbol, "btcusdt");
        assert_ne!(key, SeriesKey::new("BTCUSDT", Timeframe::H1));
    }

    #[test]
    fn test_series_key_display() {
        assert_eq!(SeriesKey::daily("ETHUSDT").to_string(), "ETHUSDT@1d");
    }

    #[test]
    fn test_distinct_timeframes_are_distinct_keys() {
        assert_ne!(
            SeriesKey::new("BTCUSDT", Timeframe::H1),
            SeriesKey::new("BTCUSDT", Timeframe::H4)
        );
    }
}
