//! 시리즈 구분에 쓰이는 타임프레임 정의.
//!
//! 저장소에는 거래소 간격 토큰(`"1m"`, `"15m"`, `"1d"` 등)이 그대로 저장되며,
//! 이 모듈은 토큰과 enum 사이의 변환을 담당합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 캔들 집계 간격.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    /// 1분봉
    M1,
    /// 3분봉
    M3,
    /// 5분봉
    M5,
    /// 15분봉
    M15,
    /// 30분봉
    M30,
    /// 1시간봉
    H1,
    /// 2시간봉
    H2,
    /// 4시간봉
    H4,
    /// 6시간봉
    H6,
    /// 8시간봉
    H8,
    /// 12시간봉
    H12,
    /// 일봉
    D1,
    /// 3일봉
    D3,
    /// 주봉
    W1,
    /// 월봉
    MN1,
}

/// (토큰, 초) 테이블. 순서는 enum 선언 순서와 같습니다.
const TOKENS: [(Timeframe, &str, u64); 15] = [
    (Timeframe::M1, "1m", 60),
    (Timeframe::M3, "3m", 3 * 60),
    (Timeframe::M5, "5m", 5 * 60),
    (Timeframe::M15, "15m", 15 * 60),
    (Timeframe::M30, "30m", 30 * 60),
    (Timeframe::H1, "1h", 60 * 60),
    (Timeframe::H2, "2h", 2 * 60 * 60),
    (Timeframe::H4, "4h", 4 * 60 * 60),
    (Timeframe::H6, "6h", 6 * 60 * 60),
    (Timeframe::H8, "8h", 8 * 60 * 60),
    (Timeframe::H12, "12h", 12 * 60 * 60),
    (Timeframe::D1, "1d", 24 * 60 * 60),
    (Timeframe::D3, "3d", 3 * 24 * 60 * 60),
    (Timeframe::W1, "1w", 7 * 24 * 60 * 60),
    // 근사값
    (Timeframe::MN1, "1M", 30 * 24 * 60 * 60),
];

impl Timeframe {
    /// 타임프레임 문맥이 없는 조회(상태, 메타데이터)에서 쓰는 기본값.
    pub const DEFAULT: Timeframe = Timeframe::D1;

    /// 클러스터 조회의 기본 타임프레임.
    pub const CLUSTER_DEFAULT: Timeframe = Timeframe::M15;

    /// 지원하는 모든 타임프레임을 짧은 순서로 반환합니다.
    pub fn all() -> impl Iterator<Item = Timeframe> {
        TOKENS.iter().map(|(tf, _, _)| *tf)
    }

    /// DB에 저장되는 간격 토큰.
    pub fn as_str(&self) -> &'static str {
        TOKENS[*self as usize].1
    }

    /// 이 타임프레임의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(TOKENS[*self as usize].2)
    }

    /// 간격 토큰에서 파싱합니다.
    pub fn from_token(token: &str) -> Option<Self> {
        TOKENS
            .iter()
            .find(|(_, t, _)| *t == token)
            .map(|(tf, _, _)| *tf)
    }

    /// 하루 미만 간격인지 확인합니다.
    pub fn is_intraday(&self) -> bool {
        *self < Timeframe::D1
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| format!("Invalid timeframe: {}", s))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}
