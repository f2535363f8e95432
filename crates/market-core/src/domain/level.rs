//! 기술적 가격 레벨.
//!
//! 레벨은 파생 값으로, (시리즈, 레벨 유형)마다 현재 값 하나만 유지됩니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 가격 레벨 유형.
///
/// DB에는 `code()` 값(SMALLINT)으로 저장됩니다. 코드는 변경하지 마세요.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelType {
    /// 지지선
    Support,
    /// 저항선
    Resistance,
    /// 피벗 포인트
    Pivot,
    /// 최대 거래량 가격 (Point of Control)
    PointOfControl,
    /// 밸류 에어리어 상단
    ValueAreaHigh,
    /// 밸류 에어리어 하단
    ValueAreaLow,
}

impl LevelType {
    /// 저장 코드.
    pub fn code(&self) -> i16 {
        match self {
            LevelType::Support => 1,
            LevelType::Resistance => 2,
            LevelType::Pivot => 3,
            LevelType::PointOfControl => 4,
            LevelType::ValueAreaHigh => 5,
            LevelType::ValueAreaLow => 6,
        }
    }

    /// 저장 코드에서 변환합니다.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(LevelType::Support),
            2 => Some(LevelType::Resistance),
            3 => Some(LevelType::Pivot),
            4 => Some(LevelType::PointOfControl),
            5 => Some(LevelType::ValueAreaHigh),
            6 => Some(LevelType::ValueAreaLow),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LevelType::Support => "support",
            LevelType::Resistance => "resistance",
            LevelType::Pivot => "pivot",
            LevelType::PointOfControl => "poc",
            LevelType::ValueAreaHigh => "vah",
            LevelType::ValueAreaLow => "val",
        }
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LevelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "support" => Ok(LevelType::Support),
            "resistance" => Ok(LevelType::Resistance),
            "pivot" => Ok(LevelType::Pivot),
            "poc" | "point_of_control" => Ok(LevelType::PointOfControl),
            "vah" | "value_area_high" => Ok(LevelType::ValueAreaHigh),
            "val" | "value_area_low" => Ok(LevelType::ValueAreaLow),
            _ => Err(format!("Unknown level type: {}", s)),
        }
    }
}
