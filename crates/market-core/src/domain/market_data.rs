//! 시장 데이터 레코드.
//!
//! 이 모듈은 저장소에 기록되는 입력 레코드를 정의합니다:
//! - `Candle` - OHLCV 캔들
//! - `Trade` - 체결 틱
//! - `ClusterBucket` - 거래량 클러스터 프로파일의 가격 구간 하나
//! - `ArbitrageDelta` - 거래소 간 가격 차이

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV 캔들.
///
/// 시리즈(심볼 + 타임프레임)는 레코드가 아니라 저장 호출 시점에 지정됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 캔들 시작 시간
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: Decimal,
}

impl Candle {
    /// 새 캔들을 생성합니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 캔들 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

/// 체결 틱.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// 체결 시간
    pub timestamp: DateTime<Utc>,
    /// 체결 가격
    pub price: Decimal,
    /// 체결 수량
    pub volume: Decimal,
    /// 매수자가 테이커인지 여부
    pub is_buyer: bool,
}

impl Trade {
    /// 새 체결 틱을 생성합니다.
    pub fn new(timestamp: DateTime<Utc>, price: Decimal, volume: Decimal, is_buyer: bool) -> Self {
        Self {
            timestamp,
            price,
            volume,
            is_buyer,
        }
    }

    /// 체결 대금.
    pub fn notional(&self) -> Decimal {
        self.price * self.volume
    }
}

/// 클러스터 프로파일의 가격 구간.
///
/// 하나의 프로파일은 (시간, 구간 크기)를 공유하는 여러 구간으로 구성됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterBucket {
    /// 구간 하한 가격
    pub price: Decimal,
    /// 전체 거래량
    pub volume: Decimal,
    /// 매수 거래량
    pub buy_volume: Decimal,
    /// 매도 거래량
    pub sell_volume: Decimal,
}

impl ClusterBucket {
    /// 매수/매도 거래량으로 구간을 생성합니다.
    pub fn new(price: Decimal, buy_volume: Decimal, sell_volume: Decimal) -> Self {
        Self {
            price,
            volume: buy_volume + sell_volume,
            buy_volume,
            sell_volume,
        }
    }

    /// 매수 - 매도 거래량.
    pub fn delta(&self) -> Decimal {
        self.buy_volume - self.sell_volume
    }
}

/// 거래소 간 가격 차이 한 건.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageDelta {
    /// 절대 가격 차이
    pub delta: Decimal,
    /// 퍼센트 가격 차이
    pub delta_percent: Decimal,
}

impl ArbitrageDelta {
    /// 새 차익 델타를 생성합니다.
    pub fn new(delta: Decimal, delta_percent: Decimal) -> Self {
        Self {
            delta,
            delta_percent,
        }
    }
}
