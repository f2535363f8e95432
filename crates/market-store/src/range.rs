//! 반개구간 시간 범위와 WHERE 조건 생성.
//!
//! 모든 조회 경로가 같은 경계 규칙을 사용합니다: `from`은 포함, `to`는 제외.
//! 따라서 `[t0, t1)`과 `[t1, t2)`는 겹치거나 빠지는 행 없이 `[t0, t2)`를 분할합니다.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

/// 선택적 하한/상한을 가진 시간 범위 `[from, to)`.
///
/// `from > to`인 범위는 거부하지 않으며 아무 행도 선택하지 않습니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// 경계 없음.
    pub fn all() -> Self {
        Self::default()
    }

    /// `[from, to)`.
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::new(Some(from), Some(to))
    }

    /// `[from, ∞)`.
    pub fn since(from: DateTime<Utc>) -> Self {
        Self::new(Some(from), None)
    }

    /// `(-∞, to)`.
    pub fn until(to: DateTime<Utc>) -> Self {
        Self::new(None, Some(to))
    }

    /// 경계가 하나도 없는지 확인합니다.
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// 시각이 범위에 속하는지 확인합니다. SQL 조건과 같은 규칙입니다.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }

    /// `at`에서 두 개의 인접한 범위로 나눕니다.
    pub fn split_at(&self, at: DateTime<Utc>) -> (Self, Self) {
        (Self::new(self.from, Some(at)), Self::new(Some(at), self.to))
    }

    /// `column`에 대한 조건을 빌더에 추가합니다.
    ///
    /// `column`은 코드에 고정된 식별자만 받으며, 경계 값은 항상 바인딩 파라미터입니다.
    /// 경계가 없으면 `TRUE`를 추가하므로 호출자는 항상 `AND`로 이어 붙일 수 있습니다.
    pub fn push_predicate(&self, builder: &mut QueryBuilder<'_, Postgres>, column: &'static str) {
        match (self.from, self.to) {
            (Some(from), Some(to)) => {
                builder.push(column).push(" >= ").push_bind(from);
                builder.push(" AND ").push(column).push(" < ").push_bind(to);
            }
            (Some(from), None) => {
                builder.push(column).push(" >= ").push_bind(from);
            }
            (None, Some(to)) => {
                builder.push(column).push(" < ").push_bind(to);
            }
            (None, None) => {
                builder.push("TRUE");
            }
        }
    }
}
