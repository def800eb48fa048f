//! 세션 기반 집계 결과 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Percentage, Price};

/// 세션 범위 집계 결과.
///
/// `count == 0`이면 모든 수치 필드는 0이며, "0 가격" 결과와는
/// `count`로 구분합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// 집계에 포함된 포인트 수 (분 단위 중복 제거 후)
    pub count: u64,
    /// 최저가
    pub min: Price,
    /// 최고가
    pub max: Price,
    /// 평균가
    pub avg: Price,
    /// 범위 내 첫 관측값
    pub first: Price,
    /// 범위 내 마지막 관측값
    pub last: Price,
    /// last - first
    pub delta: Price,
    /// delta / first * 100 (first가 0이면 0)
    pub delta_percent: Percentage,
    /// 집계 범위 시작
    pub range_start: DateTime<Utc>,
    /// 집계 범위 끝
    pub range_end: DateTime<Utc>,
}

impl AggregateResult {
    /// 데이터 없는 범위의 0 결과를 생성합니다.
    ///
    /// 거래 시간 외에는 이것이 정상 상태이므로 에러가 아닙니다.
    pub fn empty(range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            min: Decimal::ZERO,
            max: Decimal::ZERO,
            avg: Decimal::ZERO,
            first: Decimal::ZERO,
            last: Decimal::ZERO,
            delta: Decimal::ZERO,
            delta_percent: Decimal::ZERO,
            range_start,
            range_end,
        }
    }

    /// 데이터가 있는 결과인지 확인합니다.
    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_distinguishable_from_zero_price() {
        let now = Utc::now();
        let empty = AggregateResult::empty(now, now);
        assert!(!empty.has_data());
        assert_eq!(empty.min, Decimal::ZERO);

        let zero_price = AggregateResult {
            count: 1,
            ..AggregateResult::empty(now, now)
        };
        assert!(zero_price.has_data());
    }
}
