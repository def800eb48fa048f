//! 시세 스냅샷 타입.
//!
//! 이 모듈은 한 시점의 시세 관측값을 정의합니다:
//! - `QuoteSnapshot` - 단일 시세 관측값
//! - `QuoteSource` - 관측값을 생성한 업스트림 출처 태그
//!
//! `delta`/`delta_percent`는 파싱 단계에서 "알 수 없음"(None)을 유지하고,
//! 산술 경계에서만 0으로 기본값 처리합니다. 진짜 0 가격은 유효한 도메인
//! 데이터이므로 "데이터 없음"과 혼동하면 안 됩니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::types::{DecimalExt, InstrumentKey, Percentage, Price};

/// 시세 출처 태그.
///
/// 중복 판정 범위와 "어느 레코드가 이기는가" 결정에 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuoteSource {
    /// 백그라운드 폴링 수집 (append-only 이력)
    ScheduledPoll,
    /// 수동 트리거 수집
    ManualTrigger,
    /// 현물 피드
    SpotFeed,
    /// 기업 공시/업데이트 피드
    CompanyUpdate,
}

impl QuoteSource {
    /// 저장소 provenance 컬럼 값을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::ScheduledPoll => "scheduled-poll",
            QuoteSource::ManualTrigger => "manual-trigger",
            QuoteSource::SpotFeed => "spot-feed",
            QuoteSource::CompanyUpdate => "company-update",
        }
    }
}

impl fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QuoteSource {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled-poll" => Ok(QuoteSource::ScheduledPoll),
            "manual-trigger" => Ok(QuoteSource::ManualTrigger),
            "spot-feed" => Ok(QuoteSource::SpotFeed),
            "company-update" => Ok(QuoteSource::CompanyUpdate),
            _ => Err(EngineError::InvalidInput(format!(
                "알 수 없는 시세 출처: {}",
                s
            ))),
        }
    }
}

/// 단일 시세 관측값.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// 인스트루먼트 키 (금속 + 계약월)
    pub instrument: InstrumentKey,
    /// 관측 시각 (업스트림 보고 시각 또는 수집 시각 fallback)
    pub observed_at: DateTime<Utc>,
    /// 가격
    pub price: Price,
    /// 기준가 대비 변동 (알 수 없으면 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Price>,
    /// 변동률 % (알 수 없으면 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_percent: Option<Percentage>,
    /// 출처 태그
    pub source: QuoteSource,
}

impl QuoteSnapshot {
    /// 새 스냅샷을 생성합니다.
    pub fn new(
        instrument: InstrumentKey,
        observed_at: DateTime<Utc>,
        price: Decimal,
        source: QuoteSource,
    ) -> Self {
        Self {
            instrument,
            observed_at,
            price,
            delta: None,
            delta_percent: None,
            source,
        }
    }

    /// 변동값을 설정합니다.
    pub fn with_change(mut self, delta: Decimal, delta_percent: Decimal) -> Self {
        self.delta = Some(delta);
        self.delta_percent = Some(delta_percent);
        self
    }

    /// 산술용 변동값 (알 수 없으면 0).
    pub fn delta_or_zero(&self) -> Decimal {
        self.delta.unwrap_or(Decimal::ZERO)
    }

    /// 산술용 변동률 (알 수 없으면 0).
    pub fn delta_percent_or_zero(&self) -> Decimal {
        self.delta_percent.unwrap_or(Decimal::ZERO)
    }

    /// 중복 판정용 정규화 지문 `(price, delta, delta_percent)`.
    ///
    /// 각 수치를 2자리로 정규화한 값이며, 같은 출처 범위 안에서
    /// 이 지문이 일치하면 중복으로 판정합니다.
    pub fn dedup_fingerprint(&self) -> (Decimal, Decimal, Decimal) {
        (
            self.price.normalized(),
            self.delta_or_zero().normalized(),
            self.delta_percent_or_zero().normalized(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metal;
    use rust_decimal_macros::dec;

    fn snapshot(price: Decimal) -> QuoteSnapshot {
        QuoteSnapshot::new(
            InstrumentKey::spot(Metal::Aluminium),
            Utc::now(),
            price,
            QuoteSource::ScheduledPoll,
        )
    }

    #[test]
    fn test_unknown_change_defaults_to_zero() {
        let snap = snapshot(dec!(245.30));
        assert_eq!(snap.delta, None);
        assert_eq!(snap.delta_or_zero(), Decimal::ZERO);
        assert_eq!(snap.delta_percent_or_zero(), Decimal::ZERO);
    }

    #[test]
    fn test_fingerprint_normalizes_noise() {
        let a = snapshot(dec!(245.3000001)).with_change(dec!(-0.4), dec!(-0.17));
        let b = snapshot(dec!(245.30)).with_change(dec!(-0.400004), dec!(-0.1700002));
        assert_eq!(a.dedup_fingerprint(), b.dedup_fingerprint());
    }

    #[test]
    fn test_source_roundtrip() {
        for source in [
            QuoteSource::ScheduledPoll,
            QuoteSource::ManualTrigger,
            QuoteSource::SpotFeed,
            QuoteSource::CompanyUpdate,
        ] {
            let parsed: QuoteSource = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
    }
}
