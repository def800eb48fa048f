//! 근접 중복 스냅샷 게이트.
//!
//! 업스트림 폴링 주기는 실제 가격 변동보다 빠릅니다. 이 게이트가
//! 없으면 횡보 구간의 중복 행으로 저장소가 무한히 불어나고 다운스트림
//! 집계가 이중 계산됩니다.
//!
//! 판정: 같은 출처 범위에서 lookback 윈도우 내에 정규화된
//! `(price, delta, delta_percent)` 지문이 일치하는 레코드가 있으면
//! 중복입니다. 중복이면 삽입을 건너뛰고 기존 레코드를 돌려줍니다
//! (멱등 read-through).
//!
//! 일자별 최신값 시리즈는 이 게이트를 거치지 않습니다 — 그쪽은
//! latest-wins upsert라는 별개 체계입니다 (`QuoteRepository` 참조).

use chrono::{DateTime, Duration, Utc};
use metals_core::QuoteSnapshot;

use crate::error::Result;
use crate::storage::QuoteRepository;

/// 게이트 판정 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// 신규 — 삽입해야 함
    Fresh,
    /// 중복 — 삽입 건너뛰고 기존 레코드 반환
    Duplicate(QuoteSnapshot),
}

/// 중복 게이트.
#[derive(Debug, Clone)]
pub struct DedupGate {
    lookback: Duration,
}

impl DedupGate {
    /// 지정한 lookback 윈도우로 게이트를 생성합니다.
    pub fn new(lookback: Duration) -> Self {
        Self { lookback }
    }

    /// 초 단위 lookback으로 게이트를 생성합니다.
    pub fn from_secs(secs: i64) -> Self {
        Self::new(Duration::seconds(secs))
    }

    /// lookback 윈도우를 반환합니다.
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// 두 스냅샷의 정규화 지문이 일치하는지 확인합니다.
    pub fn matches(candidate: &QuoteSnapshot, existing: &QuoteSnapshot) -> bool {
        candidate.dedup_fingerprint() == existing.dedup_fingerprint()
    }

    /// 나이가 lookback 안에 있는지 확인합니다.
    ///
    /// 경계는 엄격 미만: 정확히 lookback만큼 떨어진 레코드는
    /// 중복이 아닙니다.
    pub fn within_lookback(
        &self,
        candidate_at: DateTime<Utc>,
        existing_at: DateTime<Utc>,
    ) -> bool {
        candidate_at - existing_at < self.lookback
    }

    /// 후보 스냅샷을 판정합니다.
    pub async fn check(
        &self,
        repo: &QuoteRepository,
        candidate: &QuoteSnapshot,
    ) -> Result<GateOutcome> {
        let since = candidate.observed_at - self.lookback;
        let rows = repo
            .recent_by_source(&candidate.instrument, candidate.source, since)
            .await?;

        for row in rows {
            let existing = match row.to_snapshot() {
                Ok(snap) => snap,
                Err(e) => {
                    tracing::warn!(error = %e, "변환 불가 레코드 무시");
                    continue;
                }
            };

            if Self::matches(candidate, &existing)
                && self.within_lookback(candidate.observed_at, existing.observed_at)
            {
                tracing::debug!(
                    instrument = %candidate.instrument,
                    price = %candidate.price,
                    "중복 스냅샷 — 삽입 건너뜀"
                );
                return Ok(GateOutcome::Duplicate(existing));
            }
        }

        Ok(GateOutcome::Fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metals_core::{InstrumentKey, Metal, QuoteSource};
    use rust_decimal_macros::dec;

    fn snapshot(price: rust_decimal::Decimal, at: DateTime<Utc>) -> QuoteSnapshot {
        QuoteSnapshot {
            instrument: InstrumentKey::spot(Metal::Aluminium),
            observed_at: at,
            price,
            delta: Some(dec!(-0.4)),
            delta_percent: Some(dec!(-0.17)),
            source: QuoteSource::ScheduledPoll,
        }
    }

    #[test]
    fn test_matches_across_float_noise() {
        let now = Utc::now();
        let a = snapshot(dec!(245.30), now);
        let b = snapshot(dec!(245.3000001), now + Duration::seconds(60));
        assert!(DedupGate::matches(&a, &b));
    }

    #[test]
    fn test_different_price_not_duplicate() {
        let now = Utc::now();
        let a = snapshot(dec!(245.30), now);
        let b = snapshot(dec!(245.35), now);
        assert!(!DedupGate::matches(&a, &b));
    }

    #[test]
    fn test_lookback_boundary_strict() {
        let gate = DedupGate::from_secs(600);
        let t0 = Utc::now();

        // lookback 미만은 중복 후보
        assert!(gate.within_lookback(t0 + Duration::seconds(599), t0));
        // 정확히 lookback이면 신규
        assert!(!gate.within_lookback(t0 + Duration::seconds(600), t0));
        assert!(!gate.within_lookback(t0 + Duration::seconds(601), t0));
    }
}
