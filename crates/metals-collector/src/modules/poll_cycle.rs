//! 시세 폴링 주기 모듈.
//!
//! 주기 상태 머신:
//! `Idle → CheckingCalendar → (Skipped | Fetching) → Parsing → Gating →
//! Persisting → Idle`
//!
//! 캘린더가 닫혀 있으면 fetch 없이 즉시 종료합니다 — 비용 회피는
//! 최적화가 아니라 요구사항입니다. 이후 단계의 어떤 실패도 주기
//! 경계를 넘어 전파되지 않습니다. 주기 안에서 재시도하지 않으며,
//! 다음 틱이 재시도입니다.

use chrono::{DateTime, Utc};
use std::time::Instant;

use metals_core::{GateReason, Metal, QuoteSnapshot, QuoteSource, TradingCalendar};
use metals_data::{
    normalize_quotes, parse_payload, ChangeQuote, DedupGate, FeedData, GateOutcome, QuoteFeed,
    QuoteRepository,
};

use crate::{CollectorConfig, CycleStats, Result};

/// 수집 주기 결과.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// 주기 수행 완료 (부분 실패는 stats.errors로 집계)
    Completed(CycleStats),
    /// 캘린더 차단으로 건너뜀 — 에러가 아닌 정상 게이트 결과
    Skipped(GateReason),
}

/// 수집 주기를 한 번 수행합니다.
pub async fn run_cycle(
    repo: &QuoteRepository,
    feed: &dyn QuoteFeed,
    calendar: &TradingCalendar,
    gate: &DedupGate,
    config: &CollectorConfig,
    source: QuoteSource,
    now: DateTime<Utc>,
) -> Result<CycleOutcome> {
    let start = Instant::now();

    // CheckingCalendar — 닫혀 있으면 fetch 시도 없음
    let decision = calendar.gate(now);
    if !decision.allowed {
        let reason = decision.reason.unwrap_or(GateReason::OutsideHours);
        tracing::info!(reason = reason.as_str(), "캘린더 차단 — 이번 주기 건너뜀");
        return Ok(CycleOutcome::Skipped(reason));
    }

    let mut stats = CycleStats::new();

    for metal in &config.metals {
        stats.metals += 1;

        match ingest_metal(repo, feed, calendar, gate, *metal, source, &mut stats).await {
            Ok(()) => {}
            Err(e) => {
                stats.errors += 1;
                tracing::error!(metal = %metal, error = %e, "금속 수집 실패");
            }
        }
    }

    stats.elapsed = start.elapsed();
    Ok(CycleOutcome::Completed(stats))
}

/// 단일 금속의 fetch → parse → gate → persist 단계.
async fn ingest_metal(
    repo: &QuoteRepository,
    feed: &dyn QuoteFeed,
    calendar: &TradingCalendar,
    gate: &DedupGate,
    metal: Metal,
    source: QuoteSource,
    stats: &mut CycleStats,
) -> Result<()> {
    // Fetching — 클라이언트 타임아웃 한 번으로 제한
    let body = feed.fetch_metal(metal).await?;
    let fetched_at = Utc::now();

    // Parsing — 최상위 실패는 이 금속의 "이번 주기 데이터 없음"
    let feed_data = parse_payload(&body)?;

    // 계약월 맵이면 라벨 롤 상태를 갱신 (O(1) 라벨 해석용)
    if let FeedData::ContractMonths { rolls, .. } = &feed_data {
        repo.upsert_rolls(metal, rolls).await?;
    }

    let snapshots = match &feed_data {
        FeedData::CompanyChanges(changes) => {
            resolve_changes(repo, metal, changes, fetched_at).await?
        }
        _ => normalize_quotes(metal, &feed_data, fetched_at, source),
    };

    if snapshots.is_empty() {
        tracing::debug!(metal = %metal, "유효한 스냅샷 없음");
        return Ok(());
    }
    stats.parsed += snapshots.len();

    // Gating — append 이력 시리즈만 중복 게이트를 거친다
    let mut fresh = Vec::new();
    for snap in snapshots {
        match gate.check(repo, &snap).await? {
            GateOutcome::Fresh => fresh.push(snap),
            GateOutcome::Duplicate(_) => stats.duplicates += 1,
        }
    }

    // Persisting — 한 스냅샷 집합의 행 전체를 단일 트랜잭션으로 기록
    stats.inserted += repo.insert_history(&fresh).await?;

    // 일자별 최신값은 별개 체계: 자연키 latest-wins upsert
    let tz = calendar.policy().timezone;
    for snap in &fresh {
        let observed_date = snap.observed_at.with_timezone(&tz).date_naive();
        repo.upsert_daily(snap, observed_date).await?;
        stats.upserts += 1;
    }

    Ok(())
}

/// 변동값 전용 업데이트를 스냅샷으로 해석합니다.
///
/// 변동은 기준가(최신 저장값) 대비 부호 있는 변화이므로, 저장소의
/// 최신 가격에 변동을 더해 가격을 복원합니다. 기준가가 없으면 그
/// 항목은 건너뜁니다.
async fn resolve_changes(
    repo: &QuoteRepository,
    feed_metal: Metal,
    changes: &[ChangeQuote],
    fetched_at: DateTime<Utc>,
) -> Result<Vec<QuoteSnapshot>> {
    let mut snapshots = Vec::new();

    for change in changes {
        let metal: Metal = match change.name.parse() {
            Ok(metal) => metal,
            Err(_) => {
                tracing::debug!(name = %change.name, feed = %feed_metal, "금속이 아닌 항목 무시");
                continue;
            }
        };

        let Some(delta) = change.delta else {
            continue;
        };

        let instrument = metals_core::InstrumentKey::spot(metal);
        let Some(latest) = repo.latest(&instrument).await? else {
            tracing::debug!(metal = %metal, "기준가 없음 — 변동값 건너뜀");
            continue;
        };

        snapshots.push(QuoteSnapshot {
            instrument,
            observed_at: change.observed_at.unwrap_or(fetched_at),
            price: latest.price + delta,
            delta: Some(delta),
            delta_percent: None,
            source: QuoteSource::CompanyUpdate,
        });
    }

    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use metals_core::CalendarPolicy;
    use metals_data::FeedClientConfig;
    use sqlx::postgres::PgPoolOptions;

    /// 호출되면 안 되는 피드 — 캘린더 차단 시 fetch가 없음을 검증
    struct UnreachableFeed;

    #[async_trait]
    impl QuoteFeed for UnreachableFeed {
        async fn fetch_metal(&self, _metal: Metal) -> metals_data::Result<Vec<u8>> {
            panic!("캘린더가 닫혀 있으면 피드를 호출하면 안 된다");
        }
    }

    fn test_config() -> CollectorConfig {
        CollectorConfig {
            feed: FeedClientConfig {
                base_url: "http://localhost:9".to_string(),
                timeout_secs: 1,
            },
            poll: crate::PollConfig {
                in_session_secs: 60,
                off_session_secs: 300,
                dedup_lookback_secs: 600,
            },
            metals: vec![Metal::Aluminium],
        }
    }

    #[tokio::test]
    async fn test_closed_calendar_skips_without_fetch() {
        // 풀은 실제 연결 없이 생성된다
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let repo = QuoteRepository::new(pool);
        let calendar = TradingCalendar::new(CalendarPolicy::default());
        let gate = DedupGate::from_secs(600);

        // 2025-03-01은 토요일
        let saturday = chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let outcome = run_cycle(
            &repo,
            &UnreachableFeed,
            &calendar,
            &gate,
            &test_config(),
            QuoteSource::ScheduledPoll,
            saturday,
        )
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            CycleOutcome::Skipped(GateReason::Weekend)
        ));
    }
}
