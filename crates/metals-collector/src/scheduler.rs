//! 수집 스케줄러.
//!
//! 반복 타이머 하나가 한 번에 하나의 수집 주기를 구동합니다.
//! 주기 직렬화는 스케줄러 수준의 뮤텍스로 수행합니다 — 폴링 주기가
//! 의도적으로 저빈도이므로 저장소 잠금이 아니라 여기서 직렬화합니다.
//! 수동 트리거도 같은 락을 지나므로 백그라운드 주기와 겹치지
//! 않습니다.
//!
//! "마지막 시도 시각"은 모듈 전역이 아니라 스케줄러가 소유하는 명시적
//! 상태입니다. 테스트 실행 간/동시 인스턴스 간 숨은 결합이 없습니다.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use metals_core::{QuoteSource, TradingCalendar};
use metals_data::{DedupGate, QuoteFeed, QuoteRepository};

use crate::modules::{run_cycle, CycleOutcome};
use crate::{CollectorConfig, Result};

/// 연속 실패 경고 임계값. 자동 백오프는 하지 않고 운영 경고만 남긴다.
const CONSECUTIVE_FAILURE_ALERT: u32 = 5;

/// 수집 스케줄러.
pub struct IngestionScheduler {
    repo: QuoteRepository,
    feed: Arc<dyn QuoteFeed>,
    calendar: TradingCalendar,
    gate: DedupGate,
    config: CollectorConfig,
    /// 주기 직렬화 락 — 동시 주기는 없다
    cycle_lock: tokio::sync::Mutex<()>,
    /// 마지막 수집 시도 시각 (스케줄러 소유 상태)
    last_attempt: tokio::sync::RwLock<Option<DateTime<Utc>>>,
}

impl IngestionScheduler {
    /// 새 스케줄러를 생성합니다.
    pub fn new(
        repo: QuoteRepository,
        feed: Arc<dyn QuoteFeed>,
        calendar: TradingCalendar,
        config: CollectorConfig,
    ) -> Self {
        let gate = DedupGate::from_secs(config.poll.dedup_lookback_secs);
        Self {
            repo,
            feed,
            calendar,
            gate,
            config,
            cycle_lock: tokio::sync::Mutex::new(()),
            last_attempt: tokio::sync::RwLock::new(None),
        }
    }

    /// 캘린더를 반환합니다.
    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// 마지막 수집 시도 시각을 반환합니다.
    pub async fn last_attempt(&self) -> Option<DateTime<Utc>> {
        *self.last_attempt.read().await
    }

    /// 수집 주기를 한 번 수행합니다.
    ///
    /// 백그라운드 루프와 수동 트리거 모두 이 메서드를 지나며,
    /// 같은 락으로 직렬화되므로 동시에 호출해도 안전합니다.
    pub async fn run_once(&self, source: QuoteSource) -> Result<CycleOutcome> {
        let _guard = self.cycle_lock.lock().await;
        *self.last_attempt.write().await = Some(Utc::now());

        run_cycle(
            &self.repo,
            self.feed.as_ref(),
            &self.calendar,
            &self.gate,
            &self.config,
            source,
            Utc::now(),
        )
        .await
    }

    /// 다음 틱까지의 대기 시간.
    ///
    /// 세션 내 1분, 세션 외 5분(기본값) — 틱마다 다시 평가합니다.
    pub fn next_interval(&self, now: DateTime<Utc>) -> Duration {
        if self.calendar.gate(now).allowed {
            self.config.poll.in_session_interval()
        } else {
            self.config.poll.off_session_interval()
        }
    }

    /// 종료 신호까지 폴링 루프를 수행합니다.
    ///
    /// 어떤 주기 실패도 루프를 죽이지 않습니다. 연속 실패는 백오프
    /// 없이 로그/경고로만 관찰됩니다.
    pub async fn run_forever(&self, shutdown: CancellationToken) {
        let mut consecutive_failures: u32 = 0;

        loop {
            let wait = self.next_interval(Utc::now());

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("종료 신호 수신, 수집 루프 종료");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    match self.run_once(QuoteSource::ScheduledPoll).await {
                        Ok(CycleOutcome::Completed(stats)) => {
                            stats.log_summary("폴링 수집");
                            if stats.all_failed() {
                                consecutive_failures += 1;
                            } else {
                                consecutive_failures = 0;
                            }
                        }
                        Ok(CycleOutcome::Skipped(reason)) => {
                            tracing::debug!(reason = reason.as_str(), "세션 외 — 주기 건너뜀");
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            error!(error = %e, "수집 주기 실패");
                        }
                    }

                    if consecutive_failures >= CONSECUTIVE_FAILURE_ALERT {
                        warn!(
                            consecutive_failures = consecutive_failures,
                            "수집이 연속으로 실패하고 있습니다 — 저장소/피드 상태 확인 필요"
                        );
                    }
                }
            }
        }
    }
}
