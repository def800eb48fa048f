//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.
//! Axum의 State extractor를 통해 핸들러에 주입됩니다.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use metals_collector::IngestionScheduler;
use metals_core::TradingCalendar;
use metals_data::{AggregateSeries, AggregationEngine};

/// 마지막으로 성공한 집계 응답.
///
/// 저장소가 일시적으로 불가할 때 읽기 경로의 폴백으로 사용되며,
/// 응답에 `cached: true`로 명시됩니다.
#[derive(Debug, Clone)]
pub struct CachedAggregate {
    /// 집계 결과
    pub series: AggregateSeries,
    /// 캐시 시각
    pub cached_at: DateTime<Utc>,
}

/// 애플리케이션 공유 상태.
pub struct AppState {
    /// 데이터베이스 연결 풀 (PostgreSQL)
    pub db_pool: sqlx::PgPool,

    /// 거래 캘린더 — 세션 경계의 단일 출처
    pub calendar: TradingCalendar,

    /// 집계 엔진
    pub engine: AggregationEngine,

    /// 수집 스케줄러 — 수동 트리거가 백그라운드 루프와 같은
    /// 직렬화 락을 지나도록 공유합니다
    pub scheduler: Arc<IngestionScheduler>,

    /// 인스트루먼트별 마지막 성공 집계 응답.
    ///
    /// 다른 컴포넌트의 런타임 상태를 읽는 대신 AppState가 소유하는
    /// 명시적 캐시 계층입니다.
    pub response_cache: RwLock<HashMap<String, CachedAggregate>>,
}

impl AppState {
    /// 새 상태를 생성합니다.
    pub fn new(
        db_pool: sqlx::PgPool,
        calendar: TradingCalendar,
        engine: AggregationEngine,
        scheduler: Arc<IngestionScheduler>,
    ) -> Self {
        Self {
            db_pool,
            calendar,
            engine,
            scheduler,
            response_cache: RwLock::new(HashMap::new()),
        }
    }
}

/// 라우터 테스트용 상태 (실제 DB 연결 없음).
#[cfg(test)]
pub fn create_test_state() -> AppState {
    use metals_collector::{CollectorConfig, PollConfig};
    use metals_core::CalendarPolicy;
    use metals_data::{FeedClient, FeedClientConfig, QuoteRepository};

    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .expect("lazy pool");

    let calendar = TradingCalendar::new(CalendarPolicy::default());
    let repo = QuoteRepository::new(pool.clone());
    let engine = AggregationEngine::new(repo.clone(), calendar.clone());

    let feed_config = FeedClientConfig {
        base_url: "http://localhost:9".to_string(),
        timeout_secs: 1,
    };
    let config = CollectorConfig {
        feed: feed_config.clone(),
        poll: PollConfig {
            in_session_secs: 60,
            off_session_secs: 300,
            dedup_lookback_secs: 600,
        },
        metals: vec![metals_core::Metal::Aluminium],
    };
    let feed = Arc::new(FeedClient::new(&feed_config).expect("feed client"));
    let scheduler = Arc::new(IngestionScheduler::new(repo, feed, calendar.clone(), config));

    AppState::new(pool, calendar, engine, scheduler)
}
