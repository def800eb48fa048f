//! 금속 시세 API 서버.
//!
//! Axum 기반 REST API 서버를 시작합니다. 집계 조회, 거래 상태,
//! 수동 수집 트리거, 헬스 체크 엔드포인트를 제공하며, 백그라운드
//! 수집 스케줄러를 같은 프로세스에서 구동합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use metals_api::routes::create_api_router;
use metals_api::state::AppState;
use metals_collector::{CollectorConfig, IngestionScheduler};
use metals_core::{CalendarPolicy, LogConfig, ServerConfig, TradingCalendar};
use metals_data::{AggregationEngine, Database, DatabaseConfig, FeedClient, QuoteRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // 로깅 초기화
    metals_core::init_logging(&LogConfig::from_env());

    info!("MetalDesk API 서버 시작");

    // 설정 로드
    let server_config = ServerConfig::from_env();
    let collector_config = CollectorConfig::from_env()?;
    let calendar = TradingCalendar::new(CalendarPolicy::from_env()?);

    // DB 연결 및 마이그레이션
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;
    info!("데이터베이스 연결 성공");

    let repo = QuoteRepository::new(db.pool().clone());
    let engine = AggregationEngine::new(repo.clone(), calendar.clone());
    let feed = Arc::new(FeedClient::new(&collector_config.feed)?);
    let scheduler = Arc::new(IngestionScheduler::new(
        repo,
        feed,
        calendar.clone(),
        collector_config,
    ));

    let state = Arc::new(AppState::new(
        db.pool().clone(),
        calendar,
        engine,
        scheduler.clone(),
    ));

    // 백그라운드 수집 서비스
    let shutdown = CancellationToken::new();
    let collector_token = shutdown.clone();
    let collector_handle = tokio::spawn(async move {
        scheduler.run_forever(collector_token).await;
    });

    // 라우터 구성
    let app = create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    info!(addr = %addr, "리스닝 시작");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                error!("종료 신호 핸들러 설치 실패");
            }
            info!("종료 신호 수신, 서버 종료 중...");
            shutdown_signal.cancel();
        })
        .await?;

    // 진행 중인 수집 주기를 정리하고 풀을 닫는다
    shutdown.cancel();
    if let Err(e) = collector_handle.await {
        error!(error = %e, "수집 서비스 종료 대기 실패");
    }
    db.close().await;

    info!("MetalDesk API 서버 종료");
    Ok(())
}
