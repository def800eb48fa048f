//! Standalone metals collector CLI.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use metals_core::{CalendarPolicy, LogConfig, TradingCalendar};
use metals_data::{Database, DatabaseConfig, FeedClient, QuoteRepository};
use metals_collector::{CollectorConfig, IngestionScheduler};

#[derive(Parser)]
#[command(name = "metals-collector")]
#[command(about = "MetalDesk Standalone Quote Collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 수집 주기 1회 실행 (cron/수동 트리거용)
    RunOnce,

    /// 데몬 모드: 적응형 주기로 폴링 (세션 내 1분 / 세션 외 5분)
    Daemon,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화
    metals_core::init_logging(&LogConfig::new(format!(
        "metals_collector={level},metals_data={level}",
        level = cli.log_level
    )));

    tracing::info!("MetalDesk Quote Collector 시작");

    // 설정 로드
    let config = CollectorConfig::from_env()?;
    let calendar = TradingCalendar::new(CalendarPolicy::from_env()?);
    tracing::debug!(metals = config.metals.len(), "설정 로드 완료");

    // DB 연결 및 마이그레이션
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;
    tracing::info!("데이터베이스 연결 성공");

    let repo = QuoteRepository::new(db.pool().clone());
    let feed = Arc::new(FeedClient::new(&config.feed)?);
    let scheduler = IngestionScheduler::new(repo, feed, calendar, config);

    // 명령 실행
    match cli.command {
        Commands::RunOnce => {
            match scheduler
                .run_once(metals_core::QuoteSource::ManualTrigger)
                .await?
            {
                metals_collector::CycleOutcome::Completed(stats) => {
                    stats.log_summary("수동 수집");
                }
                metals_collector::CycleOutcome::Skipped(reason) => {
                    tracing::info!(reason = reason.as_str(), "캘린더 차단으로 수집하지 않음");
                }
            }
        }
        Commands::Daemon => {
            tracing::info!("=== 데몬 모드 시작 ===");

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("종료 신호 수신, 데몬 종료 중...");
                    signal_token.cancel();
                }
            });

            scheduler.run_forever(shutdown).await;
        }
    }

    db.close().await;
    tracing::info!("MetalDesk Quote Collector 종료");

    Ok(())
}
