//! 수동 수집 트리거 endpoint.
//!
//! "지금 수집 주기 1회 실행" 작업입니다. 멱등이며, 백그라운드
//! 스케줄러와 같은 직렬화 락을 지나므로 동시에 호출해도 주기가
//! 겹치지 않습니다.
//!
//! # 엔드포인트
//!
//! - `POST /api/v1/ingest/run` - 수집 주기 1회 실행

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use metals_collector::{CycleOutcome, CycleStats};
use metals_core::QuoteSource;

use crate::error::ApiErrorResponse;
use crate::state::AppState;

/// 수집 트리거 응답.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    /// 주기 결과 ("completed" | "skipped")
    pub outcome: String,
    /// 건너뛴 사유 (캘린더 차단 시)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// 수집 통계 (완료 시)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CycleStats>,
}

/// 수집 주기 1회 실행.
///
/// POST /api/v1/ingest/run
pub async fn trigger_ingest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    match state.scheduler.run_once(QuoteSource::ManualTrigger).await {
        Ok(CycleOutcome::Completed(stats)) => {
            info!(
                inserted = stats.inserted,
                duplicates = stats.duplicates,
                "수동 수집 완료"
            );
            Ok(Json(IngestResponse {
                success: true,
                outcome: "completed".to_string(),
                reason: None,
                stats: Some(stats),
            }))
        }
        Ok(CycleOutcome::Skipped(reason)) => Ok(Json(IngestResponse {
            success: true,
            outcome: "skipped".to_string(),
            reason: Some(reason.as_str()),
            stats: None,
        })),
        Err(e) => {
            error!(error = %e, "수동 수집 실패");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiErrorResponse::new(
                    "INGEST_FAILED",
                    format!("수집 주기 실패: {}", e),
                )),
            ))
        }
    }
}

/// 수집 트리거 라우터 생성.
pub fn ingest_router() -> Router<Arc<AppState>> {
    Router::new().route("/run", post(trigger_ingest))
}
