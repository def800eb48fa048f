//! 거래 상태 endpoint.
//!
//! 거래 캘린더의 게이트 판정과 현재 조회 세션을 노출합니다.
//! 세션 경계 계산은 전부 `TradingCalendar`를 지나며, 엔드포인트별
//! 시간 비교는 없습니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/market/status` - 거래 상태 조회

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use metals_core::TradingSession;

use crate::state::AppState;

/// 거래 상태 응답.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatusResponse {
    /// 세션 개장 여부
    pub is_open: bool,
    /// 차단 사유 ("weekend" | "outside-hours")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 현재 조회 세션 (개장 전에는 직전 거래일 세션)
    pub session: TradingSession,
    /// 시장 시간대
    pub timezone: String,
}

/// 거래 상태 조회.
///
/// GET /api/v1/market/status
pub async fn get_market_status(State(state): State<Arc<AppState>>) -> Json<MarketStatusResponse> {
    let now = Utc::now();
    let decision = state.calendar.gate(now);
    let session = state.calendar.query_session(now);

    Json(MarketStatusResponse {
        is_open: decision.allowed,
        reason: decision.reason.map(|r| r.as_str().to_string()),
        session,
        timezone: state.calendar.policy().timezone.to_string(),
    })
}

/// 거래 상태 라우터 생성.
pub fn market_router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_market_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_get_market_status() {
        use crate::state::create_test_state;

        let state = Arc::new(create_test_state());
        let app = Router::new()
            .route("/market/status", get(get_market_status))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/market/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: MarketStatusResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(status.timezone, "Asia/Kolkata");
        assert!(status.session.start < status.session.end);
    }
}
