//! 집계 조회 endpoint.
//!
//! 세션 범위 집계 시리즈를 반환합니다. "데이터 없음"은 500이 아니라
//! count=0의 구조화된 0 결과입니다 — 거래 시간 외에는 그것이 정상
//! 상태입니다. 저장소가 일시적으로 불가하면 마지막 성공 응답으로
//! 폴백하며 `cached: true`로 명시합니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/quotes/aggregate` - 세션 범위 집계 조회

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use metals_core::{AggregateResult, ContractLabel, Metal, MonthSlot, TradingSession};
use metals_data::{AggregateQuery, AggregateSeries, SeriesPoint};

use crate::error::ApiErrorResponse;
use crate::state::{AppState, CachedAggregate};

/// 집계 조회 파라미터.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateParams {
    /// 인스트루먼트 ("aluminium", "aluminium:spot", "aluminium:month1")
    pub instrument: String,
    /// 범위 시작 (RFC 3339, 없으면 현재 조회 세션)
    pub range_start: Option<DateTime<Utc>>,
    /// 범위 끝
    pub range_end: Option<DateTime<Utc>>,
    /// 최대 포인트 수
    pub limit: Option<i64>,
}

/// 거래 상태 요약.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatus {
    /// 세션 개장 여부
    pub is_open: bool,
    /// 차단 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// 조회 세션
    pub session: TradingSession,
}

/// 집계 조회 응답.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub success: bool,
    /// 해석된 인스트루먼트 (현재 계약월 라벨 반영)
    pub instrument: String,
    /// 시계열 포인트
    pub data: Vec<SeriesPoint>,
    /// 집계 통계
    pub stats: AggregateResult,
    /// 집계 상태 ("ok" | "no-data-for-window")
    pub status: String,
    /// 거래 상태
    pub trading_status: TradingStatus,
    /// 캐시된 폴백 응답 여부
    pub cached: bool,
}

impl AggregateResponse {
    fn from_series(series: AggregateSeries, trading_status: TradingStatus, cached: bool) -> Self {
        Self {
            success: true,
            instrument: series.instrument.to_string(),
            data: series.points,
            status: series.status.as_str().to_string(),
            stats: series.stats,
            trading_status,
            cached,
        }
    }
}

/// 세션 범위 집계 조회.
///
/// GET /api/v1/quotes/aggregate?instrument=aluminium:month1
///
/// 계약월은 슬롯(month1/month2/month3)으로 지정합니다. 라벨은
/// 롤링되므로 호출자가 라벨을 직접 지정하면 오래된 라벨로 다른
/// 계약을 조회하게 됩니다 — 현재 라벨은 엔진이 해석해 응답의
/// `instrument`에 반영합니다.
pub async fn get_aggregate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AggregateParams>,
) -> Result<Json<AggregateResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    let (metal, slot) =
        parse_instrument(&params.instrument).map_err(|e| (StatusCode::BAD_REQUEST, Json(e)))?;

    let now = Utc::now();
    let decision = state.calendar.gate(now);
    let trading_status = TradingStatus {
        is_open: decision.allowed,
        reason: decision.reason.map(|r| r.as_str()),
        session: state.calendar.query_session(now),
    };

    let query = AggregateQuery {
        metal,
        slot,
        range_start: params.range_start,
        range_end: params.range_end,
        limit: params.limit,
    };

    debug!(
        instrument = %params.instrument,
        range_start = ?params.range_start,
        range_end = ?params.range_end,
        "집계 조회 시작"
    );

    match state.engine.aggregate(&query, now).await {
        Ok(series) => {
            state.response_cache.write().await.insert(
                params.instrument.clone(),
                CachedAggregate {
                    series: series.clone(),
                    cached_at: now,
                },
            );

            Ok(Json(AggregateResponse::from_series(
                series,
                trading_status,
                false,
            )))
        }
        Err(e) => {
            warn!(
                instrument = %params.instrument,
                error = %e,
                "집계 조회 실패 — 캐시 폴백 시도"
            );

            // 마지막 성공 응답으로 폴백, cached 명시
            let cached = state
                .response_cache
                .read()
                .await
                .get(&params.instrument)
                .cloned();

            match cached {
                Some(entry) => Ok(Json(AggregateResponse::from_series(
                    entry.series,
                    trading_status,
                    true,
                ))),
                None => Err((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiErrorResponse::new(
                        "STORE_UNAVAILABLE",
                        format!("집계 조회 실패: {}", e),
                    )),
                )),
            }
        }
    }
}

/// 인스트루먼트 파라미터 파싱.
///
/// 허용 형식: `"<metal>"`, `"<metal>:spot"`, `"<metal>:month1|2|3"`.
/// 계약월 라벨(예: "JAN25")은 거부합니다 — 라벨은 롤링되므로 항상
/// 슬롯으로 조회해야 합니다.
fn parse_instrument(raw: &str) -> Result<(Metal, Option<MonthSlot>), ApiErrorResponse> {
    let (metal_str, rest) = match raw.split_once(':') {
        Some((m, r)) => (m, Some(r)),
        None => (raw, None),
    };

    let metal: Metal = metal_str.parse().map_err(|_| {
        ApiErrorResponse::new(
            "INVALID_INSTRUMENT",
            format!("알 수 없는 금속: {}", metal_str),
        )
    })?;

    let slot = match rest {
        None => None,
        Some(part) => match part.to_lowercase().as_str() {
            "spot" => None,
            "month1" => Some(MonthSlot::Month1),
            "month2" => Some(MonthSlot::Month2),
            "month3" => Some(MonthSlot::Month3),
            other => {
                let message = if ContractLabel::new(other).is_ok() {
                    format!(
                        "계약월 라벨({})은 롤링되므로 직접 조회할 수 없습니다. \
                         month1/month2/month3 슬롯을 사용하세요",
                        other.to_uppercase()
                    )
                } else {
                    format!("알 수 없는 슬롯: {}", other)
                };
                return Err(ApiErrorResponse::new("INVALID_INSTRUMENT", message));
            }
        },
    };

    Ok((metal, slot))
}

/// 집계 조회 라우터 생성.
pub fn quotes_router() -> Router<Arc<AppState>> {
    Router::new().route("/aggregate", get(get_aggregate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[test]
    fn test_parse_instrument_spot() {
        assert_eq!(
            parse_instrument("aluminium").unwrap(),
            (Metal::Aluminium, None)
        );
        assert_eq!(
            parse_instrument("copper:spot").unwrap(),
            (Metal::Copper, None)
        );
    }

    #[test]
    fn test_parse_instrument_slot() {
        assert_eq!(
            parse_instrument("aluminium:month1").unwrap(),
            (Metal::Aluminium, Some(MonthSlot::Month1))
        );
        assert_eq!(
            parse_instrument("zinc:MONTH3").unwrap(),
            (Metal::Zinc, Some(MonthSlot::Month3))
        );
    }

    #[test]
    fn test_parse_instrument_rejects_raw_label() {
        let err = parse_instrument("aluminium:JAN25").unwrap_err();
        assert_eq!(err.code, "INVALID_INSTRUMENT");
        assert!(err.message.contains("month1"));
    }

    #[test]
    fn test_parse_instrument_unknown_metal() {
        assert!(parse_instrument("adamantium:spot").is_err());
    }

    #[tokio::test]
    async fn test_invalid_instrument_is_bad_request() {
        use crate::state::create_test_state;

        let state = Arc::new(create_test_state());
        let app = Router::new()
            .route("/aggregate", get(get_aggregate))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/aggregate?instrument=adamantium")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_unavailable_without_cache() {
        use crate::state::create_test_state;

        // 연결 불가능한 lazy 풀 + 빈 캐시 — 폴백 없이 503
        let state = Arc::new(create_test_state());
        let app = Router::new()
            .route("/aggregate", get(get_aggregate))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/aggregate?instrument=aluminium:spot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
