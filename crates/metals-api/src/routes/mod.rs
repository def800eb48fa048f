//! REST API 엔드포인트.

pub mod health;
pub mod ingest;
pub mod market;
pub mod quotes;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터를 생성합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::health_router())
        .nest("/api/v1/quotes", quotes::quotes_router())
        .nest("/api/v1/market", market::market_router())
        .nest("/api/v1/ingest", ingest::ingest_router())
}
