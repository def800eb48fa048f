//! 데이터 수집 및 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - 업스트림 피드 클라이언트 및 이기종 페이로드 파서
//! - PostgreSQL 시세 저장소 (이력 append / 일자별 latest-wins upsert)
//! - 근접 중복 스냅샷 게이트
//! - 세션 범위 집계 엔진

pub mod aggregate;
pub mod dedup;
pub mod error;
pub mod provider;
pub mod storage;

pub use error::{DataError, Result};

// 저장소 타입 재내보내기
pub use storage::{Database, DatabaseConfig, QuoteRepository, QuoteRow};

// 피드/파서 재내보내기
pub use provider::{
    normalize_quotes, parse_payload, parse_rate_change, ChangeQuote, ContractQuote, FeedClient,
    FeedClientConfig, FeedData, QuoteFeed, SpotQuote,
};

// 중복 게이트 재내보내기
pub use dedup::{DedupGate, GateOutcome};

// 집계 엔진 재내보내기
pub use aggregate::{
    AggregateQuery, AggregateSeries, AggregateStatus, AggregationEngine, SeriesPoint,
};
