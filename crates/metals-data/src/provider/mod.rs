//! 업스트림 피드 제공자.
//!
//! - `FeedClient` - 타임아웃이 걸린 단발 HTTP 조회 클라이언트
//! - `QuoteFeed` - 수집 주기와 테스트가 피드를 주입받는 trait 경계
//! - `parser` - 이기종 페이로드를 내부 타입으로 정규화하는 파서

pub mod client;
pub mod parser;

pub use client::{FeedClient, FeedClientConfig, QuoteFeed};
pub use parser::{
    normalize_quotes, parse_payload, parse_rate_change, ChangeQuote, ContractQuote, FeedData,
    SpotQuote,
};
