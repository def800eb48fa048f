//! 업스트림 피드 HTTP 클라이언트.
//!
//! 금속별 시세 페이로드를 단발(single-shot) GET으로 가져옵니다.
//! 요청 전체에 타임아웃이 걸리며, 주기 안에서 재시도하지 않습니다.
//! 타임아웃/전송 실패는 주기를 중단시키고 다음 틱이 재시도합니다.

use async_trait::async_trait;
use metals_core::Metal;
use std::time::Duration;

use crate::error::{DataError, Result};

/// 피드 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// 피드 베이스 URL (예: "https://feed.example.com")
    pub base_url: String,
    /// 요청 전체 타임아웃 (초)
    pub timeout_secs: u64,
}

impl FeedClientConfig {
    /// 타임아웃을 Duration으로 반환.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 수집 주기가 의존하는 피드 경계.
///
/// 실제 구현은 [`FeedClient`]이며, 테스트는 스텁 피드를 주입합니다.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// 해당 금속의 원본 페이로드를 가져옵니다.
    async fn fetch_metal(&self, metal: Metal) -> Result<Vec<u8>>;
}

/// 업스트림 피드 HTTP 클라이언트.
#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    /// 새 클라이언트를 생성합니다.
    pub fn new(config: &FeedClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DataError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 단발 GET 요청을 보내고 본문을 반환합니다.
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(&url).send().await?;
        let response = response.error_for_status().map_err(DataError::from)?;
        let body = response.bytes().await?;

        tracing::debug!(url = %url, bytes = body.len(), "피드 응답 수신");

        Ok(body.to_vec())
    }
}

#[async_trait]
impl QuoteFeed for FeedClient {
    async fn fetch_metal(&self, metal: Metal) -> Result<Vec<u8>> {
        self.get(&format!("/api/prices/{}", metal.code())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_metal_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/prices/aluminium")
            .with_status(200)
            .with_body(r#"{"spot_price": 245.3}"#)
            .create_async()
            .await;

        let client = FeedClient::new(&FeedClientConfig {
            base_url: server.url(),
            timeout_secs: 5,
        })
        .unwrap();

        let body = client.fetch_metal(Metal::Aluminium).await.unwrap();
        assert!(!body.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_metal_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/prices/copper")
            .with_status(502)
            .create_async()
            .await;

        let client = FeedClient::new(&FeedClientConfig {
            base_url: server.url(),
            timeout_secs: 5,
        })
        .unwrap();

        let err = client.fetch_metal(Metal::Copper).await.unwrap_err();
        assert!(matches!(err, DataError::FetchError(_)));
    }
}
