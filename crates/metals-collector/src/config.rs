//! 환경변수 기반 설정 모듈.

use std::time::Duration;

use metals_core::{env_var_or, env_var_parse, Metal};
use metals_data::FeedClientConfig;

use crate::error::CollectorError;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 피드 클라이언트 설정
    pub feed: FeedClientConfig,
    /// 폴링 설정
    pub poll: PollConfig,
    /// 수집 대상 금속
    pub metals: Vec<Metal>,
}

/// 폴링 설정
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// 세션 내 폴링 주기 (초)
    pub in_session_secs: u64,
    /// 세션 외 폴링 주기 (초)
    pub off_session_secs: u64,
    /// 중복 게이트 lookback (초)
    pub dedup_lookback_secs: i64,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("FEED_BASE_URL").map_err(|_| {
            CollectorError::Config("FEED_BASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let metals = parse_metals(&env_var_or("POLL_METALS", ""))?;

        Ok(Self {
            feed: FeedClientConfig {
                base_url,
                timeout_secs: env_var_parse("FEED_TIMEOUT_SECS", 8),
            },
            poll: PollConfig {
                in_session_secs: env_var_parse("POLL_INTERVAL_SECS", 60),
                off_session_secs: env_var_parse("POLL_OFFHOURS_INTERVAL_SECS", 300),
                dedup_lookback_secs: env_var_parse("DEDUP_LOOKBACK_SECS", 600),
            },
            metals,
        })
    }
}

impl PollConfig {
    /// 세션 내 폴링 주기를 Duration으로 반환
    pub fn in_session_interval(&self) -> Duration {
        Duration::from_secs(self.in_session_secs)
    }

    /// 세션 외 폴링 주기를 Duration으로 반환
    pub fn off_session_interval(&self) -> Duration {
        Duration::from_secs(self.off_session_secs)
    }
}

/// 쉼표로 구분된 금속 목록 파싱 (빈 문자열이면 전체)
fn parse_metals(raw: &str) -> Result<Vec<Metal>> {
    if raw.trim().is_empty() {
        return Ok(Metal::all().to_vec());
    }

    let mut metals = Vec::new();
    for part in raw.split(',') {
        let metal: Metal = part
            .trim()
            .parse()
            .map_err(|e: metals_core::EngineError| CollectorError::Config(e.to_string()))?;
        if !metals.contains(&metal) {
            metals.push(metal);
        }
    }
    Ok(metals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metals_empty_means_all() {
        let metals = parse_metals("").unwrap();
        assert_eq!(metals.len(), Metal::all().len());
    }

    #[test]
    fn test_parse_metals_list() {
        let metals = parse_metals("aluminium, copper").unwrap();
        assert_eq!(metals, vec![Metal::Aluminium, Metal::Copper]);
    }

    #[test]
    fn test_parse_metals_unknown() {
        assert!(parse_metals("aluminium,adamantium").is_err());
    }
}
