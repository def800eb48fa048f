//! 환경변수 기반 설정 모듈.
//!
//! 모든 바이너리는 dotenvy + 환경변수로 설정을 로드합니다.
//! 섹션별 설정 구조체는 각 크레이트가 정의하고, 여기서는 공용
//! 파싱 헬퍼와 서버 설정을 제공합니다.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// API 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// 환경변수에서 설정 로드 (`API_HOST`, `API_PORT`).
    pub fn from_env() -> Self {
        Self {
            host: env_var_or("API_HOST", "127.0.0.1"),
            port: env_var_parse("API_PORT", 3000),
        }
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용).
pub fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수 문자열 값 (없으면 기본값).
pub fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// "HH:MM" 형식 시각 파싱.
pub fn parse_hhmm(s: &str) -> EngineResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| EngineError::Config(format!("잘못된 시각 형식 (HH:MM): {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        let t = parse_hhmm("23:30").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("0930").is_err());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
    }
}
