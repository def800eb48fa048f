//! PostgreSQL 저장소.

pub mod quotes;

pub use quotes::{QuoteRepository, QuoteRow};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::error::{DataError, Result};
use metals_core::env_var_parse;

/// 데이터베이스 설정.
///
/// 연결 풀은 작은 고정 크기로 제한합니다. 읽기 트래픽이 몰려도
/// 업스트림 데이터베이스의 연결 예산을 소진하면 안 됩니다.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// 데이터베이스 URL
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 획득 타임아웃 (초)
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// 환경변수에서 설정 로드 (`DATABASE_URL` 필수).
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| {
            DataError::ConfigError("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        Ok(Self {
            url,
            max_connections: env_var_parse("DB_MAX_CONNECTIONS", 5),
            acquire_timeout_secs: env_var_parse("DB_ACQUIRE_TIMEOUT_SECS", 10),
        })
    }
}

/// 데이터베이스 연결 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 설정으로 연결 풀을 생성합니다.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// 연결 풀을 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 임베디드 마이그레이션을 적용합니다.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DataError::MigrationError(e.to_string()))
    }

    /// 연결 풀을 닫습니다.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
