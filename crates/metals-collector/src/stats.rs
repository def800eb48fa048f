//! 수집 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 수집 주기 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    /// 조회한 금속 수
    pub metals: usize,
    /// 파싱된 스냅샷 수
    pub parsed: usize,
    /// 이력 시리즈에 삽입된 수
    pub inserted: usize,
    /// 중복으로 건너뛴 수 (성공한 no-op)
    pub duplicates: usize,
    /// 일자별 최신값 upsert 수
    pub upserts: usize,
    /// 금속 단위 실패 수
    pub errors: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 모든 금속 수집이 실패했는지 확인
    pub fn all_failed(&self) -> bool {
        self.metals > 0 && self.errors == self.metals
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            metals = self.metals,
            parsed = self.parsed,
            inserted = self.inserted,
            duplicates = self.duplicates,
            upserts = self.upserts,
            errors = self.errors,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 주기 완료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_failed() {
        let mut stats = CycleStats::new();
        assert!(!stats.all_failed());

        stats.metals = 2;
        stats.errors = 2;
        assert!(stats.all_failed());

        stats.errors = 1;
        assert!(!stats.all_failed());
    }
}
