//! 데이터 수집 모듈.

pub mod poll_cycle;

pub use poll_cycle::{run_cycle, CycleOutcome};
