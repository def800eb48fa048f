//! 시세 도메인 모델.

pub mod aggregate;
pub mod quote;

pub use aggregate::*;
pub use quote::*;
