//! # ハンドラ層
//!
//! HTTP リクエストの受付・DTO 変換・レスポンス生成を担う。
//! ビジネスロジックはユースケース層に委譲する。

pub mod health;
pub mod message;

pub use health::{ReadinessState, health_check, readiness_check};
pub use message::{MessageState, submit_mass_message};
