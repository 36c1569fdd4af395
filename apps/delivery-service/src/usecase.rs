//! # ユースケース層
//!
//! 配信パイプラインの各段階を実装する。
//!
//! - [`audience`] - 宛先解決（グルーピング解決・配信停止・在籍確認）
//! - [`composer`] - 配信内容の組み立て（純粋関数）
//! - [`submission`] - 受付と受付キューアイテムの処理
//! - [`delivery`] - 配信キューアイテムの処理

pub mod audience;
pub mod composer;
pub mod delivery;
pub mod submission;

pub use audience::AudienceResolver;
pub use delivery::DeliveryUseCase;
pub use submission::{SendDefaults, SubmissionInput, SubmissionUseCase};
