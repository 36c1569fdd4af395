//! # Kairan ドメイン層
//!
//! 一斉送信メッセージ配信パイプラインの中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! このクレートは DDD（ドメイン駆動設計）の原則に従い、以下を提供する:
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（例: MassMessage,
//!   Category）
//! - **値オブジェクト**: 識別子を持たない不変オブジェクト（例: Email,
//!   Conjunction）
//! - **純粋なドメインロジック**: バッチ分割などの副作用を持たない計算
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! apps → infra → domain → shared
//! ```
//!
//! ドメイン層はインフラ層（DB、キュー、メール送信）には一切依存しない。
//! これにより、宛先解決やバッチ分割のロジックが純粋に保たれる。
//!
//! ## モジュール構成
//!
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`message`] - 一斉送信メッセージと送信時設定スナップショット
//! - [`category`] - 配信カテゴリとグルーピング定義
//! - [`recipient`] - 宛先レコードとアカウント情報
//! - [`batch`] - 配信バッチへの分割ロジック
//! - [`dispatch`] - キュー投入アイテムのスキーマ
//! - [`outbound`] - 合成済み送信メールと送信エラー
//! - [`clock`] - テスト可能な時刻供給
//!
//! ## 使用例
//!
//! ```rust
//! use kairan_domain::{DomainError, message::MessageId};
//!
//! // メッセージ ID の生成
//! let message_id = MessageId::new();
//!
//! // ドメインエラーの生成
//! let error = DomainError::NotFound {
//!     entity_type: "Category",
//!     id:          "staff".to_string(),
//! };
//! ```

#[macro_use]
mod macros;

pub mod batch;
pub mod category;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod outbound;
pub mod recipient;

pub use error::DomainError;
