//! # Kairan インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! このクレートはドメイン層の値とトレイトに対する具体的な実装を提供する。
//! 外部システムの詳細をカプセル化し、ドメイン層をインフラの変更から保護する。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理とマイグレーション
//! - **永続キュー**: Redis を使用した受付キュー・配信キューの実装
//! - **リポジトリ実装**: アカウントディレクトリ・カテゴリ定義・配信停止
//!   設定・アーカイブの照会と保存
//! - **グルーピング解決**: カテゴリ定義をアカウント ID 集合に展開する
//!   方式レジストリとロール方式の実装
//! - **メール送信**: SMTP / AWS SES / noop の切り替え可能なトランスポート
//!
//! ## 依存関係
//!
//! ```text
//! apps → infra → domain → shared
//!          ↘      ↓
//!            shared
//! ```
//!
//! インフラ層は `domain` と `shared` に依存する。
//! ドメイン層はインフラ層に依存しない（依存性逆転の原則）。
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`grouping`] - グルーピング方式レジストリとロール方式
//! - [`mailer`] - メール送信トランスポート
//! - [`queue`] - Redis 永続キュー
//! - [`repository`] - リポジトリ実装
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use kairan_infra::{db, queue::RedisQueue, repository::PostgresAccountDirectory};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     // データベース接続プールの作成
//!     let pool = db::create_pool("postgres://localhost/kairan").await?;
//!
//!     // Redis 永続キューの作成
//!     let queue = RedisQueue::new("redis://localhost").await?;
//!
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod grouping;
pub mod mailer;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod queue;
pub mod repository;

pub use error::{InfraError, InfraErrorKind};
