//! # リポジトリ実装
//!
//! 配信パイプラインが参照・記録する永続データへのアクセスを提供する。
//!
//! ## 設計方針
//!
//! - **依存性逆転**: トレイトを定義し、ユースケース層はトレイト経由で利用
//! - **データベース抽象化**: sqlx を使用し、PostgreSQL 固有の処理をカプセル化
//! - **テスタビリティ**: トレイト経由でモック可能な設計

pub mod account_directory;
pub mod archive_repository;
pub mod category_repository;
pub mod opt_out_repository;

pub use account_directory::{AccountDirectory, PostgresAccountDirectory};
pub use archive_repository::{ArchiveRepository, MessageArchive, PostgresArchiveRepository};
pub use category_repository::{CategoryRepository, PostgresCategoryRepository};
pub use opt_out_repository::{OptOutProvider, PostgresOptOutProvider};
