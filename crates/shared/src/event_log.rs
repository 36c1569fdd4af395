//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! 運用者が `jq` で効率的に調査できるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! 既存の `tracing::error!` に `error.category` + `error.kind` フィールドを直接追加する。
//! 定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const SUBMISSION: &str = "submission";
        pub const DELIVERY: &str = "delivery";
    }

    /// イベントアクション
    pub mod action {
        // 受付
        pub const MESSAGE_SUBMITTED: &str = "message.submitted";
        pub const AUDIENCE_RESOLVED: &str = "audience.resolved";
        pub const AUDIENCE_EMPTY: &str = "audience.empty";
        pub const BATCH_ENQUEUED: &str = "batch.enqueued";
        pub const ARCHIVE_STORED: &str = "archive.stored";

        // 配信
        pub const BATCH_DELIVERED: &str = "batch.delivered";
        pub const RECIPIENT_SKIPPED: &str = "recipient.skipped";
        pub const DELIVERY_FAILED: &str = "delivery.failed";

        // キュー再試行
        pub const JOB_RETRIED: &str = "job.retried";
        pub const JOB_BURIED: &str = "job.buried";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const MASS_MESSAGE: &str = "mass_message";
        pub const DELIVERY_BATCH: &str = "delivery_batch";
        pub const RECIPIENT: &str = "recipient";
        pub const MESSAGE_ARCHIVE: &str = "message_archive";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、Redis キュー）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部メールトランスポート
        pub const MAIL_TRANSPORT: &str = "mail_transport";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const QUEUE: &str = "queue";
        pub const SERIALIZATION: &str = "serialization";
        pub const MAIL_SEND: &str = "mail_send";
        pub const UNKNOWN_STRATEGY: &str = "unknown_strategy";
        pub const INTERNAL: &str = "internal";
    }
}
