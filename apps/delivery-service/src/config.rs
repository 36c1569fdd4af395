//! # 配信サービス設定
//!
//! 環境変数から設定を読み込む。
//! 必須の変数が欠けている場合は起動時に panic する（フェイルファスト）。

use std::env;

use kairan_domain::{batch::DEFAULT_BATCH_SIZE, category::OptOutPolicy};

/// 配信サービスの設定
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// バインドするホスト
    pub host:               String,
    /// バインドするポート
    pub port:               u16,
    /// PostgreSQL 接続 URL
    pub database_url:       String,
    /// Redis 接続 URL
    pub redis_url:          String,
    /// 1 バッチあたりの宛先数上限
    pub batch_size:         usize,
    /// 受付キューのワーカー数
    pub submission_workers: usize,
    /// 配信キューのワーカー数
    pub delivery_workers:   usize,
    /// キューが空のときのポーリング間隔（ミリ秒）
    pub poll_interval_ms:   u64,
    /// キューアイテムの最大試行回数
    pub max_attempts:       u32,
    /// 送信時設定の既定値
    pub send:               SendConfig,
    /// メール送信の設定
    pub mailer:             MailerConfig,
}

/// 送信時設定の既定値
///
/// 受付時にメッセージごとのスナップショットへ反映される。
/// キュー滞留中にここを変更しても、受付済みメッセージには影響しない。
#[derive(Debug, Clone)]
pub struct SendConfig {
    /// BCC 一括で送信するか（false なら宛先ごとに個別送信）
    pub use_bcc:              bool,
    /// 既定の送信者名
    pub default_sender_name:  String,
    /// 既定の送信者アドレス
    pub default_sender_email: String,
    /// 控えを保存するか
    pub create_archive_copy:  bool,
    /// 本人控えの送付先アドレス（未設定なら控えを送らない）
    pub self_copy_email:      Option<String>,
    /// 本文の前に挿入する接頭辞
    pub body_prefix:          Option<String>,
    /// 本文の後に挿入する接尾辞
    pub body_suffix:          Option<String>,
    /// 配信停止ポリシー
    pub opt_out_policy:       OptOutPolicy,
}

/// メール送信の設定
///
/// `MAIL_BACKEND` 環境変数で送信バックエンドを切り替える:
/// - `smtp`: Mailpit（開発）/ SMTP サーバー経由で送信
/// - `ses`: Amazon SES v2 経由で送信（本番）
/// - `noop`: 送信しない（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// 送信バックエンド（"smtp" | "ses" | "noop"）
    pub backend:   String,
    /// SMTP ホスト（backend=smtp の場合に使用）
    pub smtp_host: String,
    /// SMTP ポート（backend=smtp の場合に使用）
    pub smtp_port: u16,
}

impl DeliveryConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, env::VarError> {
        let batch_size: usize = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| DEFAULT_BATCH_SIZE.to_string())
            .parse()
            .expect("BATCH_SIZE は数値である必要があります");
        if batch_size == 0 {
            panic!("BATCH_SIZE は 1 以上である必要があります");
        }

        Ok(Self {
            host: env::var("DELIVERY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("DELIVERY_PORT")
                .expect("DELIVERY_PORT が設定されていません（.env を確認してください）")
                .parse()
                .expect("DELIVERY_PORT は数値である必要があります"),
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL が設定されていません（.env を確認してください）"),
            redis_url: env::var("REDIS_URL")
                .expect("REDIS_URL が設定されていません（.env を確認してください）"),
            batch_size,
            submission_workers: env::var("SUBMISSION_WORKERS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .expect("SUBMISSION_WORKERS は数値である必要があります"),
            delivery_workers: env::var("DELIVERY_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .expect("DELIVERY_WORKERS は数値である必要があります"),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .expect("POLL_INTERVAL_MS は数値である必要があります"),
            max_attempts: env::var("MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("MAX_ATTEMPTS は数値である必要があります"),
            send: SendConfig::from_env(),
            mailer: MailerConfig::from_env(),
        })
    }
}

impl SendConfig {
    /// 環境変数から送信既定値を読み込む
    fn from_env() -> Self {
        Self {
            use_bcc: env::var("USE_BCC").map(|v| v == "true").unwrap_or(true),
            default_sender_name: env::var("DEFAULT_SENDER_NAME")
                .unwrap_or_else(|_| "Kairan 配信係".to_string()),
            default_sender_email: env::var("DEFAULT_SENDER_EMAIL")
                .expect("DEFAULT_SENDER_EMAIL が設定されていません（.env を確認してください）"),
            create_archive_copy: env::var("CREATE_ARCHIVE_COPY")
                .map(|v| v == "true")
                .unwrap_or(false),
            self_copy_email: env::var("SELF_COPY_EMAIL").ok().filter(|v| !v.is_empty()),
            body_prefix: env::var("BODY_PREFIX").ok().filter(|v| !v.is_empty()),
            body_suffix: env::var("BODY_SUFFIX").ok().filter(|v| !v.is_empty()),
            opt_out_policy: env::var("OPT_OUT_POLICY")
                .unwrap_or_else(|_| "category".to_string())
                .parse()
                .expect("OPT_OUT_POLICY は disabled | global | category のいずれかである必要があります"),
        }
    }
}

impl MailerConfig {
    /// 環境変数からメール送信設定を読み込む
    fn from_env() -> Self {
        Self {
            backend:   env::var("MAIL_BACKEND").unwrap_or_else(|_| "noop".to_string()),
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "1025".to_string())
                .parse()
                .expect("SMTP_PORT は有効なポート番号である必要があります"),
        }
    }
}
