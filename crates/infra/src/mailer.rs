//! # メール送信
//!
//! 合成済みメールの送信を担当するインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `MailTransport` trait でメール送信を抽象化
//! - **3 つの実装**: SMTP（Mailpit 開発用）、SES（本番用）、Noop（テスト用）
//! - **環境変数切替**: `MAIL_BACKEND` でランタイム選択
//! - **1 バッチ 1 呼び出し**: BCC 配信ではバッチ全体を 1 回の送信にまとめる。
//!   個別配信では宛先ごとに 1 回呼び出す

mod noop;
mod ses;
mod smtp;

use async_trait::async_trait;
use kairan_domain::outbound::{OutboundEmail, TransportError};
pub use noop::NoopMailer;
pub use ses::SesMailer;
pub use smtp::SmtpMailer;

/// メール送信トレイト
///
/// 配信パイプラインの出口。メール送信の具体的な方法を抽象化する。
/// SMTP / SES / Noop の 3 実装を環境変数で切り替える。
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// メールを 1 通送信する
    ///
    /// BCC 配信ではバッチ全体がこの 1 通に載る。
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError>;
}
