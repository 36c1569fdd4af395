//! Noop メール送信実装
//!
//! メールを実際に送信せず、ログ出力のみ行う。
//! テスト環境や送信無効化時に使用する。

use async_trait::async_trait;
use kairan_domain::outbound::{OutboundEmail, TransportError};

use super::MailTransport;

/// Noop メール送信（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NoopMailer;

#[async_trait]
impl MailTransport for NoopMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        tracing::info!(
            to = ?email.to,
            bcc_count = email.bcc.len(),
            subject = %email.subject,
            locale = %email.locale,
            "Noop: メール送信をスキップ"
        );
        Ok(())
    }
}
