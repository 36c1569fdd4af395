//! SMTP メール送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! 開発環境では Mailpit（ローカル SMTP サーバー）に接続する。

use async_trait::async_trait;
use kairan_domain::{
    message::BodyFormat,
    outbound::{OutboundEmail, TransportError},
};
use lettre::{
    Address,
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, header::ContentType},
};

use super::MailTransport;

/// SMTP メール送信
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
/// Mailpit（開発）や SMTP リレー（テスト環境）で使用する。
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// 新しい SMTP 送信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `host`: SMTP サーバーのホスト名（例: "localhost"）
    /// - `port`: SMTP サーバーのポート番号（例: 1025 for Mailpit）
    pub fn new(host: &str, port: u16) -> Self {
        // builder_dangerous: TLS なしで接続（Mailpit 等のローカル SMTP 向け）
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Self { transport }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let from_address: Address = email
            .from_address
            .parse()
            .map_err(|e| TransportError::BuildFailed(format!("送信元アドレス不正: {e}")))?;
        let from = Mailbox::new(email.from_name.clone(), from_address);

        let mut builder = Message::builder().from(from).subject(&email.subject);

        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| TransportError::BuildFailed(format!("宛先アドレス不正: {e}")))?;
            builder = builder.to(mailbox);
        }

        for bcc in &email.bcc {
            let mailbox: Mailbox = bcc
                .parse()
                .map_err(|e| TransportError::BuildFailed(format!("BCC アドレス不正: {e}")))?;
            builder = builder.bcc(mailbox);
        }

        let content_type = match email.format {
            BodyFormat::PlainText => ContentType::TEXT_PLAIN,
            BodyFormat::Html => ContentType::TEXT_HTML,
        };
        let message = builder
            .header(content_type)
            .body(email.body.clone())
            .map_err(|e| TransportError::BuildFailed(format!("メッセージ構築失敗: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(format!("SMTP 送信失敗: {e}")))?;

        Ok(())
    }
}
