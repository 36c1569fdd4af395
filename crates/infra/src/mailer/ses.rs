//! SES メール送信実装
//!
//! AWS SES v2 API を使用してメールを送信する。
//! 本番環境で使用する。

use async_trait::async_trait;
use aws_sdk_sesv2::{
    Client,
    types::{Body, Content, Destination, EmailContent, Message},
};
use kairan_domain::{
    message::BodyFormat,
    outbound::{OutboundEmail, TransportError},
};

use super::MailTransport;

/// SES メール送信
///
/// `aws_sdk_sesv2::Client` をラップする。
/// 本番環境で AWS SES を通じてメールを送信する。
pub struct SesMailer {
    client: Client,
}

impl SesMailer {
    /// 新しい SES 送信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `client`: AWS SES v2 クライアント。送信元アドレスは SES で
    ///   検証済みであること
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MailTransport for SesMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let mut destination = Destination::builder();
        for to in &email.to {
            destination = destination.to_addresses(to);
        }
        for bcc in &email.bcc {
            destination = destination.bcc_addresses(bcc);
        }
        let destination = destination.build();

        let body_content = Content::builder()
            .data(&email.body)
            .build()
            .map_err(|e| TransportError::BuildFailed(format!("本文構築失敗: {e}")))?;
        let body = match email.format {
            BodyFormat::PlainText => Body::builder().text(body_content).build(),
            BodyFormat::Html => Body::builder().html(body_content).build(),
        };

        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(
                        Content::builder()
                            .data(&email.subject)
                            .build()
                            .map_err(|e| {
                                TransportError::BuildFailed(format!("件名構築失敗: {e}"))
                            })?,
                    )
                    .body(body)
                    .build(),
            )
            .build();

        let from_email_address = match &email.from_name {
            Some(name) => format!("{name} <{}>", email.from_address),
            None => email.from_address.clone(),
        };

        self.client
            .send_email()
            .from_email_address(from_email_address)
            .destination(destination)
            .content(content)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(format!("SES 送信失敗: {e}")))?;

        Ok(())
    }
}
