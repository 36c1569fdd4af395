//! # メッセージ組み立て
//!
//! 配信内容（件名・本文・宛先モード）の組み立てを担う純粋関数群。
//!
//! ## 設計方針
//!
//! - 接頭辞・接尾辞は送信時設定スナップショットの値のみを使用する
//!   （組み立て時点の稼働設定は参照しない）
//! - 未設定の部分は区切りごと省略し、余分な空行を残さない
//! - 外部依存を持たない純粋関数とし、単体テストで網羅する

use kairan_domain::{
    message::{BodyFormat, MassMessage, SendOptions},
    outbound::OutboundEmail,
    recipient::Locale,
};

/// 宛先モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// BCC 一括（1 バッチ 1 通。To は送信者自身）
    Bcc,
    /// 個別送信（有効な宛先ごとに 1 通）
    Direct,
}

/// 組み立て済みメッセージ
///
/// 件名・本文は全宛先で共通。宛先への割り付けは配信処理が行う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject:      String,
    pub body:         String,
    pub address_mode: AddressMode,
}

/// メッセージと送信時設定から配信内容を組み立てる
pub fn compose(message: &MassMessage, options: &SendOptions) -> ComposedMessage {
    ComposedMessage {
        subject: message.subject().as_str().to_string(),
        body: compose_body(
            options.body_prefix(),
            message.body().text(),
            options.body_suffix(),
        ),
        address_mode: if options.use_bcc() {
            AddressMode::Bcc
        } else {
            AddressMode::Direct
        },
    }
}

/// 接頭辞・本文・接尾辞を空行 1 つで連結する
///
/// 未設定（`None` または空文字列）の部分は区切りごと省略する。
fn compose_body(prefix: Option<&str>, body: &str, suffix: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        parts.push(prefix);
    }
    parts.push(body);
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        parts.push(suffix);
    }
    parts.join("\n\n")
}

/// 宛先なし通知メールを組み立てる
///
/// 宛先解決の結果が 0 件だったことを送信者本人に知らせる通知。
/// 配信キューには何も積まれないため、これが唯一の送信となる。
pub fn build_empty_audience_notice(message: &MassMessage, options: &SendOptions) -> OutboundEmail {
    OutboundEmail {
        from_name:    Some(options.sender_name().as_str().to_string()),
        from_address: options.sender_email().as_str().to_string(),
        to:           vec![options.sender_email().as_str().to_string()],
        bcc:          Vec::new(),
        subject:      format!("【宛先なし】{}", message.subject().as_str()),
        body:         format!(
            "メッセージ「{}」は、宛先解決の結果送信対象が 0 件だったため配信されませんでした。\n\
             対象カテゴリのグルーピング設定と、利用者の配信停止状況を確認してください。",
            message.subject().as_str()
        ),
        format:       BodyFormat::PlainText,
        locale:       Locale::default(),
    }
}
