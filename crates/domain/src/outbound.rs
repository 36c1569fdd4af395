//! # 送信メール
//!
//! 合成済みのメール（配信パイプラインの最終成果物）と送信エラーを定義する。
//!
//! ## 設計方針
//!
//! - **トランスポート非依存**: SMTP / SES どちらで送るかはインフラ層が決める
//! - **fire-and-forget**: 個別の送信失敗はバッチ内の他の宛先に影響しない

use thiserror::Error;

use crate::{message::BodyFormat, recipient::Locale};

/// メール送信エラー
#[derive(Debug, Error)]
pub enum TransportError {
    /// メッセージの構築に失敗（アドレス形式不正など）
    #[error("メール構築に失敗: {0}")]
    BuildFailed(String),

    /// トランスポートでの送信に失敗
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),
}

/// 送信メール
///
/// ヘッダ・フッタの合成が済んだ、そのまま送信できる形のメール。
/// MailTransport に渡される。
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// 送信者表示名（`From` ヘッダの表示名）
    pub from_name:    Option<String>,
    /// 送信元メールアドレス
    pub from_address: String,
    /// `To` の宛先（BCC 配信時は送信者自身のアドレス）
    pub to:           Vec<String>,
    /// `BCC` の宛先（個別配信時は空）
    pub bcc:          Vec<String>,
    /// 件名
    pub subject:      String,
    /// 本文（ヘッダ・フッタ合成済み）
    pub body:         String,
    /// 本文形式
    pub format:       BodyFormat,
    /// 文面のロケール（個別配信では宛先アカウントのロケール）
    pub locale:       Locale,
}

impl OutboundEmail {
    /// このメールが届く宛先の総数（To + BCC）
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.bcc.len()
    }
}
