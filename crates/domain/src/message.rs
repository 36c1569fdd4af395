//! # 一斉送信メッセージ
//!
//! 一斉送信の対象となるメッセージ本体と、送信時設定スナップショットを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 意味 |
//! |---|------------|------|
//! | [`MassMessage`] | 一斉送信メッセージ | 件名・本文・対象カテゴリ・送信者を持つ。キュー投入後は不変 |
//! | [`SendOptions`] | 送信時設定スナップショット | 受付時点の設定の固定コピー。処理時に設定を再読込しない |
//! | [`BodyFormat`] | 本文形式 | プレーンテキスト / HTML のマークアップ種別タグ |
//!
//! ## 設計方針
//!
//! - **キュー投入後は不変**: メッセージはパイプラインに渡った後、一切変更されない
//! - **スナップショット**: 管理設定はキュー投入と処理の間に変わりうるため、
//!   受付時点の値を [`SendOptions`] に固定して持ち回る
//! - **カテゴリは参照**: メッセージはカテゴリ ID のみを保持し、定義本体は
//!   設定ストレージに委ねる

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    category::{CategoryId, OptOutPolicy},
    recipient::Email,
};

define_uuid_id! {
    /// 一斉送信メッセージ ID（一意識別子）
    ///
    /// アーカイブレコードの冪等キーにも使用される。UUID v7 を使用。
    pub struct MessageId;
}

define_validated_string! {
    /// 件名（値オブジェクト）
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 255 文字
    pub struct Subject {
        label: "件名",
        max_length: 255,
    }
}

define_validated_string! {
    /// 送信者表示名（値オブジェクト）
    ///
    /// メールの From ヘッダに表示される名前。
    /// PII（個人識別情報）のため、Debug 出力はマスクされる。
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 100 文字
    pub struct SenderName {
        label: "送信者名",
        max_length: 100,
        pii: true,
    }
}

/// 本文形式
///
/// 本文のマークアップ種別を表すタグ。レンダリングは行わず、
/// メール送信アダプタへのヒントとしてのみ使用する。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BodyFormat {
    /// プレーンテキスト
    PlainText,
    /// HTML（レンダリングは対象外。タグとして保持するのみ）
    Html,
}

/// メッセージ本文
///
/// 本文テキストと形式タグの組。接頭辞・接尾辞の適用は配信時の
/// 組み立て処理が行い、この型は原文のみを保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    text:   String,
    format: BodyFormat,
}

impl MessageBody {
    /// メッセージ本文を作成する
    ///
    /// # バリデーション
    ///
    /// - 本文テキストが空でない
    pub fn new(text: impl Into<String>, format: BodyFormat) -> Result<Self, DomainError> {
        let text = text.into();

        if text.trim().is_empty() {
            return Err(DomainError::Validation("本文は必須です".to_string()));
        }

        Ok(Self { text, format })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn format(&self) -> BodyFormat {
        self.format
    }
}

/// 送信者アイデンティティ
///
/// メッセージを作成した送信者の表示名とメールアドレス。
/// アーカイブレコードと「宛先なし」通知の宛先に使用される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    name:  SenderName,
    email: Email,
}

impl SenderIdentity {
    /// 送信者アイデンティティを作成する
    pub fn new(name: SenderName, email: Email) -> Self {
        Self { name, email }
    }

    pub fn name(&self) -> &SenderName {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }
}

/// 送信時設定スナップショット
///
/// 受付（エンキュー）時点の管理設定の固定コピー。キューに格納され、
/// 宛先解決・配信の両段階でこの値だけを参照する。
///
/// # 設計判断
///
/// 管理設定はキュー投入から処理までの間に変更されうる。スナップショットに
/// より「受付時点の設定どおりに送信される」ことを保証する。処理側から
/// 設定ストレージを再読込してはならない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    use_bcc:             bool,
    sender_name:         SenderName,
    sender_email:        Email,
    create_archive_copy: bool,
    self_copy:           Option<Email>,
    body_prefix:         Option<String>,
    body_suffix:         Option<String>,
    opt_out_policy:      OptOutPolicy,
}

impl SendOptions {
    /// 送信時設定スナップショットを作成する
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        use_bcc: bool,
        sender_name: SenderName,
        sender_email: Email,
        create_archive_copy: bool,
        self_copy: Option<Email>,
        body_prefix: Option<String>,
        body_suffix: Option<String>,
        opt_out_policy: OptOutPolicy,
    ) -> Self {
        Self {
            use_bcc,
            sender_name,
            sender_email,
            create_archive_copy,
            self_copy,
            body_prefix,
            body_suffix,
            opt_out_policy,
        }
    }

    pub fn use_bcc(&self) -> bool {
        self.use_bcc
    }

    pub fn sender_name(&self) -> &SenderName {
        &self.sender_name
    }

    pub fn sender_email(&self) -> &Email {
        &self.sender_email
    }

    pub fn create_archive_copy(&self) -> bool {
        self.create_archive_copy
    }

    pub fn self_copy(&self) -> Option<&Email> {
        self.self_copy.as_ref()
    }

    pub fn body_prefix(&self) -> Option<&str> {
        self.body_prefix.as_deref()
    }

    pub fn body_suffix(&self) -> Option<&str> {
        self.body_suffix.as_deref()
    }

    pub fn opt_out_policy(&self) -> OptOutPolicy {
        self.opt_out_policy
    }
}

/// 一斉送信メッセージエンティティ
///
/// 送信者が作成した 1 通のメッセージ。対象カテゴリの参照を持ち、
/// 宛先解決を経て多数の宛先に配信される。
///
/// # 不変条件
///
/// - 対象カテゴリは 1 つ以上
/// - キュー投入後は一切変更されない（全フィールド読み取り専用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassMessage {
    id:         MessageId,
    subject:    Subject,
    body:       MessageBody,
    categories: Vec<CategoryId>,
    sender:     SenderIdentity,
    created_at: DateTime<Utc>,
}

impl MassMessage {
    /// 新しい一斉送信メッセージを作成する
    ///
    /// # 引数
    ///
    /// - `id`: メッセージ ID
    /// - `subject`: 件名
    /// - `body`: 本文
    /// - `categories`: 対象カテゴリ ID（1 つ以上）
    /// - `sender`: 送信者アイデンティティ
    /// - `now`: 現在日時（呼び出し元から注入）
    ///
    /// # エラー
    ///
    /// 対象カテゴリが空の場合は `DomainError::Validation` を返す。
    pub fn new(
        id: MessageId,
        subject: Subject,
        body: MessageBody,
        categories: Vec<CategoryId>,
        sender: SenderIdentity,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if categories.is_empty() {
            return Err(DomainError::Validation(
                "対象カテゴリは1つ以上必要です".to_string(),
            ));
        }

        Ok(Self {
            id,
            subject,
            body,
            categories,
            sender,
            created_at: now,
        })
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn categories(&self) -> &[CategoryId] {
        &self.categories
    }

    pub fn sender(&self) -> &SenderIdentity {
        &self.sender
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;

    // フィクスチャ

    /// テスト用の固定タイムスタンプ
    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn make_sender() -> SenderIdentity {
        SenderIdentity::new(
            SenderName::new("事務局").unwrap(),
            Email::new("office@example.com").unwrap(),
        )
    }

    // Subject のテスト

    #[test]
    fn test_件名は正常な値を受け入れる() {
        assert!(Subject::new("全社員向けお知らせ").is_ok());
    }

    #[rstest]
    #[case("", "空文字列")]
    #[case("   ", "空白のみ")]
    fn test_件名は空を拒否する(#[case] input: &str, #[case] _reason: &str) {
        assert!(Subject::new(input).is_err());
    }

    #[test]
    fn test_件名は256文字以上を拒否する() {
        let long_subject = "あ".repeat(256);
        assert!(Subject::new(&long_subject).is_err());
    }

    // SenderName のテスト

    #[test]
    fn test_送信者名のdebug出力はマスクされる() {
        let name = SenderName::new("山田太郎").unwrap();
        let debug = format!("{:?}", name);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("山田太郎"));
    }

    // BodyFormat のテスト

    #[test]
    fn test_本文形式の文字列変換が正しい() {
        use std::str::FromStr;

        assert_eq!(BodyFormat::PlainText.to_string(), "plain_text");
        assert_eq!(BodyFormat::Html.to_string(), "html");
        assert_eq!(
            BodyFormat::from_str("plain_text").unwrap(),
            BodyFormat::PlainText
        );
        assert!(BodyFormat::from_str("markdown").is_err());
    }

    // MessageBody のテスト

    #[test]
    fn test_本文は正常な値を受け入れる() {
        let body = MessageBody::new("本日の連絡事項です。", BodyFormat::PlainText).unwrap();
        assert_eq!(body.text(), "本日の連絡事項です。");
        assert_eq!(body.format(), BodyFormat::PlainText);
    }

    #[rstest]
    #[case("", "空文字列")]
    #[case("   \n  ", "空白のみ")]
    fn test_本文は空を拒否する(#[case] input: &str, #[case] _reason: &str) {
        assert!(MessageBody::new(input, BodyFormat::PlainText).is_err());
    }

    // SendOptions のテスト

    #[test]
    fn test_送信時設定スナップショットは値を保持する() {
        let options = SendOptions::new(
            true,
            SenderName::new("事務局").unwrap(),
            Email::new("office@example.com").unwrap(),
            true,
            Some(Email::new("office@example.com").unwrap()),
            Some("【全社連絡】".to_string()),
            Some("このメールは自動送信されています。".to_string()),
            OptOutPolicy::Category,
        );

        assert!(options.use_bcc());
        assert!(options.create_archive_copy());
        assert_eq!(options.sender_email().as_str(), "office@example.com");
        assert_eq!(options.body_prefix(), Some("【全社連絡】"));
        assert_eq!(options.opt_out_policy(), OptOutPolicy::Category);
    }

    // MassMessage のテスト

    #[rstest]
    fn test_メッセージは対象カテゴリなしを拒否する(now: DateTime<Utc>) {
        let result = MassMessage::new(
            MessageId::new(),
            Subject::new("お知らせ").unwrap(),
            MessageBody::new("本文", BodyFormat::PlainText).unwrap(),
            vec![],
            make_sender(),
            now,
        );

        assert!(result.is_err());
    }

    #[rstest]
    fn test_メッセージのcreated_atは注入された値と一致する(now: DateTime<Utc>) {
        let message = MassMessage::new(
            MessageId::new(),
            Subject::new("お知らせ").unwrap(),
            MessageBody::new("本文", BodyFormat::PlainText).unwrap(),
            vec![crate::category::CategoryId::new("staff").unwrap()],
            make_sender(),
            now,
        )
        .unwrap();

        assert_eq!(message.created_at(), now);
        assert_eq!(message.categories().len(), 1);
    }

    #[rstest]
    fn test_メッセージのjsonシリアライズは往復可能(now: DateTime<Utc>) {
        let message = MassMessage::new(
            MessageId::new(),
            Subject::new("お知らせ").unwrap(),
            MessageBody::new("本文", BodyFormat::Html).unwrap(),
            vec![crate::category::CategoryId::new("staff").unwrap()],
            make_sender(),
            now,
        )
        .unwrap();

        let json = serde_json::to_string(&message).unwrap();
        let restored: MassMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, message);
    }
}
