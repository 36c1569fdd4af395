//! # 宛先
//!
//! 一斉送信の宛先となるアカウントと、解決済み宛先レコードを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 要件 |
//! |---|------------|------|
//! | [`AccountProfile`] | アカウント | ディレクトリ照会の結果。メールアドレス・ロケール・状態を持つ |
//! | [`RecipientRecord`] | 宛先レコード | 宛先解決の出力単位。バッチ分割・配信の入力になる |
//! | [`AccountStatus`] | アカウント状態 | 無効・削除済みアカウントは配信対象から除外される |
//!
//! ## 設計方針
//!
//! - **Newtype パターン**: AccountId は UUID をラップし、型安全性を確保
//! - **バリデーション**: 値オブジェクトの生成時に検証ロジックを実行
//! - **二重の有効性チェック**: 宛先解決時と配信時の両方で `is_active` を確認する。
//!   キュー滞留中にアカウントが無効化されることは想定内の事象であり、
//!   どちらのチェックも省略してはならない

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::DomainError;

define_uuid_id! {
    /// アカウント ID（一意識別子）
    ///
    /// アカウントディレクトリの主キー。UUID v7 を使用。
    /// 宛先の重複排除はこの ID を基準に行う。
    pub struct AccountId;
}

/// メールアドレス（値オブジェクト）
///
/// RFC 5322 に準拠した形式を要求する。
/// 生成時にバリデーションを実行し、不正な値の作成を防ぐ。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    /// メールアドレスを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - `@` を含む
    /// - 最大 255 文字
    ///
    /// # エラー
    ///
    /// バリデーションに失敗した場合は `DomainError::Validation` を返す。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        // 基本的な構造検証: local@domain の形式であること
        let Some((local, domain)) = value.split_once('@') else {
            return Err(DomainError::Validation(
                "メールアドレスの形式が不正です".to_string(),
            ));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスの形式が不正です".to_string(),
            ));
        }

        if value.len() > 255 {
            return Err(DomainError::Validation(
                "メールアドレスは255文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 所有権を持つ文字列に変換する
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ロケールタグ（値オブジェクト）
///
/// 宛先ごとのメール文面の言語選択に使用する（BCP 47 の言語タグを想定）。
/// 未設定アカウントには既定値 `ja` を使用する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale(String);

impl Locale {
    /// ロケールタグを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 35 文字（BCP 47 の実用上限）
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "ロケールタグは必須です".to_string(),
            ));
        }

        if value.len() > 35 {
            return Err(DomainError::Validation(
                "ロケールタグは35文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Locale {
    /// 既定ロケール（`ja`）を返す
    fn default() -> Self {
        Self("ja".to_string())
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// アカウント状態
///
/// ディレクトリ上のアカウントの状態を表現する列挙型。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountStatus {
    /// アクティブ（配信可能）
    Active,
    /// 非アクティブ（一時停止）
    Inactive,
    /// 削除済み（論理削除）
    Deleted,
}

impl std::str::FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            _ => Err(DomainError::Validation(format!(
                "不正なアカウント状態: {}",
                s
            ))),
        }
    }
}

/// アカウントプロファイル
///
/// アカウントディレクトリの照会結果。配信に必要な属性のみを持つ読み取り専用の
/// ビューであり、ディレクトリ側のエンティティ全体は持ち込まない。
///
/// # 不変条件
///
/// - `email` はディレクトリ内で一意
/// - `status` が `Active` 以外のアカウントは配信対象にならない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProfile {
    id:     AccountId,
    email:  Email,
    locale: Locale,
    status: AccountStatus,
}

impl AccountProfile {
    /// ディレクトリの照会結果からプロファイルを復元する
    pub fn from_directory(
        id: AccountId,
        email: Email,
        locale: Locale,
        status: AccountStatus,
    ) -> Self {
        Self {
            id,
            email,
            locale,
            status,
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// アカウントが配信可能か判定する
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// 配信用の宛先レコードに変換する
    pub fn into_recipient(self) -> RecipientRecord {
        RecipientRecord {
            account_id: self.id,
            email:      self.email,
            locale:     self.locale,
        }
    }
}

/// 宛先レコード
///
/// 宛先解決の出力単位。アカウント ID・解決済みメールアドレス・ロケールを持ち、
/// バッチ分割と配信処理の入力になる。
///
/// # 不変条件
///
/// - 同一メッセージの宛先集合内で `account_id` は一意（重複排除済み）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRecord {
    account_id: AccountId,
    email:      Email,
    locale:     Locale,
}

impl RecipientRecord {
    /// 宛先レコードを作成する
    pub fn new(account_id: AccountId, email: Email, locale: Locale) -> Self {
        Self {
            account_id,
            email,
            locale,
        }
    }

    /// 自分宛コピー用の合成レコードを作成する
    ///
    /// 送信者自身のアドレスが解決済み宛先に含まれていない場合に追加される。
    /// ディレクトリ上のアカウントに対応しないため、ID は新規採番する。
    pub fn synthetic_self_copy(email: Email, locale: Locale) -> Self {
        Self {
            account_id: AccountId::new(),
            email,
            locale,
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }
}
