//! # 配信カテゴリ
//!
//! 宛先の集合を名前付きで定義する「配信カテゴリ」と、カテゴリを具体的な
//! 宛先集合へ展開するためのグルーピング定義を表現する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 意味 |
//! |---|------------|------|
//! | [`Category`] | 配信カテゴリ | 「全スタッフ」のような宛先定義。複数のグルーピングを持つ |
//! | [`Grouping`] | グルーピング | 1 つのグルーピング方式に対するセレクタ集合と結合条件 |
//! | [`Conjunction`] | 結合条件 | ANY（いずれかに一致）/ ALL（すべてに一致） |
//! | [`OptOutPolicy`] | 配信停止ポリシー | 配信停止（オプトアウト）の適用方法 |
//!
//! ## 設計方針
//!
//! - **参照、複製しない**: メッセージはカテゴリ ID のみを保持し、カテゴリ定義
//!   本体は設定ストレージが所有する
//! - **グルーピングなし = 宛先なし**: グルーピングを 1 つも持たないカテゴリは
//!   宛先を選択しない（不変条件）
//! - **文字列キーによる方式選択**: グルーピング方式はレジストリに登録された
//!   実装を [`GroupingKey`] で選択する。リフレクションや動的探索は行わない

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::DomainError;

/// カテゴリ ID（マシン名）
///
/// 設定ストレージ上のカテゴリを識別する人間可読なマシン名。
/// `staff`, `marketing_news` のような小文字スネークケースを要求する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(String);

impl CategoryId {
    /// カテゴリ ID を作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 64 文字
    /// - 使用可能文字は `a-z` `0-9` `_` のみ
    ///
    /// # エラー
    ///
    /// バリデーションに失敗した場合は `DomainError::Validation` を返す。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.is_empty() {
            return Err(DomainError::Validation("カテゴリIDは必須です".to_string()));
        }

        if value.len() > 64 {
            return Err(DomainError::Validation(
                "カテゴリIDは64文字以内である必要があります".to_string(),
            ));
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DomainError::Validation(format!(
                "カテゴリIDに使用できない文字が含まれています: {}",
                value
            )));
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

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

define_validated_string! {
    /// カテゴリ表示名（値オブジェクト）
    ///
    /// 管理画面やアーカイブで表示されるカテゴリの名前。
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 255 文字
    pub struct CategoryLabel {
        label: "カテゴリ名",
        max_length: 255,
    }
}

/// グルーピング方式キー
///
/// グルーピング方式レジストリ上の実装を選択する文字列キー（例: `role`）。
/// カテゴリ定義が未登録のキーを参照していた場合、宛先解決は
/// 「未知のグルーピング方式」エラーで失敗する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingKey(String);

impl GroupingKey {
    /// グルーピング方式キーを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 64 文字
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "グルーピング方式キーは必須です".to_string(),
            ));
        }

        if value.len() > 64 {
            return Err(DomainError::Validation(
                "グルーピング方式キーは64文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 結合条件
///
/// 1 つのグルーピング内で複数のセレクタをどう組み合わせるかを表す。
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Conjunction {
    /// いずれかのセレクタに一致すれば選択（和集合）
    Any,
    /// すべてのセレクタに一致した場合のみ選択（積集合）
    All,
}

/// 配信停止ポリシー
///
/// 利用者の配信停止（オプトアウト）設定をどう適用するかを表す。
/// 送信時設定スナップショットに含まれ、キュー滞留中の設定変更の影響を受けない。
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OptOutPolicy {
    /// 配信停止を受け付けない（フィルタリングなし）
    Disabled,
    /// 全体の配信停止のみ受け付ける
    Global,
    /// カテゴリ単位の配信停止を受け付ける
    ///
    /// 対象カテゴリのいずれか 1 つでも配信停止しているアカウントは、
    /// その送信全体から除外される（部分配信はしない）。
    Category,
}

/// グルーピング
///
/// 1 つのグルーピング方式に対するセレクタ集合と結合条件の組。
/// 例: `{ strategy: "role", conjunction: Any, selectors: ["staff", "editor"] }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    strategy:    GroupingKey,
    conjunction: Conjunction,
    selectors:   Vec<String>,
}

impl Grouping {
    /// グルーピングを作成する
    ///
    /// # バリデーション
    ///
    /// - セレクタは 1 つ以上必要
    pub fn new(
        strategy: GroupingKey,
        conjunction: Conjunction,
        selectors: Vec<String>,
    ) -> Result<Self, DomainError> {
        if selectors.is_empty() {
            return Err(DomainError::Validation(
                "グルーピングにはセレクタが1つ以上必要です".to_string(),
            ));
        }

        Ok(Self {
            strategy,
            conjunction,
            selectors,
        })
    }

    pub fn strategy(&self) -> &GroupingKey {
        &self.strategy
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }
}

/// 配信カテゴリエンティティ
///
/// 名前付きの宛先定義。設定ストレージが所有し、メッセージからは ID で
/// 参照される。
///
/// # 不変条件
///
/// - `id` は設定ストレージ内で一意
/// - グルーピングを 1 つも持たないカテゴリは宛先を選択しない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id:        CategoryId,
    label:     CategoryLabel,
    groupings: Vec<Grouping>,
}

impl Category {
    /// 設定ストレージからカテゴリを復元する
    ///
    /// グルーピングが空のカテゴリも有効（宛先を選択しないだけ）。
    pub fn from_config(id: CategoryId, label: CategoryLabel, groupings: Vec<Grouping>) -> Self {
        Self {
            id,
            label,
            groupings,
        }
    }

    pub fn id(&self) -> &CategoryId {
        &self.id
    }

    pub fn label(&self) -> &CategoryLabel {
        &self.label
    }

    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }

    /// 宛先を選択しうるカテゴリか判定する
    pub fn has_groupings(&self) -> bool {
        !self.groupings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    // CategoryId のテスト

    #[test]
    fn test_カテゴリidは正常なマシン名を受け入れる() {
        let id = CategoryId::new("marketing_news").unwrap();
        assert_eq!(id.as_str(), "marketing_news");
    }

    #[rstest]
    #[case("", "空文字列")]
    #[case("Staff", "大文字")]
    #[case("all staff", "空白")]
    #[case("スタッフ", "非ASCII")]
    #[case(&"a".repeat(65), "64文字超過")]
    fn test_カテゴリidは不正な値を拒否する(
        #[case] input: &str,
        #[case] _reason: &str,
    ) {
        assert!(CategoryId::new(input).is_err());
    }

    // Conjunction のテスト

    #[test]
    fn test_結合条件の文字列変換が正しい() {
        assert_eq!(Conjunction::Any.to_string(), "any");
        assert_eq!(Conjunction::All.to_string(), "all");
        assert_eq!(Conjunction::from_str("any").unwrap(), Conjunction::Any);
        assert_eq!(Conjunction::from_str("all").unwrap(), Conjunction::All);
        assert!(Conjunction::from_str("or").is_err());
    }

    // OptOutPolicy のテスト

    #[test]
    fn test_配信停止ポリシーの文字列変換が正しい() {
        assert_eq!(OptOutPolicy::Disabled.to_string(), "disabled");
        assert_eq!(OptOutPolicy::Global.to_string(), "global");
        assert_eq!(OptOutPolicy::Category.to_string(), "category");
        assert_eq!(
            OptOutPolicy::from_str("category").unwrap(),
            OptOutPolicy::Category
        );
    }

    // Grouping のテスト

    #[test]
    fn test_グルーピングはセレクタ必須() {
        let result = Grouping::new(
            GroupingKey::new("role").unwrap(),
            Conjunction::Any,
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_グルーピングはセレクタと結合条件を保持する() {
        let grouping = Grouping::new(
            GroupingKey::new("role").unwrap(),
            Conjunction::All,
            vec!["staff".to_string(), "editor".to_string()],
        )
        .unwrap();

        assert_eq!(grouping.strategy().as_str(), "role");
        assert_eq!(grouping.conjunction(), Conjunction::All);
        assert_eq!(grouping.selectors(), ["staff", "editor"]);
    }

    // Category のテスト

    #[test]
    fn test_グルーピングなしのカテゴリは宛先を選択しない() {
        let category = Category::from_config(
            CategoryId::new("empty").unwrap(),
            CategoryLabel::new("空のカテゴリ").unwrap(),
            vec![],
        );

        assert!(!category.has_groupings());
    }

    #[test]
    fn test_グルーピングを持つカテゴリは宛先を選択しうる() {
        let category = Category::from_config(
            CategoryId::new("staff").unwrap(),
            CategoryLabel::new("全スタッフ").unwrap(),
            vec![
                Grouping::new(
                    GroupingKey::new("role").unwrap(),
                    Conjunction::Any,
                    vec!["staff".to_string()],
                )
                .unwrap(),
            ],
        );

        assert!(category.has_groupings());
        assert_eq!(category.groupings().len(), 1);
    }
}
