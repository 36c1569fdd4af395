//! # 宛先解決
//!
//! 対象カテゴリから配信先の一覧を確定する。
//!
//! ## 解決手順
//!
//! 1. 対象カテゴリの設定を取得する
//! 2. 各グルーピングを戦略レジストリで解決し、全体の和集合を取る
//!    （アカウント ID で重複を排除）
//! 3. 配信停止ポリシーに従って除外する
//! 4. ディレクトリ照会で有効なアカウントのみ宛先化する
//!    （無効・不明なアカウントは黙って除外）
//! 5. 要求があれば本人控えを合成レコードとして追加する
//!
//! グルーピングを持たないカテゴリは宛先を生まない。結果が 0 件の
//! 場合の扱い（送信者への通知）は受付処理側の責務とする。

use std::{collections::HashSet, sync::Arc};

use kairan_domain::{
    message::{MassMessage, SendOptions},
    recipient::{AccountId, Locale, RecipientRecord},
};
use kairan_infra::{
    grouping::{GroupingRegistry, GroupingResolver as _},
    repository::{AccountDirectory, CategoryRepository, OptOutProvider},
};

use crate::error::DeliveryError;

/// 宛先解決サービス
pub struct AudienceResolver {
    category_repo: Arc<dyn CategoryRepository>,
    registry:      Arc<GroupingRegistry>,
    opt_out:       Arc<dyn OptOutProvider>,
    directory:     Arc<dyn AccountDirectory>,
}

impl AudienceResolver {
    pub fn new(
        category_repo: Arc<dyn CategoryRepository>,
        registry: Arc<GroupingRegistry>,
        opt_out: Arc<dyn OptOutProvider>,
        directory: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            category_repo,
            registry,
            opt_out,
            directory,
        }
    }

    /// メッセージの対象カテゴリから宛先一覧を解決する
    ///
    /// # エラー
    ///
    /// カテゴリ設定が未登録のグルーピング戦略を参照していた場合は
    /// [`DeliveryError::UnknownGroupingStrategy`] を返す。
    pub async fn resolve(
        &self,
        message: &MassMessage,
        options: &SendOptions,
    ) -> Result<Vec<RecipientRecord>, DeliveryError> {
        let categories = self.category_repo.find_by_ids(message.categories()).await?;

        // カテゴリ横断で解決し、アカウント ID で重複を排除する
        let mut account_ids: HashSet<AccountId> = HashSet::new();
        for category in &categories {
            for grouping in category.groupings() {
                let resolver = self
                    .registry
                    .resolver(grouping.strategy().as_str())
                    .ok_or_else(|| {
                        DeliveryError::UnknownGroupingStrategy(
                            grouping.strategy().as_str().to_string(),
                        )
                    })?;
                let resolved = resolver
                    .resolve(grouping.selectors(), grouping.conjunction())
                    .await?;
                account_ids.extend(resolved);
            }
        }

        // 配信停止の除外（対象カテゴリ横断の和集合）
        let opted_out = self
            .opt_out
            .opted_out_accounts(options.opt_out_policy(), message.categories())
            .await?;
        let before_opt_out = account_ids.len();
        account_ids.retain(|id| !opted_out.contains(id));
        if account_ids.len() < before_opt_out {
            tracing::debug!(
                excluded = before_opt_out - account_ids.len(),
                "配信停止設定により宛先を除外しました"
            );
        }

        // ディレクトリ照会。無効・不明なアカウントは黙って除外する
        let ids: Vec<AccountId> = account_ids.into_iter().collect();
        let mut records: Vec<RecipientRecord> = self
            .directory
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|profile| profile.is_active())
            .map(|profile| profile.into_recipient())
            .collect();
        if records.len() < ids.len() {
            tracing::debug!(
                dropped = ids.len() - records.len(),
                "無効または不明なアカウントを宛先から除外しました"
            );
        }

        // 本人控え。既に宛先に含まれるアドレスなら追加しない
        if let Some(self_copy) = options.self_copy()
            && !records.iter().any(|r| r.email() == self_copy)
        {
            records.push(RecipientRecord::synthetic_self_copy(
                self_copy.clone(),
                Locale::default(),
            ));
        }

        Ok(records)
    }
}
