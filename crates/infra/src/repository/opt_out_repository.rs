//! # OptOutProvider
//!
//! 配信停止（オプトアウト）済みアカウントの照会を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **ポリシーはスナップショットから**: どのポリシーで照会するかは
//!   受付時点の `SendOptions` が決める。ここでは渡された値に従うだけ
//! - **和集合の除外**: カテゴリ単位ポリシーでは、対象カテゴリのいずれか
//!   1 つでも配信停止していれば送信全体から除外する

use std::collections::HashSet;

use async_trait::async_trait;
use kairan_domain::{
    category::{CategoryId, OptOutPolicy},
    recipient::AccountId,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 配信停止照会トレイト
#[async_trait]
pub trait OptOutProvider: Send + Sync {
    /// 配信停止済みアカウント ID の集合を取得する
    ///
    /// # ポリシーごとの対象
    ///
    /// - `Disabled`: 常に空集合（照会しない）
    /// - `Global`: 全体配信停止フラグの立っているアカウント
    /// - `Category`: 全体配信停止に加え、対象カテゴリのいずれかを
    ///   配信停止しているアカウント（和集合）
    async fn opted_out_accounts(
        &self,
        policy: OptOutPolicy,
        categories: &[CategoryId],
    ) -> Result<HashSet<AccountId>, InfraError>;
}

/// PostgreSQL 実装の OptOutProvider
#[derive(Debug, Clone)]
pub struct PostgresOptOutProvider {
    pool: PgPool,
}

impl PostgresOptOutProvider {
    /// 新しいプロバイダインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 全体配信停止フラグの立っているアカウント ID を取得する
    async fn global_opt_outs(&self) -> Result<Vec<Uuid>, InfraError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM accounts
            WHERE global_opt_out = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl OptOutProvider for PostgresOptOutProvider {
    #[tracing::instrument(skip_all, level = "debug", fields(%policy))]
    async fn opted_out_accounts(
        &self,
        policy: OptOutPolicy,
        categories: &[CategoryId],
    ) -> Result<HashSet<AccountId>, InfraError> {
        let mut result: HashSet<AccountId> = HashSet::new();

        match policy {
            OptOutPolicy::Disabled => {}
            OptOutPolicy::Global => {
                result.extend(
                    self.global_opt_outs()
                        .await?
                        .into_iter()
                        .map(AccountId::from_uuid),
                );
            }
            OptOutPolicy::Category => {
                // 全体配信停止は常に尊重する
                result.extend(
                    self.global_opt_outs()
                        .await?
                        .into_iter()
                        .map(AccountId::from_uuid),
                );

                if !categories.is_empty() {
                    let category_ids: Vec<String> =
                        categories.iter().map(|id| id.as_str().to_string()).collect();

                    let ids: Vec<Uuid> = sqlx::query_scalar(
                        r#"
                        SELECT DISTINCT account_id
                        FROM category_opt_outs
                        WHERE category_id = ANY($1)
                        "#,
                    )
                    .bind(&category_ids)
                    .fetch_all(&self.pool)
                    .await?;

                    result.extend(ids.into_iter().map(AccountId::from_uuid));
                }
            }
        }

        Ok(result)
    }
}
