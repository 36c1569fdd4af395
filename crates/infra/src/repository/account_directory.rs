//! # AccountDirectory
//!
//! アカウントディレクトリへの照会を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **読み取り専用**: 配信パイプラインはディレクトリを変更しない
//! - **状態を含めて返す**: 有効・無効の判定は呼び出し側の責務。
//!   宛先解決時と配信時の 2 回、同じ照会で最新状態を確認する

use async_trait::async_trait;
use kairan_domain::recipient::{AccountId, AccountProfile, AccountStatus, Email, Locale};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// アカウントディレクトリトレイト
///
/// 解決済みアカウント ID を配信可能な宛先情報（メールアドレス・ロケール・
/// 状態）に展開する。
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// ID 集合でアカウントを一括照会する
    ///
    /// 存在しない ID は無視し、見つかったアカウントのみ返す
    /// （ディレクトリに存在しない宛先は静かに脱落する）。
    /// 空の配列を渡した場合は空の Vec を返す。
    async fn find_by_ids(&self, ids: &[AccountId]) -> Result<Vec<AccountProfile>, InfraError>;
}

/// PostgreSQL 実装の AccountDirectory
#[derive(Debug, Clone)]
pub struct PostgresAccountDirectory {
    pool: PgPool,
}

impl PostgresAccountDirectory {
    /// 新しいディレクトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// accounts テーブルの行
#[derive(sqlx::FromRow)]
struct AccountRow {
    id:     Uuid,
    email:  String,
    locale: String,
    status: String,
}

impl TryFrom<AccountRow> for AccountProfile {
    type Error = InfraError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(AccountProfile::from_directory(
            AccountId::from_uuid(row.id),
            Email::new(&row.email).map_err(|e| InfraError::unexpected(e.to_string()))?,
            Locale::new(&row.locale).map_err(|e| InfraError::unexpected(e.to_string()))?,
            row.status
                .parse::<AccountStatus>()
                .map_err(|e| InfraError::unexpected(e.to_string()))?,
        ))
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    #[tracing::instrument(skip_all, level = "debug", fields(count = ids.len()))]
    async fn find_by_ids(&self, ids: &[AccountId]) -> Result<Vec<AccountProfile>, InfraError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let uuid_ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT
                id,
                email,
                locale,
                status
            FROM accounts
            WHERE id = ANY($1)
            "#,
        )
        .bind(&uuid_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccountProfile::try_from).collect()
    }
}
