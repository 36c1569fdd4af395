//! # グルーピング方式
//!
//! 配信カテゴリのグルーピング定義を、具体的なアカウント ID 集合へ解決する。
//!
//! ## 設計方針
//!
//! - **文字列キーのレジストリ**: グルーピング方式は [`GroupingRegistry`] に
//!   登録された実装を方式キーで選択する。リフレクションや動的探索は行わない
//! - **未知の方式はエラー**: カテゴリ定義が未登録のキーを参照していた場合、
//!   レジストリは `None` を返し、呼び出し側が「未知のグルーピング方式」
//!   エラーとして扱う
//! - **解決時点の所属**: グルーピングの評価は毎回データベースに問い合わせる。
//!   ロール変更は次の送信から自動的に反映される

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use kairan_domain::{category::Conjunction, recipient::AccountId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// ロールグルーピングの方式キー
pub const ROLE_STRATEGY: &str = "role";

/// 全アクティブアカウントを表す擬似ロール
///
/// セレクタにこの値が含まれる場合、グルーピングはロール割り当てに
/// かかわらず全アクティブアカウントを選択する。
pub const AUTHENTICATED_ROLE: &str = "authenticated";

/// グルーピング解決トレイト
///
/// 1 つのグルーピング方式を表す。セレクタ集合と結合条件を受け取り、
/// 該当するアカウント ID の集合を返す。
#[async_trait]
pub trait GroupingResolver: Send + Sync {
    /// セレクタ集合をアカウント ID 集合に解決する
    ///
    /// 該当なしの場合は空集合を返す（エラーではない）。
    async fn resolve(
        &self,
        selectors: &[String],
        conjunction: Conjunction,
    ) -> Result<HashSet<AccountId>, InfraError>;
}

/// グルーピング方式レジストリ
///
/// 方式キーと [`GroupingResolver`] 実装の対応を保持する。
/// 起動時に全方式を登録し、以降は読み取り専用で共有する。
pub struct GroupingRegistry {
    resolvers: HashMap<String, Arc<dyn GroupingResolver>>,
}

impl Default for GroupingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupingRegistry {
    /// 空のレジストリを生成する
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// 方式を登録する
    ///
    /// 同じキーで再登録した場合は後勝ち。
    pub fn register(&mut self, strategy: impl Into<String>, resolver: Arc<dyn GroupingResolver>) {
        self.resolvers.insert(strategy.into(), resolver);
    }

    /// 標準の方式を登録済みのレジストリを生成する
    pub fn with_role_grouping(pool: PgPool) -> Self {
        let mut registry = Self::new();
        registry.register(ROLE_STRATEGY, Arc::new(RoleGrouping::new(pool)));
        registry
    }

    /// 方式キーに対応する実装を取得する
    ///
    /// 未登録のキーは `None` を返す。
    pub fn resolver(&self, strategy: &str) -> Option<Arc<dyn GroupingResolver>> {
        self.resolvers.get(strategy).cloned()
    }

    /// 登録済みの方式キー一覧を返す
    pub fn registered_strategies(&self) -> Vec<&str> {
        let mut strategies: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        strategies.sort_unstable();
        strategies
    }
}

/// ロールグルーピング
///
/// アカウントのロール割り当てに基づいて宛先を選択する標準実装。
///
/// # 解決ルール
///
/// - 対象はアクティブなアカウントのみ
/// - `Any`: セレクタのいずれかのロールを持つアカウント
/// - `All`: セレクタのすべてのロールを持つアカウント
/// - 擬似ロール `authenticated` は「全アクティブアカウントが持つ」扱い
#[derive(Debug, Clone)]
pub struct RoleGrouping {
    pool: PgPool,
}

impl RoleGrouping {
    /// 新しいロールグルーピングを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 全アクティブアカウントの ID を取得する
    async fn all_active(&self) -> Result<Vec<Uuid>, InfraError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM accounts
            WHERE status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// いずれかのロールを持つアクティブアカウントの ID を取得する
    async fn active_with_any_role(&self, roles: &[String]) -> Result<Vec<Uuid>, InfraError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT a.id
            FROM accounts a
            INNER JOIN account_roles ar ON ar.account_id = a.id
            WHERE a.status = 'active' AND ar.role = ANY($1)
            "#,
        )
        .bind(roles)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// すべてのロールを持つアクティブアカウントの ID を取得する
    async fn active_with_all_roles(&self, roles: &[String]) -> Result<Vec<Uuid>, InfraError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT a.id
            FROM accounts a
            INNER JOIN account_roles ar ON ar.account_id = a.id
            WHERE a.status = 'active' AND ar.role = ANY($1)
            GROUP BY a.id
            HAVING COUNT(DISTINCT ar.role) = $2
            "#,
        )
        .bind(roles)
        .bind(roles.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl GroupingResolver for RoleGrouping {
    #[tracing::instrument(skip_all, level = "debug", fields(%conjunction))]
    async fn resolve(
        &self,
        selectors: &[String],
        conjunction: Conjunction,
    ) -> Result<HashSet<AccountId>, InfraError> {
        // 重複セレクタは除去してから判定する（All の件数比較を正しく保つ）
        let unique: HashSet<&str> = selectors.iter().map(String::as_str).collect();
        let has_authenticated = unique.contains(AUTHENTICATED_ROLE);
        let roles: Vec<String> = unique
            .into_iter()
            .filter(|r| *r != AUTHENTICATED_ROLE)
            .map(str::to_string)
            .collect();

        // authenticated は全アクティブアカウントが持つ扱い:
        // - Any: 含まれていれば全アクティブアカウント
        // - All: 残りのロールだけで判定（残りがなければ全アクティブアカウント）
        let ids = match conjunction {
            Conjunction::Any if has_authenticated => self.all_active().await?,
            Conjunction::Any => self.active_with_any_role(&roles).await?,
            Conjunction::All if roles.is_empty() => {
                if has_authenticated {
                    self.all_active().await?
                } else {
                    Vec::new()
                }
            }
            Conjunction::All => self.active_with_all_roles(&roles).await?,
        };

        Ok(ids.into_iter().map(AccountId::from_uuid).collect())
    }
}
