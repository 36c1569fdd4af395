//! # CategoryRepository
//!
//! 配信カテゴリ定義の読み込みを担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **読み取り専用**: カテゴリの作成・編集は管理系の責務（本サービス対象外)
//! - **グルーピングの一括取得**: N+1 問題を避けるため 2 クエリで構成
//!   （カテゴリ本体 + 対象カテゴリ全体のグルーピング）

use std::collections::HashMap;

use async_trait::async_trait;
use kairan_domain::category::{
    Category,
    CategoryId,
    CategoryLabel,
    Conjunction,
    Grouping,
    GroupingKey,
};
use sqlx::PgPool;

use crate::error::InfraError;

/// 配信カテゴリリポジトリトレイト
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// ID 集合でカテゴリを一括取得する
    ///
    /// 存在しない ID は結果に含まれない。呼び出し側は結果の件数を
    /// 突き合わせて未知のカテゴリを検出する。
    async fn find_by_ids(&self, ids: &[CategoryId]) -> Result<Vec<Category>, InfraError>;
}

/// PostgreSQL 実装の CategoryRepository
#[derive(Debug, Clone)]
pub struct PostgresCategoryRepository {
    pool: PgPool,
}

impl PostgresCategoryRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// categories テーブルの行
#[derive(sqlx::FromRow)]
struct CategoryRow {
    id:    String,
    label: String,
}

/// category_groupings テーブルの行
#[derive(sqlx::FromRow)]
struct GroupingRow {
    category_id: String,
    strategy:    String,
    conjunction: String,
    selectors:   Vec<String>,
}

impl TryFrom<GroupingRow> for Grouping {
    type Error = InfraError;

    fn try_from(row: GroupingRow) -> Result<Self, Self::Error> {
        let strategy =
            GroupingKey::new(&row.strategy).map_err(|e| InfraError::unexpected(e.to_string()))?;
        let conjunction = row
            .conjunction
            .parse::<Conjunction>()
            .map_err(|e| InfraError::unexpected(format!("結合条件のパースに失敗: {e}")))?;
        Grouping::new(strategy, conjunction, row.selectors)
            .map_err(|e| InfraError::unexpected(e.to_string()))
    }
}

#[async_trait]
impl CategoryRepository for PostgresCategoryRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(count = ids.len()))]
    async fn find_by_ids(&self, ids: &[CategoryId]) -> Result<Vec<Category>, InfraError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_strs: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        let category_rows: Vec<CategoryRow> = sqlx::query_as(
            r#"
            SELECT
                id,
                label
            FROM categories
            WHERE id = ANY($1)
            "#,
        )
        .bind(&id_strs)
        .fetch_all(&self.pool)
        .await?;

        let grouping_rows: Vec<GroupingRow> = sqlx::query_as(
            r#"
            SELECT
                category_id,
                strategy,
                conjunction,
                selectors
            FROM category_groupings
            WHERE category_id = ANY($1)
            ORDER BY category_id, position
            "#,
        )
        .bind(&id_strs)
        .fetch_all(&self.pool)
        .await?;

        // カテゴリ ID ごとにグルーピングをまとめる
        let mut groupings_by_category: HashMap<String, Vec<Grouping>> = HashMap::new();
        for row in grouping_rows {
            let category_id = row.category_id.clone();
            groupings_by_category
                .entry(category_id)
                .or_default()
                .push(Grouping::try_from(row)?);
        }

        category_rows
            .into_iter()
            .map(|row| {
                let id = CategoryId::new(&row.id)
                    .map_err(|e| InfraError::unexpected(e.to_string()))?;
                let label = CategoryLabel::new(&row.label)
                    .map_err(|e| InfraError::unexpected(e.to_string()))?;
                let groupings = groupings_by_category.remove(row.id.as_str()).unwrap_or_default();
                Ok(Category::from_config(id, label, groupings))
            })
            .collect()
    }
}
