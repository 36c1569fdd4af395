//! # ArchiveRepository
//!
//! 送信メッセージのアーカイブレコードの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **メッセージ単位で冪等**: 主キーは message_id。受付処理がリトライで
//!   再実行されても、アーカイブレコードは 1 件しか作られない
//! - **原文を保存**: 接頭辞・接尾辞の合成前の本文を保存する

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairan_domain::{
    category::CategoryId,
    message::{BodyFormat, MassMessage, MessageId, SenderName, Subject},
    recipient::Email,
};
use sqlx::PgPool;

use crate::error::InfraError;

/// アーカイブレコード
///
/// 送信済み（受付済み）メッセージの保存用コピー。
#[derive(Debug, Clone)]
pub struct MessageArchive {
    pub message_id:   MessageId,
    pub subject:      Subject,
    pub body:         String,
    pub format:       BodyFormat,
    pub sender_name:  SenderName,
    pub sender_email: Email,
    pub category_ids: Vec<CategoryId>,
    pub sent_at:      DateTime<Utc>,
}

impl MessageArchive {
    /// メッセージからアーカイブレコードを組み立てる
    pub fn from_message(message: &MassMessage, sent_at: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id().clone(),
            subject: message.subject().clone(),
            body: message.body().text().to_string(),
            format: message.body().format(),
            sender_name: message.sender().name().clone(),
            sender_email: message.sender().email().clone(),
            category_ids: message.categories().to_vec(),
            sent_at,
        }
    }
}

/// アーカイブリポジトリトレイト
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// アーカイブレコードを保存する
    ///
    /// 同じ message_id のレコードが既に存在する場合は何もしない（冪等）。
    async fn store(&self, archive: &MessageArchive) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の ArchiveRepository
#[derive(Debug, Clone)]
pub struct PostgresArchiveRepository {
    pool: PgPool,
}

impl PostgresArchiveRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveRepository for PostgresArchiveRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(message_id = %archive.message_id))]
    async fn store(&self, archive: &MessageArchive) -> Result<(), InfraError> {
        let category_ids: Vec<String> = archive
            .category_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO message_archives (
                message_id, subject, body, format,
                sender_name, sender_email, category_ids, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(archive.message_id.as_uuid())
        .bind(archive.subject.as_str())
        .bind(&archive.body)
        .bind(<BodyFormat as Into<&str>>::into(archive.format))
        .bind(archive.sender_name.as_str())
        .bind(archive.sender_email.as_str())
        .bind(&category_ids)
        .bind(archive.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
