//! # キュー投入アイテム
//!
//! 二段構えのキュー（受付キュー / 配信キュー）に格納されるアイテムの
//! スキーマを定義する。
//!
//! ## 二段キューの目的
//!
//! - **受付キュー**: 送信リクエスト 1 件につき 1 アイテム。宛先解決という
//!   重い処理をリクエストから切り離す
//! - **配信キュー**: 宛先バッチ 1 つにつき 1 アイテム。バッチ単位で独立に
//!   再試行でき、1 バッチの失敗や遅延が他バッチへ波及しない
//!
//! ## 設計方針
//!
//! - **自己完結**: アイテムはメッセージ本体と送信時設定スナップショットを
//!   内包し、処理時に設定ストレージへ依存しない
//! - **直列化可能**: serde で JSON に直列化され、外部キューの永続性契約に
//!   より プロセス再起動をまたいで生存する
//! - **試行回数の持ち回り**: 再試行の上限判定に使う `attempt` をアイテム
//!   自身が持つ。バックオフ等の追加制御はこの層では行わない

use serde::{Deserialize, Serialize};

use crate::{
    batch::RecipientBatch,
    message::{MassMessage, SendOptions},
};

/// 受付キューアイテム
///
/// 送信リクエスト 1 件ぶんの処理単位。受付ワーカーが取り出し、
/// 宛先解決とバッチ分割を実行する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionJob {
    message: MassMessage,
    options: SendOptions,
    attempt: u32,
}

impl SubmissionJob {
    /// 新しい受付キューアイテムを作成する（試行回数 0）
    pub fn new(message: MassMessage, options: SendOptions) -> Self {
        Self {
            message,
            options,
            attempt: 0,
        }
    }

    pub fn message(&self) -> &MassMessage {
        &self.message
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 試行回数を 1 増やした再試行用アイテムを返す
    pub fn with_next_attempt(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// 配信キューアイテム
///
/// 宛先バッチ 1 つぶんの処理単位。配信ワーカーが取り出し、
/// メッセージ組み立てと配信を実行する。
///
/// # 不変条件
///
/// - `batch` は空でない（空の宛先集合は配信アイテムを生成しない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
    message: MassMessage,
    options: SendOptions,
    batch:   RecipientBatch,
    attempt: u32,
}

impl DeliveryJob {
    /// 新しい配信キューアイテムを作成する（試行回数 0）
    pub fn new(message: MassMessage, options: SendOptions, batch: RecipientBatch) -> Self {
        Self {
            message,
            options,
            batch,
            attempt: 0,
        }
    }

    pub fn message(&self) -> &MassMessage {
        &self.message
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    pub fn batch(&self) -> &RecipientBatch {
        &self.batch
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 試行回数を 1 増やした再試行用アイテムを返す
    pub fn with_next_attempt(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}
