//! # 永続キュー
//!
//! Redis を使用した受付キュー・配信キューの 2 段構成を提供する。
//!
//! ## Redis キー設計
//!
//! | キー | 型 | 用途 |
//! |-----|-----|-----|
//! | `queue:{name}:pending` | LIST | 未処理アイテム（LPUSH で投入、末尾から取得） |
//! | `queue:{name}:processing` | LIST | 処理中アイテム（ワーカーが取得したもの） |
//! | `queue:{name}:dead` | LIST | リトライ上限を超えたアイテム |
//!
//! ## 信頼性パターン
//!
//! `LMOVE pending → processing` でアイテムを原子的に移動する。取得と同時に
//! processing リストへ記録されるため、ワーカーがクラッシュしてもアイテムは
//! 消失しない。処理完了時に `LREM processing` で削除する。
//!
//! 同じアイテムが複数ワーカーに渡らないことは Redis のリスト操作の
//! 原子性が保証する（相互排他はキュー側の責務）。
//!
//! ## リトライと dead letter
//!
//! アイテム（ジョブ）は試行回数を自身で持つ。処理に失敗したアイテムは
//! 試行回数を増やして pending に積み直し、上限到達で dead リストに移す。
//! 積み直しにバックオフは入れない（次の取得で即座に再処理される）。

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::InfraError;

/// 受付キュー名
///
/// 送信依頼 1 件につき 1 アイテムが投入される。
pub const SUBMISSION_QUEUE: &str = "submission";

/// 配信キュー名
///
/// 配信バッチ 1 件につき 1 アイテムが投入される。
pub const DELIVERY_QUEUE: &str = "delivery";

/// 取得済みアイテム
///
/// `claim_next` の戻り値。取得元キュー名とペイロードを保持し、
/// 処理完了時の削除（`delete`）や積み直し（`retry_or_bury`）で
/// processing リストの該当エントリを特定するために使用する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedItem {
   queue:   String,
   payload: String,
}

impl ClaimedItem {
   /// 取得済みアイテムを作成する
   pub fn new(queue: impl Into<String>, payload: impl Into<String>) -> Self {
      Self {
         queue:   queue.into(),
         payload: payload.into(),
      }
   }

   /// 取得元キュー名
   pub fn queue(&self) -> &str {
      &self.queue
   }

   /// ペイロード（JSON 文字列）
   pub fn payload(&self) -> &str {
      &self.payload
   }
}

/// 積み直し判定の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
   /// pending に積み直した（リトライされる）
   Retried,
   /// dead リストに移した（リトライ上限到達）
   Buried,
}

/// 永続キュートレイト
///
/// キューの投入・取得・完了・積み直しを行う。
/// 実装は Redis を使用する `RedisQueue` を参照。
#[async_trait]
pub trait DurableQueue: Send + Sync {
   /// アイテムをキューに投入する
   ///
   /// 投入は即座に完了し、処理はワーカーが非同期に行う。
   async fn enqueue(&self, queue: &str, payload: &str) -> Result<(), InfraError>;

   /// 未処理アイテムを 1 件取得する
   ///
   /// キューが空の場合は `None` を返す（ブロックしない）。
   /// 取得したアイテムは processing リストに移り、`delete` が
   /// 呼ばれるまでキューの所有物として残る。
   async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedItem>, InfraError>;

   /// 処理が完了したアイテムを削除する
   async fn delete(&self, item: &ClaimedItem) -> Result<(), InfraError>;

   /// 失敗したアイテムを積み直すか dead letter に移す
   ///
   /// # 引数
   ///
   /// - `item`: 取得済みアイテム（processing リストから削除される）
   /// - `retry_payload`: 試行回数を増やしたペイロード
   /// - `next_attempt`: `retry_payload` の試行回数
   /// - `max_attempts`: 試行回数の上限
   ///
   /// `next_attempt >= max_attempts` の場合は元のペイロードを
   /// dead リストに移し、[`RetryDecision::Buried`] を返す。
   async fn retry_or_bury(
      &self,
      item: &ClaimedItem,
      retry_payload: &str,
      next_attempt: u32,
      max_attempts: u32,
   ) -> Result<RetryDecision, InfraError>;
}

/// Redis を使用した永続キュー
///
/// 受付キューと配信キューの両方をこの 1 インスタンスで扱う
/// （キー空間が `queue:{name}:*` で分離されるため）。
#[derive(Clone)]
pub struct RedisQueue {
   conn: ConnectionManager,
}

impl RedisQueue {
   /// 新しい RedisQueue を作成する
   ///
   /// # 引数
   ///
   /// - `redis_url`: Redis 接続 URL（例: `redis://localhost:6379`）
   pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
      let client = redis::Client::open(redis_url)?;
      let conn = ConnectionManager::new(client).await?;
      Ok(Self { conn })
   }

   /// 既存の接続からインスタンスを作成する
   pub fn from_connection(conn: ConnectionManager) -> Self {
      Self { conn }
   }

   /// 疎通確認（readiness check 用）
   pub async fn ping(&self) -> Result<(), InfraError> {
      let mut conn = self.conn.clone();
      let _: String = redis::cmd("PING").query_async(&mut conn).await?;
      Ok(())
   }

   /// 未処理リストのキーを生成する
   fn pending_key(queue: &str) -> String {
      format!("queue:{queue}:pending")
   }

   /// 処理中リストのキーを生成する
   fn processing_key(queue: &str) -> String {
      format!("queue:{queue}:processing")
   }

   /// dead letter リストのキーを生成する
   fn dead_key(queue: &str) -> String {
      format!("queue:{queue}:dead")
   }
}

#[async_trait]
impl DurableQueue for RedisQueue {
   async fn enqueue(&self, queue: &str, payload: &str) -> Result<(), InfraError> {
      let mut conn = self.conn.clone();
      let _: () = conn.lpush(Self::pending_key(queue), payload).await?;
      Ok(())
   }

   async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedItem>, InfraError> {
      let mut conn = self.conn.clone();

      // LMOVE RIGHT → LEFT: LPUSH で先頭に積むため、末尾から取ると FIFO になる
      let payload: Option<String> = conn
         .lmove(
            Self::pending_key(queue),
            Self::processing_key(queue),
            redis::Direction::Right,
            redis::Direction::Left,
         )
         .await?;

      Ok(payload.map(|p| ClaimedItem::new(queue, p)))
   }

   async fn delete(&self, item: &ClaimedItem) -> Result<(), InfraError> {
      let mut conn = self.conn.clone();
      let _: () = conn
         .lrem(Self::processing_key(item.queue()), 1, item.payload())
         .await?;
      Ok(())
   }

   async fn retry_or_bury(
      &self,
      item: &ClaimedItem,
      retry_payload: &str,
      next_attempt: u32,
      max_attempts: u32,
   ) -> Result<RetryDecision, InfraError> {
      let mut conn = self.conn.clone();

      let decision = if next_attempt >= max_attempts {
         let _: () = conn.lpush(Self::dead_key(item.queue()), item.payload()).await?;
         RetryDecision::Buried
      } else {
         let _: () = conn
            .lpush(Self::pending_key(item.queue()), retry_payload)
            .await?;
         RetryDecision::Retried
      };

      // 積み直し後に processing から除去する。この 2 コマンドの間で
      // クラッシュしても、アイテムは processing に残り回収可能
      // （at-least-once 配信）。
      let _: () = conn
         .lrem(Self::processing_key(item.queue()), 1, item.payload())
         .await?;

      Ok(decision)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_claimed_itemがキュー名とペイロードを保持する() {
      let item = ClaimedItem::new(SUBMISSION_QUEUE, r#"{"attempt":0}"#);
      assert_eq!(item.queue(), "submission");
      assert_eq!(item.payload(), r#"{"attempt":0}"#);
   }

   #[test]
   fn test_キー生成が名前空間を分離する() {
      assert_eq!(RedisQueue::pending_key("submission"), "queue:submission:pending");
      assert_eq!(
         RedisQueue::processing_key("delivery"),
         "queue:delivery:processing"
      );
      assert_eq!(RedisQueue::dead_key("delivery"), "queue:delivery:dead");
   }

   #[test]
   fn test_durable_queue_traitはsendとsyncを実装している() {
      fn assert_send_sync<T: Send + Sync + ?Sized>() {}
      assert_send_sync::<dyn DurableQueue>();
      assert_send_sync::<RedisQueue>();
   }
}
