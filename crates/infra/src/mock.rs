//! # テスト用モック実装
//!
//! ユースケース・ワーカーのテストで使用するインメモリモック実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! kairan-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
   collections::{HashMap, HashSet, VecDeque},
   sync::{Arc, Mutex},
};

use async_trait::async_trait;
use kairan_domain::{
   category::{Category, CategoryId, Conjunction, OptOutPolicy},
   outbound::{OutboundEmail, TransportError},
   recipient::{AccountId, AccountProfile, AccountStatus},
};

use crate::{
   error::InfraError,
   grouping::GroupingResolver,
   mailer::MailTransport,
   queue::{ClaimedItem, DurableQueue, RetryDecision},
   repository::{
      AccountDirectory, ArchiveRepository, CategoryRepository, MessageArchive, OptOutProvider,
   },
};

// ===== InMemoryQueue =====

#[derive(Default)]
struct QueueState {
   pending:    HashMap<String, VecDeque<String>>,
   processing: HashMap<String, Vec<String>>,
   dead:       HashMap<String, Vec<String>>,
}

/// Redis を使わないインメモリの永続キュー
///
/// `RedisQueue` と同じ FIFO・積み直しセマンティクスを提供する。
/// Clone してもリストは共有される。
#[derive(Clone, Default)]
pub struct InMemoryQueue {
   state: Arc<Mutex<QueueState>>,
}

impl InMemoryQueue {
   pub fn new() -> Self {
      Self {
         state: Arc::new(Mutex::new(QueueState::default())),
      }
   }

   /// 未処理アイテムのスナップショットを取得する
   pub fn pending_items(&self, queue: &str) -> Vec<String> {
      let state = self.state.lock().unwrap();
      state
         .pending
         .get(queue)
         .map(|items| items.iter().cloned().collect())
         .unwrap_or_default()
   }

   /// dead letter のスナップショットを取得する
   pub fn dead_items(&self, queue: &str) -> Vec<String> {
      let state = self.state.lock().unwrap();
      state.dead.get(queue).cloned().unwrap_or_default()
   }

   /// 処理中アイテム数を取得する
   pub fn processing_len(&self, queue: &str) -> usize {
      let state = self.state.lock().unwrap();
      state.processing.get(queue).map_or(0, Vec::len)
   }
}

#[async_trait]
impl DurableQueue for InMemoryQueue {
   async fn enqueue(&self, queue: &str, payload: &str) -> Result<(), InfraError> {
      let mut state = self.state.lock().unwrap();
      state
         .pending
         .entry(queue.to_string())
         .or_default()
         .push_back(payload.to_string());
      Ok(())
   }

   async fn claim_next(&self, queue: &str) -> Result<Option<ClaimedItem>, InfraError> {
      let mut state = self.state.lock().unwrap();

      let Some(payload) = state.pending.get_mut(queue).and_then(|q| q.pop_front()) else {
         return Ok(None);
      };

      state
         .processing
         .entry(queue.to_string())
         .or_default()
         .push(payload.clone());

      Ok(Some(ClaimedItem::new(queue, payload)))
   }

   async fn delete(&self, item: &ClaimedItem) -> Result<(), InfraError> {
      let mut state = self.state.lock().unwrap();
      if let Some(processing) = state.processing.get_mut(item.queue()) {
         if let Some(pos) = processing.iter().position(|p| p == item.payload()) {
            processing.remove(pos);
         }
      }
      Ok(())
   }

   async fn retry_or_bury(
      &self,
      item: &ClaimedItem,
      retry_payload: &str,
      next_attempt: u32,
      max_attempts: u32,
   ) -> Result<RetryDecision, InfraError> {
      let mut state = self.state.lock().unwrap();

      let decision = if next_attempt >= max_attempts {
         state
            .dead
            .entry(item.queue().to_string())
            .or_default()
            .push(item.payload().to_string());
         RetryDecision::Buried
      } else {
         state
            .pending
            .entry(item.queue().to_string())
            .or_default()
            .push_back(retry_payload.to_string());
         RetryDecision::Retried
      };

      if let Some(processing) = state.processing.get_mut(item.queue()) {
         if let Some(pos) = processing.iter().position(|p| p == item.payload()) {
            processing.remove(pos);
         }
      }

      Ok(decision)
   }
}

// ===== MockCategoryRepository =====

#[derive(Clone, Default)]
pub struct MockCategoryRepository {
   categories: Arc<Mutex<Vec<Category>>>,
}

impl MockCategoryRepository {
   pub fn new() -> Self {
      Self {
         categories: Arc::new(Mutex::new(Vec::new())),
      }
   }

   pub fn add_category(&self, category: Category) {
      self.categories.lock().unwrap().push(category);
   }
}

#[async_trait]
impl CategoryRepository for MockCategoryRepository {
   async fn find_by_ids(&self, ids: &[CategoryId]) -> Result<Vec<Category>, InfraError> {
      Ok(self
         .categories
         .lock()
         .unwrap()
         .iter()
         .filter(|category| ids.contains(category.id()))
         .cloned()
         .collect())
   }
}

// ===== MockGroupingResolver =====

/// セレクタ所属を事前登録して解決するモックリゾルバ
///
/// `grant` でセレクタとアカウントの所属関係を登録し、`resolve` が
/// 結合条件に従って和集合（ANY）または積集合（ALL）を返す。
#[derive(Clone, Default)]
pub struct MockGroupingResolver {
   memberships: Arc<Mutex<HashMap<String, HashSet<AccountId>>>>,
}

impl MockGroupingResolver {
   pub fn new() -> Self {
      Self {
         memberships: Arc::new(Mutex::new(HashMap::new())),
      }
   }

   pub fn grant(&self, selector: impl Into<String>, account_id: AccountId) {
      self.memberships
         .lock()
         .unwrap()
         .entry(selector.into())
         .or_default()
         .insert(account_id);
   }
}

#[async_trait]
impl GroupingResolver for MockGroupingResolver {
   async fn resolve(
      &self,
      selectors: &[String],
      conjunction: Conjunction,
   ) -> Result<HashSet<AccountId>, InfraError> {
      let memberships = self.memberships.lock().unwrap();

      let resolved = match conjunction {
         Conjunction::Any => selectors
            .iter()
            .filter_map(|selector| memberships.get(selector))
            .flatten()
            .cloned()
            .collect(),
         Conjunction::All => selectors
            .iter()
            .map(|selector| memberships.get(selector).cloned().unwrap_or_default())
            .reduce(|acc, set| acc.intersection(&set).cloned().collect())
            .unwrap_or_default(),
      };

      Ok(resolved)
   }
}

// ===== MockOptOutProvider =====

#[derive(Clone, Default)]
pub struct MockOptOutProvider {
   global:      Arc<Mutex<HashSet<AccountId>>>,
   by_category: Arc<Mutex<HashMap<CategoryId, HashSet<AccountId>>>>,
}

impl MockOptOutProvider {
   pub fn new() -> Self {
      Self {
         global:      Arc::new(Mutex::new(HashSet::new())),
         by_category: Arc::new(Mutex::new(HashMap::new())),
      }
   }

   pub fn add_global_opt_out(&self, account_id: AccountId) {
      self.global.lock().unwrap().insert(account_id);
   }

   pub fn add_category_opt_out(&self, category_id: CategoryId, account_id: AccountId) {
      self.by_category
         .lock()
         .unwrap()
         .entry(category_id)
         .or_default()
         .insert(account_id);
   }
}

#[async_trait]
impl OptOutProvider for MockOptOutProvider {
   async fn opted_out_accounts(
      &self,
      policy: OptOutPolicy,
      categories: &[CategoryId],
   ) -> Result<HashSet<AccountId>, InfraError> {
      let opted_out = match policy {
         OptOutPolicy::Disabled => HashSet::new(),
         OptOutPolicy::Global => self.global.lock().unwrap().clone(),
         OptOutPolicy::Category => {
            let mut opted_out = self.global.lock().unwrap().clone();
            let by_category = self.by_category.lock().unwrap();
            for category_id in categories {
               if let Some(accounts) = by_category.get(category_id) {
                  opted_out.extend(accounts.iter().cloned());
               }
            }
            opted_out
         }
      };

      Ok(opted_out)
   }
}

// ===== MockAccountDirectory =====

#[derive(Clone, Default)]
pub struct MockAccountDirectory {
   accounts: Arc<Mutex<Vec<AccountProfile>>>,
}

impl MockAccountDirectory {
   pub fn new() -> Self {
      Self {
         accounts: Arc::new(Mutex::new(Vec::new())),
      }
   }

   pub fn add_account(&self, profile: AccountProfile) {
      self.accounts.lock().unwrap().push(profile);
   }

   /// 登録済みアカウントの状態を変更する
   ///
   /// 宛先解決後・配信前に無効化されたアカウントのテストに使用する。
   pub fn set_status(&self, account_id: &AccountId, status: AccountStatus) {
      let mut accounts = self.accounts.lock().unwrap();
      if let Some(profile) = accounts.iter_mut().find(|p| p.id() == account_id) {
         *profile = AccountProfile::from_directory(
            profile.id().clone(),
            profile.email().clone(),
            profile.locale().clone(),
            status,
         );
      }
   }
}

#[async_trait]
impl AccountDirectory for MockAccountDirectory {
   async fn find_by_ids(&self, ids: &[AccountId]) -> Result<Vec<AccountProfile>, InfraError> {
      Ok(self
         .accounts
         .lock()
         .unwrap()
         .iter()
         .filter(|profile| ids.contains(profile.id()))
         .cloned()
         .collect())
   }
}

// ===== MockArchiveRepository =====

#[derive(Clone, Default)]
pub struct MockArchiveRepository {
   archives: Arc<Mutex<Vec<MessageArchive>>>,
}

impl MockArchiveRepository {
   pub fn new() -> Self {
      Self {
         archives: Arc::new(Mutex::new(Vec::new())),
      }
   }

   /// 保存されたアーカイブのスナップショットを取得する
   pub fn stored(&self) -> Vec<MessageArchive> {
      self.archives.lock().unwrap().clone()
   }
}

#[async_trait]
impl ArchiveRepository for MockArchiveRepository {
   async fn store(&self, archive: &MessageArchive) -> Result<(), InfraError> {
      let mut archives = self.archives.lock().unwrap();

      // ON CONFLICT DO NOTHING 相当。同じ message_id は 1 件しか保存しない
      if archives
         .iter()
         .all(|stored| stored.message_id != archive.message_id)
      {
         archives.push(archive.clone());
      }

      Ok(())
   }
}

// ===== RecordingMailTransport =====

/// 送信されたメールを記録するモックトランスポート
///
/// `fail_for` で登録したアドレスを宛先に含む送信は失敗する
/// （宛先単位の失敗分離のテストに使用する）。
#[derive(Clone, Default)]
pub struct RecordingMailTransport {
   sent:           Arc<Mutex<Vec<OutboundEmail>>>,
   fail_addresses: Arc<Mutex<HashSet<String>>>,
}

impl RecordingMailTransport {
   pub fn new() -> Self {
      Self {
         sent:           Arc::new(Mutex::new(Vec::new())),
         fail_addresses: Arc::new(Mutex::new(HashSet::new())),
      }
   }

   /// 指定アドレス宛の送信を失敗させる
   pub fn fail_for(&self, address: impl Into<String>) {
      self.fail_addresses.lock().unwrap().insert(address.into());
   }

   /// 送信に成功したメールのスナップショットを取得する
   pub fn sent(&self) -> Vec<OutboundEmail> {
      self.sent.lock().unwrap().clone()
   }

   /// 送信に成功したメールの件数を取得する
   pub fn sent_count(&self) -> usize {
      self.sent.lock().unwrap().len()
   }
}

#[async_trait]
impl MailTransport for RecordingMailTransport {
   async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
      {
         let fail_addresses = self.fail_addresses.lock().unwrap();
         let failing = email
            .to
            .iter()
            .chain(email.bcc.iter())
            .find(|address| fail_addresses.contains(address.as_str()));

         if let Some(address) = failing {
            return Err(TransportError::SendFailed(format!(
               "モック設定による失敗: {address}"
            )));
         }
      }

      self.sent.lock().unwrap().push(email.clone());
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use pretty_assertions::assert_eq;

   use super::*;
   use crate::queue::SUBMISSION_QUEUE;

   #[tokio::test]
   async fn test_インメモリキューはfifo順で取得する() {
      let queue = InMemoryQueue::new();
      queue.enqueue(SUBMISSION_QUEUE, "first").await.unwrap();
      queue.enqueue(SUBMISSION_QUEUE, "second").await.unwrap();

      let item = queue.claim_next(SUBMISSION_QUEUE).await.unwrap().unwrap();
      assert_eq!(item.payload(), "first");
      assert_eq!(queue.processing_len(SUBMISSION_QUEUE), 1);

      queue.delete(&item).await.unwrap();
      assert_eq!(queue.processing_len(SUBMISSION_QUEUE), 0);

      let item = queue.claim_next(SUBMISSION_QUEUE).await.unwrap().unwrap();
      assert_eq!(item.payload(), "second");
   }

   #[tokio::test]
   async fn test_インメモリキューは積み直しと上限到達を区別する() {
      let queue = InMemoryQueue::new();
      queue
         .enqueue(SUBMISSION_QUEUE, r#"{"attempt":0}"#)
         .await
         .unwrap();

      let item = queue.claim_next(SUBMISSION_QUEUE).await.unwrap().unwrap();
      let decision = queue
         .retry_or_bury(&item, r#"{"attempt":1}"#, 1, 3)
         .await
         .unwrap();
      assert_eq!(decision, RetryDecision::Retried);
      assert_eq!(queue.pending_items(SUBMISSION_QUEUE), [r#"{"attempt":1}"#]);
      assert_eq!(queue.processing_len(SUBMISSION_QUEUE), 0);

      let item = queue.claim_next(SUBMISSION_QUEUE).await.unwrap().unwrap();
      let decision = queue
         .retry_or_bury(&item, r#"{"attempt":3}"#, 3, 3)
         .await
         .unwrap();
      assert_eq!(decision, RetryDecision::Buried);
      assert!(queue.pending_items(SUBMISSION_QUEUE).is_empty());
      assert_eq!(queue.dead_items(SUBMISSION_QUEUE), [r#"{"attempt":1}"#]);
   }

   #[tokio::test]
   async fn test_記録トランスポートは失敗アドレスを分離する() {
      use kairan_domain::{message::BodyFormat, recipient::Locale};

      let transport = RecordingMailTransport::new();
      transport.fail_for("broken@example.com");

      let ok_mail = OutboundEmail {
         from_name:    None,
         from_address: "office@example.com".to_string(),
         to:           vec!["member@example.com".to_string()],
         bcc:          vec![],
         subject:      "お知らせ".to_string(),
         body:         "本文".to_string(),
         format:       BodyFormat::PlainText,
         locale:       Locale::default(),
      };
      let failing_mail = OutboundEmail {
         to: vec!["broken@example.com".to_string()],
         ..ok_mail.clone()
      };

      assert!(transport.send(&ok_mail).await.is_ok());
      assert!(transport.send(&failing_mail).await.is_err());
      assert_eq!(transport.sent_count(), 1);
      assert_eq!(transport.sent()[0].to, ["member@example.com"]);
   }
}
