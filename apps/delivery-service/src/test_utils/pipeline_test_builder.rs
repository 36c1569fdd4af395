//! 配信パイプラインテストビルダー
//!
//! テストコードの重複を削減するためのビルダーパターン実装。
//! インメモリキューと Mock リポジトリで受付〜配信の全段を結線し、
//! シード用ヘルパーとワーカー1周分の実行ヘルパーを提供する。

use std::sync::Arc;

use kairan_domain::{
    category::{
        Category,
        CategoryId,
        CategoryLabel,
        Conjunction,
        Grouping,
        GroupingKey,
        OptOutPolicy,
    },
    clock::FixedClock,
    message::SenderName,
    recipient::{AccountId, AccountProfile, AccountStatus, Email, Locale},
};
use kairan_infra::{
    InfraError,
    grouping::GroupingRegistry,
    mock::{
        InMemoryQueue,
        MockAccountDirectory,
        MockArchiveRepository,
        MockCategoryRepository,
        MockGroupingResolver,
        MockOptOutProvider,
        RecordingMailTransport,
    },
};

use crate::{
    usecase::{AudienceResolver, DeliveryUseCase, SendDefaults, SubmissionUseCase},
    worker,
};

/// 配信パイプラインテストのセットアップデータ
///
/// PipelineTestBuilder が生成する SUT と Mock 一式。Mock はすべて
/// SUT と共有されているため、シード用メソッドで登録したデータは
/// そのまま SUT から見える。
pub struct PipelineSetup {
    pub submission: SubmissionUseCase,
    pub delivery: DeliveryUseCase,
    pub queue: Arc<InMemoryQueue>,
    pub transport: Arc<RecordingMailTransport>,
    pub directory: Arc<MockAccountDirectory>,
    pub archive: Arc<MockArchiveRepository>,
    pub opt_out: Arc<MockOptOutProvider>,
    pub categories: Arc<MockCategoryRepository>,
    pub grouping: Arc<MockGroupingResolver>,
    pub max_attempts: u32,
}

/// 配信パイプラインテストビルダー
///
/// 既定値は本番の初期設定に合わせてある（BCC 配信・バッチサイズ 50・
/// 試行上限 3・オプトアウトはカテゴリ単位）。
///
/// # 使用例
///
/// ```ignore
/// use kairan_delivery_service::test_utils::PipelineTestBuilder;
///
/// #[tokio::test]
/// async fn test_example() {
///     let setup = PipelineTestBuilder::new().build();
///     setup.seed_active_account("a@example.com", &["member"]);
///     let category_id = setup.seed_category("general", &["member"]);
///
///     let message_id = setup.submission.submit(...).await.unwrap();
///     while setup.run_submission_once().await.unwrap() {}
///     while setup.run_delivery_once().await.unwrap() {}
///
///     assert_eq!(setup.transport.sent_count(), 1);
/// }
/// ```
pub struct PipelineTestBuilder {
    batch_size:   usize,
    max_attempts: u32,
    defaults:     SendDefaults,
}

impl PipelineTestBuilder {
    /// デフォルト値で新しいビルダーを作成
    pub fn new() -> Self {
        Self {
            batch_size:   50,
            max_attempts: 3,
            defaults:     SendDefaults {
                use_bcc:             true,
                sender_name:         SenderName::new("配信係").unwrap(),
                sender_email:        Email::new("sender@example.com").unwrap(),
                create_archive_copy: false,
                self_copy:           None,
                body_prefix:         None,
                body_suffix:         None,
                opt_out_policy:      OptOutPolicy::Category,
            },
        }
    }

    /// バッチサイズを指定
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// リトライ試行上限を指定
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// 宛先モードを指定（false で個別送信）
    pub fn with_use_bcc(mut self, use_bcc: bool) -> Self {
        self.defaults.use_bcc = use_bcc;
        self
    }

    /// 控えの保存を有効化
    pub fn with_create_archive_copy(mut self, create_archive_copy: bool) -> Self {
        self.defaults.create_archive_copy = create_archive_copy;
        self
    }

    /// 送信者控え送付先を指定
    pub fn with_self_copy(mut self, email: &str) -> Self {
        self.defaults.self_copy = Some(Email::new(email).unwrap());
        self
    }

    /// 本文接頭辞を指定
    pub fn with_body_prefix(mut self, prefix: &str) -> Self {
        self.defaults.body_prefix = Some(prefix.to_string());
        self
    }

    /// 本文接尾辞を指定
    pub fn with_body_suffix(mut self, suffix: &str) -> Self {
        self.defaults.body_suffix = Some(suffix.to_string());
        self
    }

    /// オプトアウト方針を指定
    pub fn with_opt_out_policy(mut self, policy: OptOutPolicy) -> Self {
        self.defaults.opt_out_policy = policy;
        self
    }

    /// Mock 一式を含む SUT（System Under Test）を構築
    ///
    /// グルーピング方式は `role` のみ登録する。未知方式のテストでは
    /// [`PipelineSetup::seed_category_with_strategy`] で別の方式キーを
    /// 参照するカテゴリを登録すればよい。
    pub fn build(&self) -> PipelineSetup {
        let queue = Arc::new(InMemoryQueue::new());
        let transport = Arc::new(RecordingMailTransport::new());
        let directory = Arc::new(MockAccountDirectory::new());
        let archive = Arc::new(MockArchiveRepository::new());
        let opt_out = Arc::new(MockOptOutProvider::new());
        let categories = Arc::new(MockCategoryRepository::new());
        let grouping = Arc::new(MockGroupingResolver::new());

        let mut registry = GroupingRegistry::new();
        registry.register("role", grouping.clone());

        let audience = AudienceResolver::new(
            categories.clone(),
            Arc::new(registry),
            opt_out.clone(),
            directory.clone(),
        );

        let submission = SubmissionUseCase::new(
            queue.clone(),
            audience,
            archive.clone(),
            transport.clone(),
            Arc::new(FixedClock::from_timestamp(1_700_000_000)),
            self.defaults.clone(),
            self.batch_size,
        );

        let delivery = DeliveryUseCase::new(directory.clone(), transport.clone());

        PipelineSetup {
            submission,
            delivery,
            queue,
            transport,
            directory,
            archive,
            opt_out,
            categories,
            grouping,
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for PipelineTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSetup {
    /// アクティブなアカウントをディレクトリに登録し、ロールを付与する
    pub fn seed_active_account(&self, email: &str, roles: &[&str]) -> AccountId {
        self.seed_account(email, "ja", AccountStatus::Active, roles)
    }

    /// 任意のロケール・状態のアカウントをディレクトリに登録する
    ///
    /// ディレクトリ登録済みアカウントには `authenticated` 疑似ロールを
    /// 自動付与する（本番のロール方式と同じ扱い）。ロールは状態に
    /// かかわらず付与されるため、「解決はされるが在籍確認で落ちる」
    /// ケースのテストにも使える。
    pub fn seed_account(
        &self,
        email: &str,
        locale: &str,
        status: AccountStatus,
        roles: &[&str],
    ) -> AccountId {
        let id = AccountId::new();
        self.directory.add_account(AccountProfile::from_directory(
            id.clone(),
            Email::new(email).unwrap(),
            Locale::new(locale).unwrap(),
            status,
        ));
        for role in roles {
            self.grouping.grant(*role, id.clone());
        }
        self.grouping.grant("authenticated", id.clone());
        id
    }

    /// ロール方式（OR 結合）のカテゴリを登録する
    pub fn seed_category(&self, id: &str, roles: &[&str]) -> CategoryId {
        self.seed_category_with(id, Conjunction::Any, roles)
    }

    /// ロール方式のカテゴリを結合方法つきで登録する
    pub fn seed_category_with(
        &self,
        id: &str,
        conjunction: Conjunction,
        roles: &[&str],
    ) -> CategoryId {
        self.seed_category_with_strategy(id, "role", conjunction, roles)
    }

    /// 任意のグルーピング方式キーを参照するカテゴリを登録する
    pub fn seed_category_with_strategy(
        &self,
        id: &str,
        strategy: &str,
        conjunction: Conjunction,
        selectors: &[&str],
    ) -> CategoryId {
        let category_id = CategoryId::new(id).unwrap();
        let grouping = Grouping::new(
            GroupingKey::new(strategy).unwrap(),
            conjunction,
            selectors.iter().map(|s| (*s).to_string()).collect(),
        )
        .unwrap();
        self.categories.add_category(Category::from_config(
            category_id.clone(),
            CategoryLabel::new(id).unwrap(),
            vec![grouping],
        ));
        category_id
    }

    /// 受付キューを1件分処理する（本番ワーカーと同じ経路）
    pub async fn run_submission_once(&self) -> Result<bool, InfraError> {
        worker::poll_submission_once(self.queue.as_ref(), &self.submission, self.max_attempts)
            .await
    }

    /// 配信キューを1件分処理する（本番ワーカーと同じ経路）
    pub async fn run_delivery_once(&self) -> Result<bool, InfraError> {
        worker::poll_delivery_once(self.queue.as_ref(), &self.delivery, self.max_attempts).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_new_既定値は本番初期設定と一致する() {
        // Act
        let builder = PipelineTestBuilder::new();

        // Assert
        assert_eq!(builder.batch_size, 50);
        assert_eq!(builder.max_attempts, 3);
        assert!(builder.defaults.use_bcc);
        assert_eq!(builder.defaults.opt_out_policy, OptOutPolicy::Category);
    }

    #[test]
    fn test_with_batch_size_カスタマイズできる() {
        // Act
        let builder = PipelineTestBuilder::new().with_batch_size(10);

        // Assert
        assert_eq!(builder.batch_size, 10);
    }

    #[tokio::test]
    async fn test_seed_account_ディレクトリとロール付与が連動する() {
        // Arrange
        let setup = PipelineTestBuilder::new().build();

        // Act
        let id = setup.seed_active_account("a@example.com", &["member"]);

        // Assert
        use kairan_infra::grouping::GroupingResolver as _;
        let resolved = setup
            .grouping
            .resolve(&["member".to_string()], Conjunction::Any)
            .await
            .unwrap();
        assert!(resolved.contains(&id));
        let authenticated = setup
            .grouping
            .resolve(&["authenticated".to_string()], Conjunction::Any)
            .await
            .unwrap();
        assert!(authenticated.contains(&id));
    }
}
