//! # 受付処理
//!
//! 一斉送信メッセージの受付と、受付キューアイテムの処理を担う。
//!
//! ## 設計方針
//!
//! - 受付（[`SubmissionUseCase::submit`]）は検証・設定スナップショット
//!   作成・受付キュー投入のみを行い、即座に戻る
//! - 重い処理（宛先解決・バッチ分割・配信キュー投入）はワーカーが
//!   [`SubmissionUseCase::process`] で実行する
//! - 設定はすべて受付時点のスナップショットを使い、キュー滞留中の
//!   設定変更の影響を受けない

use std::sync::Arc;

use kairan_domain::{
    batch::split_into_batches,
    category::{CategoryId, OptOutPolicy},
    clock::Clock,
    dispatch::{DeliveryJob, SubmissionJob},
    message::{
        MassMessage,
        MessageBody,
        MessageId,
        SendOptions,
        SenderIdentity,
        SenderName,
        Subject,
    },
    recipient::Email,
};
use kairan_infra::{
    InfraError,
    mailer::MailTransport,
    queue::{DELIVERY_QUEUE, DurableQueue, SUBMISSION_QUEUE},
    repository::{ArchiveRepository, MessageArchive},
};
use kairan_shared::{event_log::event, log_business_event};

use crate::{
    error::DeliveryError,
    usecase::{audience::AudienceResolver, composer},
};

/// 受付入力
///
/// ハンドラが検証済みのドメイン値に変換してから渡す。
/// 送信者名・アドレスが未指定の場合は既定値で補完される。
#[derive(Debug)]
pub struct SubmissionInput {
    pub subject:      Subject,
    pub body:         MessageBody,
    pub categories:   Vec<CategoryId>,
    pub sender_name:  Option<SenderName>,
    pub sender_email: Option<Email>,
}

/// 送信時設定の既定値
///
/// 設定から組み立てられ、受付時のスナップショット作成に使われる。
#[derive(Debug, Clone)]
pub struct SendDefaults {
    pub use_bcc:             bool,
    pub sender_name:         SenderName,
    pub sender_email:        Email,
    pub create_archive_copy: bool,
    pub self_copy:           Option<Email>,
    pub body_prefix:         Option<String>,
    pub body_suffix:         Option<String>,
    pub opt_out_policy:      OptOutPolicy,
}

/// 受付ユースケース
pub struct SubmissionUseCase {
    queue:      Arc<dyn DurableQueue>,
    audience:   AudienceResolver,
    archive:    Arc<dyn ArchiveRepository>,
    transport:  Arc<dyn MailTransport>,
    clock:      Arc<dyn Clock>,
    defaults:   SendDefaults,
    batch_size: usize,
}

impl SubmissionUseCase {
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        audience: AudienceResolver,
        archive: Arc<dyn ArchiveRepository>,
        transport: Arc<dyn MailTransport>,
        clock: Arc<dyn Clock>,
        defaults: SendDefaults,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            audience,
            archive,
            transport,
            clock,
            defaults,
            batch_size,
        }
    }

    /// メッセージを受け付けて受付キューに投入する
    ///
    /// 送信者が未指定なら既定値で補完し、送信時設定のスナップショットを
    /// 添えてキューに積む。宛先解決はワーカーが行うため即座に戻る。
    pub async fn submit(&self, input: SubmissionInput) -> Result<MessageId, DeliveryError> {
        let sender = SenderIdentity::new(
            input
                .sender_name
                .unwrap_or_else(|| self.defaults.sender_name.clone()),
            input
                .sender_email
                .unwrap_or_else(|| self.defaults.sender_email.clone()),
        );
        let message = MassMessage::new(
            MessageId::new(),
            input.subject,
            input.body,
            input.categories,
            sender,
            self.clock.now(),
        )?;
        let options = SendOptions::new(
            self.defaults.use_bcc,
            message.sender().name().clone(),
            message.sender().email().clone(),
            self.defaults.create_archive_copy,
            self.defaults.self_copy.clone(),
            self.defaults.body_prefix.clone(),
            self.defaults.body_suffix.clone(),
            self.defaults.opt_out_policy,
        );

        let message_id = message.id().clone();
        let job = SubmissionJob::new(message, options);
        let payload = serde_json::to_string(&job).map_err(InfraError::from)?;
        self.queue.enqueue(SUBMISSION_QUEUE, &payload).await?;

        log_business_event!(
            event.category = event::category::SUBMISSION,
            event.action = event::action::MESSAGE_SUBMITTED,
            event.result = event::result::SUCCESS,
            event.entity_type = event::entity_type::MASS_MESSAGE,
            event.entity_id = %message_id,
            "一斉送信メッセージを受け付けました"
        );

        Ok(message_id)
    }

    /// 受付キューアイテムを処理する
    ///
    /// 宛先解決 → 控え保存 → バッチ分割 → 配信キュー投入を行う。
    /// 宛先が 0 件の場合は送信者への通知のみ行い、配信キューには
    /// 何も積まない。
    pub async fn process(&self, job: &SubmissionJob) -> Result<(), DeliveryError> {
        let message = job.message();
        let options = job.options();

        let recipients = self.audience.resolve(message, options).await?;
        log_business_event!(
            event.category = event::category::SUBMISSION,
            event.action = event::action::AUDIENCE_RESOLVED,
            event.result = event::result::SUCCESS,
            event.entity_type = event::entity_type::MASS_MESSAGE,
            event.entity_id = %message.id(),
            recipient_count = recipients.len(),
            "宛先を解決しました"
        );

        if recipients.is_empty() {
            let notice = composer::build_empty_audience_notice(message, options);
            self.transport
                .send(&notice)
                .await
                .map_err(|e| InfraError::mail(e.to_string()))?;
            log_business_event!(
                event.category = event::category::SUBMISSION,
                event.action = event::action::AUDIENCE_EMPTY,
                event.result = event::result::SUCCESS,
                event.entity_type = event::entity_type::MASS_MESSAGE,
                event.entity_id = %message.id(),
                "宛先が 0 件のため送信者へ通知しました"
            );
            return Ok(());
        }

        // 控えの保存は配信キュー投入より前に行う。アイテムが再配信された
        // 場合もメッセージ ID をキーとした冪等な upsert が二重保存を防ぐ
        if options.create_archive_copy() {
            let archive = MessageArchive::from_message(message, self.clock.now());
            self.archive.store(&archive).await?;
            log_business_event!(
                event.category = event::category::SUBMISSION,
                event.action = event::action::ARCHIVE_STORED,
                event.result = event::result::SUCCESS,
                event.entity_type = event::entity_type::MESSAGE_ARCHIVE,
                event.entity_id = %message.id(),
                "控えを保存しました"
            );
        }

        let batches = split_into_batches(recipients, self.batch_size)?;
        let batch_count = batches.len();
        for batch in batches {
            let delivery_job = DeliveryJob::new(message.clone(), options.clone(), batch);
            let payload = serde_json::to_string(&delivery_job).map_err(InfraError::from)?;
            self.queue.enqueue(DELIVERY_QUEUE, &payload).await?;
        }
        log_business_event!(
            event.category = event::category::SUBMISSION,
            event.action = event::action::BATCH_ENQUEUED,
            event.result = event::result::SUCCESS,
            event.entity_type = event::entity_type::MASS_MESSAGE,
            event.entity_id = %message.id(),
            batch_count,
            "配信バッチを投入しました"
        );

        Ok(())
    }
}
