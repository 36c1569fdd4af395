//! # 配信処理
//!
//! 配信キューアイテム（1 バッチ）の処理を担う。
//!
//! ## 宛先モード
//!
//! - BCC 一括: バッチ全体で 1 通。To は送信者自身、宛先は BCC に格納
//! - 個別送信: 有効な宛先ごとに 1 通。宛先ごとのロケールを使用
//!
//! ## 配信直前の在籍確認
//!
//! キュー滞留中に無効化されたアカウントを送信直前にもう一度除外する。
//! ディレクトリに存在しないレコード（本人控えの合成レコード）は
//! 確認のしようがないため、そのまま配信対象に残す。
//!
//! ## 障害分離
//!
//! 個別送信での宛先単位の送信失敗は記録して継続し、残りの宛先への
//! 配信を妨げない。バウンス増幅を避けるため宛先単位の再送も行わない。
//! バッチ単位の失敗（BCC 送信の失敗など）はエラーとして返し、キューの
//! 再試行契約に委ねる。

use std::{collections::HashSet, sync::Arc};

use kairan_domain::{
    dispatch::DeliveryJob,
    outbound::OutboundEmail,
    recipient::{AccountId, Locale, RecipientRecord},
};
use kairan_infra::{InfraError, mailer::MailTransport, repository::AccountDirectory};
use kairan_shared::{event_log::event, log_business_event};

use crate::{
    error::DeliveryError,
    usecase::composer::{self, AddressMode, ComposedMessage},
};

/// 配信ユースケース
pub struct DeliveryUseCase {
    directory: Arc<dyn AccountDirectory>,
    transport: Arc<dyn MailTransport>,
}

impl DeliveryUseCase {
    pub fn new(directory: Arc<dyn AccountDirectory>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            directory,
            transport,
        }
    }

    /// 配信キューアイテムを処理する
    pub async fn process(&self, job: &DeliveryJob) -> Result<(), DeliveryError> {
        let composed = composer::compose(job.message(), job.options());
        let live = self.verify_recipients(job).await?;

        match composed.address_mode {
            AddressMode::Bcc => self.deliver_bcc(job, &composed, &live).await,
            AddressMode::Direct => self.deliver_direct(job, &composed, &live).await,
        }
    }

    /// 配信直前の在籍確認を行い、有効な宛先だけを残す
    ///
    /// ディレクトリが無効と答えたアカウントのみ除外する。
    /// ディレクトリに現れないレコードは合成レコードとして残す。
    async fn verify_recipients<'a>(
        &self,
        job: &'a DeliveryJob,
    ) -> Result<Vec<&'a RecipientRecord>, DeliveryError> {
        let ids: Vec<AccountId> = job
            .batch()
            .records()
            .iter()
            .map(|r| r.account_id().clone())
            .collect();
        let inactive: HashSet<AccountId> = self
            .directory
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|profile| !profile.is_active())
            .map(|profile| profile.id().clone())
            .collect();

        let mut live = Vec::with_capacity(job.batch().len());
        for record in job.batch().records() {
            if inactive.contains(record.account_id()) {
                tracing::debug!(
                    event.action = event::action::RECIPIENT_SKIPPED,
                    account_id = %record.account_id(),
                    message_id = %job.message().id(),
                    "配信時の在籍確認で無効なアカウントを除外しました"
                );
            } else {
                live.push(record);
            }
        }
        Ok(live)
    }

    /// BCC 一括配信（バッチ全体で 1 回の送信）
    async fn deliver_bcc(
        &self,
        job: &DeliveryJob,
        composed: &ComposedMessage,
        live: &[&RecipientRecord],
    ) -> Result<(), DeliveryError> {
        if live.is_empty() {
            tracing::debug!(
                message_id = %job.message().id(),
                "有効な宛先が残っていないため送信を省略します"
            );
            return Ok(());
        }

        let options = job.options();
        let email = OutboundEmail {
            from_name:    Some(options.sender_name().as_str().to_string()),
            from_address: options.sender_email().as_str().to_string(),
            to:           vec![options.sender_email().as_str().to_string()],
            bcc:          live.iter().map(|r| r.email().as_str().to_string()).collect(),
            subject:      composed.subject.clone(),
            body:         composed.body.clone(),
            format:       job.message().body().format(),
            locale:       Locale::default(),
        };
        self.transport
            .send(&email)
            .await
            .map_err(|e| InfraError::mail(e.to_string()))?;

        log_business_event!(
            event.category = event::category::DELIVERY,
            event.action = event::action::BATCH_DELIVERED,
            event.result = event::result::SUCCESS,
            event.entity_type = event::entity_type::DELIVERY_BATCH,
            message_id = %job.message().id(),
            recipient_count = live.len(),
            skipped = job.batch().len() - live.len(),
            "バッチを BCC 一括で配信しました"
        );
        Ok(())
    }

    /// 個別配信（有効な宛先ごとに 1 回の送信）
    async fn deliver_direct(
        &self,
        job: &DeliveryJob,
        composed: &ComposedMessage,
        live: &[&RecipientRecord],
    ) -> Result<(), DeliveryError> {
        let options = job.options();
        let mut delivered = 0_usize;
        let mut failed = 0_usize;

        for record in live {
            let email = OutboundEmail {
                from_name:    Some(options.sender_name().as_str().to_string()),
                from_address: options.sender_email().as_str().to_string(),
                to:           vec![record.email().as_str().to_string()],
                bcc:          Vec::new(),
                subject:      composed.subject.clone(),
                body:         composed.body.clone(),
                format:       job.message().body().format(),
                locale:       record.locale().clone(),
            };
            match self.transport.send(&email).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        account_id = %record.account_id(),
                        error = %e,
                        "宛先への送信に失敗したためスキップします"
                    );
                    log_business_event!(
                        event.category = event::category::DELIVERY,
                        event.action = event::action::DELIVERY_FAILED,
                        event.result = event::result::FAILURE,
                        event.entity_type = event::entity_type::RECIPIENT,
                        account_id = %record.account_id(),
                        message_id = %job.message().id(),
                        "宛先単位の送信失敗を記録しました"
                    );
                }
            }
        }

        log_business_event!(
            event.category = event::category::DELIVERY,
            event.action = event::action::BATCH_DELIVERED,
            event.result = event::result::SUCCESS,
            event.entity_type = event::entity_type::DELIVERY_BATCH,
            message_id = %job.message().id(),
            delivered,
            failed,
            skipped = job.batch().len() - live.len(),
            "バッチの個別配信が完了しました"
        );
        Ok(())
    }
}
