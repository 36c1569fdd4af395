//! # キューワーカー
//!
//! 受付キュー・配信キューをポーリングし、アイテムを処理するワーカー。
//!
//! ## 再試行契約
//!
//! 処理に失敗したアイテムは試行回数を 1 増やしたペイロードで再投入し、
//! 上限に達したものは dead リストへ隔離する。復元できないペイロードは
//! 再試行しても無駄なので即座に隔離する。
//!
//! ## 停止
//!
//! シャットダウン信号を受け取ったワーカーは、処理中のアイテムを
//! 完了させてからループを抜ける。

use std::{sync::Arc, time::Duration};

use kairan_domain::dispatch::{DeliveryJob, SubmissionJob};
use kairan_infra::{
    InfraError,
    queue::{DELIVERY_QUEUE, DurableQueue, RetryDecision, SUBMISSION_QUEUE},
};
use kairan_shared::{event_log::event, log_business_event};
use tokio::{sync::watch, task::JoinHandle};

use crate::usecase::{DeliveryUseCase, SubmissionUseCase};

/// ワーカー設定
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// 受付キューのワーカー数
    pub submission_workers: usize,
    /// 配信キューのワーカー数
    pub delivery_workers:   usize,
    /// キューが空のときのポーリング間隔
    pub poll_interval:      Duration,
    /// キューアイテムの最大試行回数
    pub max_attempts:       u32,
}

/// 受付・配信の全ワーカーを起動する
pub fn spawn_workers(
    config: &WorkerConfig,
    queue: Arc<dyn DurableQueue>,
    submission: Arc<SubmissionUseCase>,
    delivery: Arc<DeliveryUseCase>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(config.submission_workers + config.delivery_workers);
    for worker_id in 0..config.submission_workers {
        handles.push(tokio::spawn(run_submission_worker(
            worker_id,
            Arc::clone(&queue),
            Arc::clone(&submission),
            config.poll_interval,
            config.max_attempts,
            shutdown.clone(),
        )));
    }
    for worker_id in 0..config.delivery_workers {
        handles.push(tokio::spawn(run_delivery_worker(
            worker_id,
            Arc::clone(&queue),
            Arc::clone(&delivery),
            config.poll_interval,
            config.max_attempts,
            shutdown.clone(),
        )));
    }
    handles
}

/// 受付キューワーカーのメインループ
async fn run_submission_worker(
    worker_id: usize,
    queue: Arc<dyn DurableQueue>,
    usecase: Arc<SubmissionUseCase>,
    poll_interval: Duration,
    max_attempts: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(worker_id, queue = SUBMISSION_QUEUE, "ワーカーを起動しました");
    loop {
        if *shutdown.borrow() {
            break;
        }
        match poll_submission_once(queue.as_ref(), &usecase, max_attempts).await {
            Ok(true) => {}
            Ok(false) => wait_for_next_poll(poll_interval, &mut shutdown).await,
            Err(e) => {
                tracing::error!(
                    error.category = "infrastructure",
                    error.kind = "queue",
                    worker_id,
                    "キュー操作に失敗しました: {}",
                    e
                );
                wait_for_next_poll(poll_interval, &mut shutdown).await;
            }
        }
    }
    tracing::info!(worker_id, queue = SUBMISSION_QUEUE, "ワーカーを停止しました");
}

/// 配信キューワーカーのメインループ
async fn run_delivery_worker(
    worker_id: usize,
    queue: Arc<dyn DurableQueue>,
    usecase: Arc<DeliveryUseCase>,
    poll_interval: Duration,
    max_attempts: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(worker_id, queue = DELIVERY_QUEUE, "ワーカーを起動しました");
    loop {
        if *shutdown.borrow() {
            break;
        }
        match poll_delivery_once(queue.as_ref(), &usecase, max_attempts).await {
            Ok(true) => {}
            Ok(false) => wait_for_next_poll(poll_interval, &mut shutdown).await,
            Err(e) => {
                tracing::error!(
                    error.category = "infrastructure",
                    error.kind = "queue",
                    worker_id,
                    "キュー操作に失敗しました: {}",
                    e
                );
                wait_for_next_poll(poll_interval, &mut shutdown).await;
            }
        }
    }
    tracing::info!(worker_id, queue = DELIVERY_QUEUE, "ワーカーを停止しました");
}

/// 受付キューからアイテムを 1 件処理する
///
/// アイテムがなければ `Ok(false)` を返す。処理の失敗は再試行契約に
/// 従って内部で解決し、キュー操作自体の失敗のみエラーとして返す。
pub async fn poll_submission_once(
    queue: &dyn DurableQueue,
    usecase: &SubmissionUseCase,
    max_attempts: u32,
) -> Result<bool, InfraError> {
    let Some(item) = queue.claim_next(SUBMISSION_QUEUE).await? else {
        return Ok(false);
    };

    let job: SubmissionJob = match serde_json::from_str(item.payload()) {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(
                error.category = "infrastructure",
                error.kind = "serialization",
                "受付キューアイテムを復元できないため隔離します: {}",
                e
            );
            let decision = queue
                .retry_or_bury(&item, item.payload(), max_attempts, max_attempts)
                .await?;
            log_retry_decision(decision, SUBMISSION_QUEUE, max_attempts, max_attempts);
            return Ok(true);
        }
    };

    match usecase.process(&job).await {
        Ok(()) => queue.delete(&item).await?,
        Err(e) => {
            tracing::error!(
                message_id = %job.message().id(),
                error = %e,
                "受付キューアイテムの処理に失敗しました"
            );
            let retry = job.with_next_attempt();
            let retry_payload = serde_json::to_string(&retry)?;
            let decision = queue
                .retry_or_bury(&item, &retry_payload, retry.attempt(), max_attempts)
                .await?;
            log_retry_decision(decision, SUBMISSION_QUEUE, retry.attempt(), max_attempts);
        }
    }
    Ok(true)
}

/// 配信キューからアイテムを 1 件処理する
///
/// アイテムがなければ `Ok(false)` を返す。処理の失敗は再試行契約に
/// 従って内部で解決し、キュー操作自体の失敗のみエラーとして返す。
pub async fn poll_delivery_once(
    queue: &dyn DurableQueue,
    usecase: &DeliveryUseCase,
    max_attempts: u32,
) -> Result<bool, InfraError> {
    let Some(item) = queue.claim_next(DELIVERY_QUEUE).await? else {
        return Ok(false);
    };

    let job: DeliveryJob = match serde_json::from_str(item.payload()) {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(
                error.category = "infrastructure",
                error.kind = "serialization",
                "配信キューアイテムを復元できないため隔離します: {}",
                e
            );
            let decision = queue
                .retry_or_bury(&item, item.payload(), max_attempts, max_attempts)
                .await?;
            log_retry_decision(decision, DELIVERY_QUEUE, max_attempts, max_attempts);
            return Ok(true);
        }
    };

    match usecase.process(&job).await {
        Ok(()) => queue.delete(&item).await?,
        Err(e) => {
            tracing::error!(
                message_id = %job.message().id(),
                error = %e,
                "配信キューアイテムの処理に失敗しました"
            );
            let retry = job.with_next_attempt();
            let retry_payload = serde_json::to_string(&retry)?;
            let decision = queue
                .retry_or_bury(&item, &retry_payload, retry.attempt(), max_attempts)
                .await?;
            log_retry_decision(decision, DELIVERY_QUEUE, retry.attempt(), max_attempts);
        }
    }
    Ok(true)
}

/// 次のポーリングまで待機する（シャットダウン信号で即座に戻る）
async fn wait_for_next_poll(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        () = tokio::time::sleep(poll_interval) => {}
        _ = shutdown.changed() => {}
    }
}

/// 再試行判断の結果を業務イベントとして記録する
fn log_retry_decision(
    decision: RetryDecision,
    queue_name: &str,
    attempt: u32,
    max_attempts: u32,
) {
    let category = if queue_name == SUBMISSION_QUEUE {
        event::category::SUBMISSION
    } else {
        event::category::DELIVERY
    };
    match decision {
        RetryDecision::Retried => log_business_event!(
            event.category = category,
            event.action = event::action::JOB_RETRIED,
            event.result = event::result::FAILURE,
            queue = queue_name,
            attempt,
            max_attempts,
            "処理失敗のため再試行します"
        ),
        RetryDecision::Buried => log_business_event!(
            event.category = category,
            event.action = event::action::JOB_BURIED,
            event.result = event::result::FAILURE,
            queue = queue_name,
            attempt,
            max_attempts,
            "試行上限に達したため dead リストへ隔離しました"
        ),
    }
}
