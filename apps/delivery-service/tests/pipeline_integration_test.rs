//! 配信パイプラインの統合テスト
//!
//! PipelineTestBuilder で受付〜配信の全段を結線し、受付キュー・
//! 配信キュー・メール送信の横断的な整合性を検証する。
//! ワーカーの実行経路（`poll_*_once`）をそのまま通すため、
//! 再試行契約と dead リスト隔離もここで検証する。

use std::collections::HashSet;

use kairan_delivery_service::{
    test_utils::{PipelineSetup, PipelineTestBuilder},
    usecase::SubmissionInput,
};
use kairan_domain::{
    category::{CategoryId, Conjunction},
    dispatch::{DeliveryJob, SubmissionJob},
    message::{BodyFormat, MessageBody, Subject},
    recipient::AccountStatus,
};
use kairan_infra::queue::{DELIVERY_QUEUE, DurableQueue as _, SUBMISSION_QUEUE};
use pretty_assertions::assert_eq;

// --- テストヘルパー ---

fn make_input(categories: Vec<CategoryId>) -> SubmissionInput {
    SubmissionInput {
        subject:      Subject::new("お知らせ").unwrap(),
        body:         MessageBody::new("本文", BodyFormat::PlainText).unwrap(),
        categories,
        sender_name:  None,
        sender_email: None,
    }
}

/// 受付キュー・配信キューが安定するまで処理する
///
/// 再試行で積み直されたアイテムも、完了または dead リスト隔離まで処理される。
async fn drain_pipeline(setup: &PipelineSetup) {
    while setup.run_submission_once().await.unwrap() {}
    while setup.run_delivery_once().await.unwrap() {}
}

// --- バッチ分割と送信回数 ---

#[tokio::test]
async fn test_個別送信_409名はバッチ9件に分割され409通送信される() {
    // Arrange
    let setup = PipelineTestBuilder::new().with_use_bcc(false).build();
    let category_id = setup.seed_category("general", &["member"]);
    for i in 0..409 {
        setup.seed_active_account(&format!("member{i:03}@example.com"), &["member"]);
    }

    // Act: 受付キューのみ処理し、バッチ分割の結果を観察する
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    while setup.run_submission_once().await.unwrap() {}

    // Assert: ceil(409 / 50) = 9 バッチ（50 × 8 + 9 × 1）
    let pending = setup.queue.pending_items(DELIVERY_QUEUE);
    assert_eq!(pending.len(), 9);
    let mut sizes: Vec<usize> = pending
        .iter()
        .map(|payload| {
            let job: DeliveryJob = serde_json::from_str(payload).unwrap();
            job.batch().len()
        })
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, [9, 50, 50, 50, 50, 50, 50, 50, 50]);

    // Act: 配信キューを処理する
    while setup.run_delivery_once().await.unwrap() {}

    // Assert: 宛先ごとに 1 通、取りこぼしも重複もない
    assert_eq!(setup.transport.sent_count(), 409);
    let unique_to: HashSet<String> = setup
        .transport
        .sent()
        .iter()
        .map(|mail| mail.to[0].clone())
        .collect();
    assert_eq!(unique_to.len(), 409);
    assert!(setup.transport.sent().iter().all(|mail| mail.bcc.is_empty()));
    assert_eq!(setup.queue.processing_len(DELIVERY_QUEUE), 0);
}

#[tokio::test]
async fn test_bcc送信_バッチごとに1通でtoは送信者自身になる() {
    // Arrange
    let setup = PipelineTestBuilder::new().build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);
    setup.seed_active_account("b@example.com", &["member"]);
    setup.seed_active_account("c@example.com", &["member"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert: バッチ全体で 1 通。宛先は BCC に、To は送信者自身
    assert_eq!(setup.transport.sent_count(), 1);
    let mail = &setup.transport.sent()[0];
    assert_eq!(mail.to, ["sender@example.com"]);
    assert_eq!(mail.bcc.len(), 3);
    for address in ["a@example.com", "b@example.com", "c@example.com"] {
        assert!(mail.bcc.contains(&address.to_string()));
    }
}

// --- 配信直前の在籍確認 ---

#[tokio::test]
async fn test_配信直前に無効化された宛先は除外される() {
    // Arrange: 42 名を解決した後、1 名が配信前に退会する
    let setup = PipelineTestBuilder::new().build();
    let category_id = setup.seed_category("general", &["member"]);
    let mut leaver = None;
    for i in 0..42 {
        let id = setup.seed_active_account(&format!("member{i:02}@example.com"), &["member"]);
        if i == 7 {
            leaver = Some(id);
        }
    }

    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    while setup.run_submission_once().await.unwrap() {}
    setup
        .directory
        .set_status(&leaver.unwrap(), AccountStatus::Deleted);

    // Act
    while setup.run_delivery_once().await.unwrap() {}

    // Assert: バッチは 1 件のまま、実効宛先は 41 名
    assert_eq!(setup.transport.sent_count(), 1);
    let mail = &setup.transport.sent()[0];
    assert_eq!(mail.bcc.len(), 41);
    assert!(!mail.bcc.contains(&"member07@example.com".to_string()));
}

// --- 宛先 0 件 ---

#[tokio::test]
async fn test_宛先解決が0件なら通知のみで配信キューに積まれない() {
    // Arrange: 誰も所属しないロールを対象にする
    let setup = PipelineTestBuilder::new().build();
    let category_id = setup.seed_category("general", &["ghost"]);
    setup.seed_active_account("a@example.com", &["member"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert: 送信者本人への通知 1 通のみ
    assert_eq!(setup.transport.sent_count(), 1);
    let notice = &setup.transport.sent()[0];
    assert_eq!(notice.to, ["sender@example.com"]);
    assert!(notice.bcc.is_empty());
    assert!(notice.subject.starts_with("【宛先なし】"));
    assert!(setup.queue.pending_items(DELIVERY_QUEUE).is_empty());
    assert!(setup.queue.dead_items(SUBMISSION_QUEUE).is_empty());
}

// --- 重複排除と配信停止 ---

#[tokio::test]
async fn test_複数カテゴリに該当する宛先も1回だけ配信される() {
    // Arrange: 両カテゴリに該当するアカウント
    let setup = PipelineTestBuilder::new().build();
    let sales = setup.seed_category("sales_news", &["sales"]);
    let support = setup.seed_category("support_news", &["support"]);
    setup.seed_active_account("both@example.com", &["sales", "support"]);
    setup.seed_active_account("sales-only@example.com", &["sales"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![sales, support]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert: BCC に both@example.com は 1 回だけ現れる
    assert_eq!(setup.transport.sent_count(), 1);
    let mail = &setup.transport.sent()[0];
    assert_eq!(mail.bcc.len(), 2);
    let both_count = mail
        .bcc
        .iter()
        .filter(|address| *address == "both@example.com")
        .count();
    assert_eq!(both_count, 1);
}

#[tokio::test]
async fn test_配信停止はカテゴリ横断の和集合で除外される() {
    // Arrange: b は片方のカテゴリのみ停止、c は全体停止
    let setup = PipelineTestBuilder::new().build();
    let news = setup.seed_category("news", &["member"]);
    let events = setup.seed_category("events", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);
    let b = setup.seed_active_account("b@example.com", &["member"]);
    let c = setup.seed_active_account("c@example.com", &["member"]);
    setup.opt_out.add_category_opt_out(news.clone(), b);
    setup.opt_out.add_global_opt_out(c);

    // Act: news と events の両方を対象にする
    setup
        .submission
        .submit(make_input(vec![news, events]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert: 対象カテゴリのいずれかを停止した b も、全体停止の c も届かない
    assert_eq!(setup.transport.sent_count(), 1);
    let mail = &setup.transport.sent()[0];
    assert_eq!(mail.bcc, ["a@example.com"]);
}

#[tokio::test]
async fn test_all結合のカテゴリは全ロール保持者のみ解決する() {
    // Arrange
    let setup = PipelineTestBuilder::new().build();
    let category_id = setup.seed_category_with("managers", Conjunction::All, &["sales", "manager"]);
    setup.seed_active_account("lead@example.com", &["sales", "manager"]);
    setup.seed_active_account("rep@example.com", &["sales"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert
    assert_eq!(setup.transport.sent_count(), 1);
    assert_eq!(setup.transport.sent()[0].bcc, ["lead@example.com"]);
}

// --- 本人控え ---

#[tokio::test]
async fn test_本人控えが宛先外なら合成レコードとして追加される() {
    // Arrange
    let setup = PipelineTestBuilder::new()
        .with_self_copy("archive@example.com")
        .build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);
    setup.seed_active_account("b@example.com", &["member"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert
    let mail = &setup.transport.sent()[0];
    assert_eq!(mail.bcc.len(), 3);
    assert!(mail.bcc.contains(&"archive@example.com".to_string()));
}

#[tokio::test]
async fn test_本人控えが既に宛先に含まれるなら追加されない() {
    // Arrange: 控えのアドレスが解決済み宛先と一致する
    let setup = PipelineTestBuilder::new()
        .with_self_copy("a@example.com")
        .build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);
    setup.seed_active_account("b@example.com", &["member"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert: 重複追加されない
    let mail = &setup.transport.sent()[0];
    assert_eq!(mail.bcc.len(), 2);
}

// --- 控えの保存 ---

#[tokio::test]
async fn test_控えは再配信されてもメッセージにつき1件だけ保存される() {
    // Arrange
    let setup = PipelineTestBuilder::new()
        .with_create_archive_copy(true)
        .build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);

    let message_id = setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    let payload = setup.queue.pending_items(SUBMISSION_QUEUE)[0].clone();

    // Act: 同じ受付アイテムが二重配信されたケースを再現する
    while setup.run_submission_once().await.unwrap() {}
    setup
        .queue
        .enqueue(SUBMISSION_QUEUE, &payload)
        .await
        .unwrap();
    while setup.run_submission_once().await.unwrap() {}

    // Assert: 控えは 1 件のみ
    let stored = setup.archive.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message_id, message_id);
}

#[tokio::test]
async fn test_控えの保存が無効なら何も保存されない() {
    // Arrange
    let setup = PipelineTestBuilder::new().build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert
    assert!(setup.archive.stored().is_empty());
}

// --- 再試行契約 ---

#[tokio::test]
async fn test_未知のグルーピング方式は再試行の後に隔離される() {
    // Arrange: レジストリにない方式キーを参照するカテゴリ
    let setup = PipelineTestBuilder::new().build();
    let category_id =
        setup.seed_category_with_strategy("misconfigured", "ldap", Conjunction::Any, &["staff"]);
    setup.seed_active_account("a@example.com", &["member"]);

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    while setup.run_submission_once().await.unwrap() {}

    // Assert: 試行上限（3 回）まで再試行され、dead リストへ隔離される
    assert!(setup.queue.pending_items(SUBMISSION_QUEUE).is_empty());
    let dead = setup.queue.dead_items(SUBMISSION_QUEUE);
    assert_eq!(dead.len(), 1);
    let buried: SubmissionJob = serde_json::from_str(&dead[0]).unwrap();
    assert_eq!(buried.attempt(), 2);
    assert_eq!(setup.transport.sent_count(), 0);
    assert!(setup.queue.pending_items(DELIVERY_QUEUE).is_empty());
}

#[tokio::test]
async fn test_個別送信で1宛先の失敗は他の宛先への配信を妨げない() {
    // Arrange
    let setup = PipelineTestBuilder::new().with_use_bcc(false).build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);
    setup.seed_active_account("broken@example.com", &["member"]);
    setup.seed_active_account("c@example.com", &["member"]);
    setup.transport.fail_for("broken@example.com");

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert: 失敗した宛先以外へは届き、バッチは再試行されない
    assert_eq!(setup.transport.sent_count(), 2);
    assert!(setup.queue.pending_items(DELIVERY_QUEUE).is_empty());
    assert!(setup.queue.dead_items(DELIVERY_QUEUE).is_empty());
}

#[tokio::test]
async fn test_bcc一括送信の失敗はバッチ再試行の後に隔離される() {
    // Arrange: BCC 一括はバッチ全体で 1 回の送信なので、失敗はバッチ単位
    let setup = PipelineTestBuilder::new().build();
    let category_id = setup.seed_category("general", &["member"]);
    setup.seed_active_account("a@example.com", &["member"]);
    setup.seed_active_account("broken@example.com", &["member"]);
    setup.transport.fail_for("broken@example.com");

    // Act
    setup
        .submission
        .submit(make_input(vec![category_id]))
        .await
        .unwrap();
    drain_pipeline(&setup).await;

    // Assert
    assert_eq!(setup.transport.sent_count(), 0);
    let dead = setup.queue.dead_items(DELIVERY_QUEUE);
    assert_eq!(dead.len(), 1);
    let buried: DeliveryJob = serde_json::from_str(&dead[0]).unwrap();
    assert_eq!(buried.attempt(), 2);
}

#[tokio::test]
async fn test_復元できない受付アイテムは即座に隔離される() {
    // Arrange
    let setup = PipelineTestBuilder::new().build();
    setup
        .queue
        .enqueue(SUBMISSION_QUEUE, "{ broken json")
        .await
        .unwrap();

    // Act
    while setup.run_submission_once().await.unwrap() {}

    // Assert: 再試行せず隔離される
    assert!(setup.queue.pending_items(SUBMISSION_QUEUE).is_empty());
    assert_eq!(setup.queue.dead_items(SUBMISSION_QUEUE), ["{ broken json"]);
}
