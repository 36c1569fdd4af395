//! # 配信サービスサーバー
//!
//! 一斉送信メッセージの受付 API とキューワーカーを起動する。
//!
//! ## 役割
//!
//! 配信サービスは 1 プロセスで以下の責務を担う:
//!
//! - **受付 API**: 内部 API としてメッセージを受け付け、受付キューに積む
//! - **受付ワーカー**: 宛先解決とバッチ分割を行い、配信キューに積む
//! - **配信ワーカー**: バッチ単位でメールを組み立てて送信する
//!
//! ## アーキテクチャ
//!
//! ```text
//! POST /internal/mass-messages
//!        │
//!        ▼
//! ┌──────────────┐      ┌──────────────┐
//! │  受付キュー  │─────▶│ 受付ワーカー │ 宛先解決・バッチ分割
//! │   (Redis)    │      └──────┬───────┘
//! └──────────────┘             │
//! ┌──────────────┐      ┌──────▼───────┐
//! │  配信キュー  │─────▶│ 配信ワーカー │──▶ SMTP / SES
//! │   (Redis)    │      └──────────────┘
//! └──────────────┘
//! ```
//!
//! ## 環境変数
//!
//! 主要な変数のみ記載する。省略可能な変数の既定値は [`config`] モジュールを参照。
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `DELIVERY_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `DELIVERY_PORT` | **Yes** | ポート番号 |
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `REDIS_URL` | **Yes** | Redis 接続 URL |
//! | `DEFAULT_SENDER_EMAIL` | **Yes** | 既定の送信者アドレス |
//! | `MAIL_BACKEND` | No | 送信バックエンド `smtp` / `ses` / `noop`（デフォルト: `noop`） |
//! | `BATCH_SIZE` | No | 1 バッチあたりの宛先数上限（デフォルト: 50） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（.env ファイルを使用、Mailpit へ SMTP 送信）
//! cargo run -p kairan-delivery-service
//!
//! # 本番環境（環境変数を直接指定）
//! DELIVERY_PORT=3000 MAIL_BACKEND=ses cargo run -p kairan-delivery-service --release
//! ```

mod config;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use config::DeliveryConfig;
use kairan_delivery_service::{
    handler::{MessageState, ReadinessState, health_check, readiness_check, submit_mass_message},
    usecase::{AudienceResolver, DeliveryUseCase, SendDefaults, SubmissionUseCase},
    worker::{self, WorkerConfig},
};
use kairan_domain::{clock::SystemClock, message::SenderName, recipient::Email};
use kairan_infra::{
    db,
    grouping::GroupingRegistry,
    mailer::{MailTransport, NoopMailer, SesMailer, SmtpMailer},
    queue::{DurableQueue, RedisQueue},
    repository::{
        PostgresAccountDirectory,
        PostgresArchiveRepository,
        PostgresCategoryRepository,
        PostgresOptOutProvider,
    },
};
use kairan_shared::observability::TracingConfig;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;

/// 配信サービスのエントリーポイント
///
/// 以下の順序で初期化を行う:
///
/// 1. 環境変数の読み込み（.env ファイル）
/// 2. トレーシングの初期化
/// 3. アプリケーション設定の読み込み
/// 4. DB / Redis への接続とマイグレーション
/// 5. キューワーカーの起動
/// 6. HTTP サーバーの起動
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    // 本番環境では .env ファイルは使用せず、環境変数を直接設定する
    dotenvy::dotenv().ok();

    // トレーシング初期化
    let tracing_config = TracingConfig::from_env("delivery-service");
    kairan_shared::observability::init_tracing(tracing_config);
    let _tracing_guard = tracing::info_span!("app", service = "delivery-service").entered();

    // 設定読み込み
    let config = DeliveryConfig::from_env().expect("設定の読み込みに失敗しました");

    tracing::info!(
        "配信サービスを起動します: {}:{}",
        config.host,
        config.port
    );

    // データベース接続プールを作成
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("データベース接続に失敗しました");
    tracing::info!("データベースに接続しました");

    // マイグレーション実行
    db::run_migrations(&pool)
        .await
        .expect("マイグレーションの実行に失敗しました");
    tracing::info!("マイグレーションを適用しました");

    // 受付・配信キュー（Redis）
    let redis_queue = RedisQueue::new(&config.redis_url)
        .await
        .expect("Redis への接続に失敗しました");
    tracing::info!("Redis に接続しました");

    // Readiness Check 用 State（pool / queue が move される前に clone）
    let readiness_state = Arc::new(ReadinessState {
        pool:  pool.clone(),
        queue: redis_queue.clone(),
    });

    // メール送信バックエンド
    let transport: Arc<dyn MailTransport> = match config.mailer.backend.as_str() {
        "smtp" => {
            tracing::info!(
                host = %config.mailer.smtp_host,
                port = config.mailer.smtp_port,
                "SMTP バックエンドでメールを送信します"
            );
            Arc::new(SmtpMailer::new(
                &config.mailer.smtp_host,
                config.mailer.smtp_port,
            ))
        }
        "ses" => {
            tracing::info!("SES バックエンドでメールを送信します");
            let aws_config =
                aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Arc::new(SesMailer::new(aws_sdk_sesv2::Client::new(&aws_config)))
        }
        "noop" => {
            tracing::warn!("Noop バックエンドが有効です（メールは送信されません）");
            Arc::new(NoopMailer)
        }
        other => panic!("MAIL_BACKEND が不正です: {other}（smtp | ses | noop のいずれか）"),
    };

    // 依存コンポーネントを初期化
    let queue: Arc<dyn DurableQueue> = Arc::new(redis_queue);
    let registry = Arc::new(GroupingRegistry::with_role_grouping(pool.clone()));
    let audience = AudienceResolver::new(
        Arc::new(PostgresCategoryRepository::new(pool.clone())),
        registry,
        Arc::new(PostgresOptOutProvider::new(pool.clone())),
        Arc::new(PostgresAccountDirectory::new(pool.clone())),
    );
    let archive = Arc::new(PostgresArchiveRepository::new(pool.clone()));
    let directory = Arc::new(PostgresAccountDirectory::new(pool));

    // 送信時設定の既定値（不正な値は起動時に落とす）
    let defaults = SendDefaults {
        use_bcc:             config.send.use_bcc,
        sender_name:         SenderName::new(config.send.default_sender_name.clone())
            .expect("DEFAULT_SENDER_NAME が不正です"),
        sender_email:        Email::new(config.send.default_sender_email.clone())
            .expect("DEFAULT_SENDER_EMAIL が不正です"),
        create_archive_copy: config.send.create_archive_copy,
        self_copy:           config
            .send
            .self_copy_email
            .clone()
            .map(Email::new)
            .transpose()
            .expect("SELF_COPY_EMAIL が不正です"),
        body_prefix:         config.send.body_prefix.clone(),
        body_suffix:         config.send.body_suffix.clone(),
        opt_out_policy:      config.send.opt_out_policy,
    };

    let submission = Arc::new(SubmissionUseCase::new(
        Arc::clone(&queue),
        audience,
        archive,
        Arc::clone(&transport),
        Arc::new(SystemClock),
        defaults,
        config.batch_size,
    ));
    let delivery = Arc::new(DeliveryUseCase::new(directory, transport));

    // キューワーカーを起動（watch チャンネルで停止を通知する）
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_config = WorkerConfig {
        submission_workers: config.submission_workers,
        delivery_workers:   config.delivery_workers,
        poll_interval:      Duration::from_millis(config.poll_interval_ms),
        max_attempts:       config.max_attempts,
    };
    let worker_handles = worker::spawn_workers(
        &worker_config,
        Arc::clone(&queue),
        Arc::clone(&submission),
        delivery,
        shutdown_rx,
    );

    // ルーター構築
    let message_state = Arc::new(MessageState {
        usecase: submission,
    });
    let app = Router::new()
        .route("/internal/mass-messages", post(submit_mass_message))
        .with_state(message_state)
        .route("/health", get(health_check))
        .merge(
            Router::new()
                .route("/health/ready", get(readiness_check))
                .with_state(readiness_state),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("アドレスのパースに失敗しました");

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("配信サービスが起動しました: {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP サーバー停止後、処理中のアイテムを完了させてからワーカーを止める
    tracing::info!("ワーカーの停止を待っています");
    shutdown_tx.send(true).ok();
    for handle in worker_handles {
        handle.await.ok();
    }
    tracing::info!("配信サービスを停止しました");

    Ok(())
}

/// SIGINT（Ctrl+C）を受け取るまで待機する
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("シグナルハンドラの登録に失敗しました");
}
