//! # ヘルスチェックハンドラ
//!
//! 配信サービスの稼働状態を確認するためのエンドポイント。
//!
//! - `/health` — Liveness Check（常に `"healthy"` を返す）
//! - `/health/ready` — Readiness Check（DB / キューの接続状態を確認）
//!
//! レスポンス型は [`kairan_shared::HealthResponse`] /
//! [`kairan_shared::ReadinessResponse`] を参照。

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use kairan_infra::queue::RedisQueue;
use kairan_shared::{CheckStatus, HealthResponse, ReadinessResponse, ReadinessStatus};
use sqlx::PgPool;

/// 配信サービスのヘルスチェックエンドポイント
pub async fn health_check() -> Json<HealthResponse> {
   Json(HealthResponse {
      status:  "healthy".to_string(),
      version: env!("CARGO_PKG_VERSION").to_string(),
   })
}

/// Readiness Check 用の State
pub struct ReadinessState {
   pub pool:  PgPool,
   pub queue: RedisQueue,
}

/// 配信サービスの Readiness Check エンドポイント
///
/// PostgreSQL と Redis（キュー）の接続状態を並行チェックする。
/// 全チェック OK → 200、1 つでも失敗 → 503。
#[tracing::instrument(skip_all)]
pub async fn readiness_check(State(state): State<Arc<ReadinessState>>) -> impl IntoResponse {
   let (database_result, queue_result) =
      tokio::join!(check_database(&state.pool), check_queue(&state.queue));

   let mut checks = HashMap::new();
   checks.insert("database".to_string(), database_result);
   checks.insert("queue".to_string(), queue_result);

   let all_ok = checks.values().all(|s| matches!(s, CheckStatus::Ok));
   let status = if all_ok {
      ReadinessStatus::Ready
   } else {
      ReadinessStatus::NotReady
   };
   let http_status = if all_ok {
      StatusCode::OK
   } else {
      StatusCode::SERVICE_UNAVAILABLE
   };

   (http_status, Json(ReadinessResponse { status, checks }))
}

/// PostgreSQL への接続を確認する（タイムアウト: 5 秒）
async fn check_database(pool: &PgPool) -> CheckStatus {
   match tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(pool)).await
   {
      Ok(Ok(_)) => CheckStatus::Ok,
      Ok(Err(e)) => {
         tracing::warn!(error = %e, "readiness check: database query failed");
         CheckStatus::Error
      }
      Err(_) => {
         tracing::warn!("readiness check: database check timed out");
         CheckStatus::Error
      }
   }
}

/// Redis キューへの接続を PING で確認する（タイムアウト: 5 秒）
async fn check_queue(queue: &RedisQueue) -> CheckStatus {
   match tokio::time::timeout(Duration::from_secs(5), queue.ping()).await {
      Ok(Ok(())) => CheckStatus::Ok,
      Ok(Err(e)) => {
         tracing::warn!(error = %e, "readiness check: queue ping failed");
         CheckStatus::Error
      }
      Err(_) => {
         tracing::warn!("readiness check: queue check timed out");
         CheckStatus::Error
      }
   }
}
