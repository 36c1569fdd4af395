//! # 配信サービスエラー定義
//!
//! 配信サービス固有のエラーと、HTTP レスポンスへの変換を定義する。
//!
//! 受付 API で利用者に見えるのは 422（検証エラー）と 500 のみ。
//! ワーカー内で発生したエラーはキューの再試行契約で処理され、
//! ここでの HTTP 変換は通らない。

use axum::{
   Json,
   http::StatusCode,
   response::{IntoResponse, Response},
};
use kairan_domain::DomainError;
use kairan_infra::InfraError;
use kairan_shared::ErrorResponse;
use thiserror::Error;

/// 配信サービスで発生するエラー
#[derive(Debug, Error)]
pub enum DeliveryError {
   /// 入力値の検証エラー
   #[error("入力値が不正です: {0}")]
   Validation(#[from] DomainError),

   /// 不正なリクエスト
   #[error("不正なリクエスト: {0}")]
   BadRequest(String),

   /// 未登録のグルーピング戦略
   ///
   /// カテゴリ設定が参照する戦略キーがレジストリに存在しない。
   /// 設定不整合であり、再試行しても解決しないため最終的に
   /// dead リストへ隔離される。
   #[error("未登録のグルーピング戦略です: {0}")]
   UnknownGroupingStrategy(String),

   /// インフラエラー
   #[error("インフラエラー: {0}")]
   Infra(#[from] InfraError),
}

impl IntoResponse for DeliveryError {
   fn into_response(self) -> Response {
      let (status, body) = match &self {
         DeliveryError::Validation(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::validation_error(e.to_string()),
         ),
         DeliveryError::BadRequest(msg) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::bad_request(msg.clone()),
         ),
         DeliveryError::UnknownGroupingStrategy(strategy) => {
            tracing::error!(
               error.category = "infrastructure",
               error.kind = "unknown_strategy",
               strategy = %strategy,
               "未登録のグルーピング戦略が指定されました"
            );
            (
               StatusCode::INTERNAL_SERVER_ERROR,
               ErrorResponse::internal_error(),
            )
         }
         DeliveryError::Infra(e) => {
            tracing::error!(
               error.category = "infrastructure",
               error.kind = "internal",
               "インフラエラー: {}",
               e
            );
            (
               StatusCode::INTERNAL_SERVER_ERROR,
               ErrorResponse::internal_error(),
            )
         }
      };

      (status, Json(body)).into_response()
   }
}
