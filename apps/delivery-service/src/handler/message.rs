//! # 一斉送信メッセージハンドラ
//!
//! 一斉送信メッセージの受付内部 API を提供する。
//!
//! ## エンドポイント
//!
//! - `POST /internal/mass-messages` - メッセージ受付（202 Accepted）
//!
//! 受付は検証とキュー投入のみで完了する。宛先解決と配信はワーカーが
//! 非同期に行うため、レスポンスは配信の成否を保証しない。

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use kairan_domain::{
   category::CategoryId,
   message::{BodyFormat, MessageBody, SenderName, Subject},
   recipient::Email,
};
use kairan_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
   error::DeliveryError,
   usecase::{SubmissionInput, SubmissionUseCase},
};

/// メッセージ受付 API の共有状態
pub struct MessageState {
   pub usecase: Arc<SubmissionUseCase>,
}

// --- リクエスト/レスポンス型 ---

/// メッセージ受付リクエスト
#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
   pub subject:      String,
   pub body:         String,
   /// 本文形式（省略時は plain_text）
   pub format:       Option<BodyFormat>,
   pub category_ids: Vec<String>,
   /// 送信者名（省略時は設定の既定値）
   pub sender_name:  Option<String>,
   /// 送信者アドレス（省略時は設定の既定値）
   pub sender_email: Option<String>,
}

/// メッセージ受付レスポンス
#[derive(Debug, Serialize)]
pub struct SubmitMessageResponse {
   pub message_id: Uuid,
}

// --- ハンドラ ---

/// POST /internal/mass-messages
///
/// メッセージを検証して受付キューに投入し、202 Accepted を返す。
pub async fn submit_mass_message(
   State(state): State<Arc<MessageState>>,
   Json(req): Json<SubmitMessageRequest>,
) -> Result<impl IntoResponse, DeliveryError> {
   let subject = Subject::new(req.subject)?;
   let body = MessageBody::new(req.body, req.format.unwrap_or(BodyFormat::PlainText))?;
   let categories = req
      .category_ids
      .into_iter()
      .map(CategoryId::new)
      .collect::<Result<Vec<_>, _>>()?;
   let sender_name = req.sender_name.map(SenderName::new).transpose()?;
   let sender_email = req.sender_email.map(Email::new).transpose()?;

   let input = SubmissionInput {
      subject,
      body,
      categories,
      sender_name,
      sender_email,
   };
   let message_id = state.usecase.submit(input).await?;

   let response = ApiResponse::new(SubmitMessageResponse {
      message_id: *message_id.as_uuid(),
   });
   Ok((StatusCode::ACCEPTED, Json(response)))
}
