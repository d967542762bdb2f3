use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult};
use bazar_shared::types::ApiResponse;
use bazar_shared::AuthUser;

use crate::chat::{store, unread};
use crate::events::publisher;
use crate::models::Message;
use crate::socket::handlers;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub room_id: Uuid,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub product_id: Option<Uuid>,
    pub content_tag: Option<String>,
    pub reply_to_id: Option<Uuid>,
}

/// POST /chat/send
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let sent = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        store::send_message(
            &mut conn,
            store::NewChatMessage {
                room_id: req.room_id,
                sender_id: auth_user.id,
                content: req.content,
                media_url: req.media_url,
                product_id: req.product_id,
                content_tag: req.content_tag,
                reply_to_id: req.reply_to_id,
            },
        )?
    };

    publisher::publish_message_created(&state.rabbitmq, &sent).await;
    if let Err(e) = handlers::emit_new_message(&state, &sent).await {
        tracing::warn!(error = %e, message_id = %sent.message.id, "message fan-out failed");
    }

    Ok(Json(ApiResponse::ok(sent.message)))
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub message_id: Uuid,
    pub content: String,
}

/// POST /chat/edit
pub async fn edit_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<EditMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        store::edit_message(&mut conn, auth_user.id, req.message_id, &req.content)?
    };

    publisher::publish_message_edited(&state.rabbitmq, &message).await;
    if let Err(e) = handlers::emit_message_edited(&state, &message).await {
        tracing::warn!(error = %e, message_id = %message.id, "edit fan-out failed");
    }

    Ok(Json(ApiResponse::ok(message)))
}

#[derive(Debug, Deserialize)]
pub struct RecallMessageRequest {
    pub message_id: Uuid,
}

/// POST /chat/recall
pub async fn recall_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecallMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let (message, recalled_now) = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        store::recall_message(&mut conn, auth_user.id, req.message_id)?
    };

    if recalled_now {
        publisher::publish_message_recalled(&state.rabbitmq, &message).await;
        if let Err(e) = handlers::emit_message_recalled(&state, &message).await {
            tracing::warn!(error = %e, message_id = %message.id, "recall fan-out failed");
        }
    }

    Ok(Json(ApiResponse::ok_with_message(message, "message recalled")))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub room_id: Uuid,
    pub read_at: chrono::DateTime<Utc>,
}

/// POST /chat/mark-read/:room_id
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MarkReadResponse>>> {
    let total = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        unread::mark_read(&mut conn, room_id, auth_user.id)?;
        unread::total_unread(&mut conn, auth_user.id)?
    };

    // The reader's badge changed; push the fresh total to all their devices.
    let user_room = format!("user:{}", auth_user.id);
    let _ = state
        .io
        .to(user_room)
        .emit("unread_count_update", &serde_json::json!({ "count": total }));

    Ok(Json(ApiResponse::ok(MarkReadResponse {
        room_id,
        read_at: Utc::now(),
    })))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub total_unread: i64,
}

/// GET /chat/unread-count
pub async fn get_unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let total = unread::total_unread(&mut conn, auth_user.id)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { total_unread: total })))
}
