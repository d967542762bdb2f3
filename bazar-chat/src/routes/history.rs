use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use bazar_shared::errors::AppResult;
use bazar_shared::types::ApiResponse;
use bazar_shared::AuthUser;

use crate::chat;
use crate::chat::history::{AnchorWindow, HistoryPage, DEFAULT_PAGE_LIMIT, DEFAULT_WINDOW};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// GET /chat/history/:room_id
pub async fn get_history(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<ApiResponse<HistoryPage>>> {
    let cursor = params.cursor.as_deref().map(chat::parse_cursor).transpose()?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    let page = chat::history::history_page(&state, room_id, auth_user.id, cursor, limit).await?;

    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Deserialize)]
pub struct AroundParams {
    pub window: Option<i64>,
}

/// GET /chat/history/:room_id/around/:message_id
pub async fn get_history_around(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<AroundParams>,
) -> AppResult<Json<ApiResponse<AnchorWindow>>> {
    let window = params.window.unwrap_or(DEFAULT_WINDOW);

    let around =
        chat::history::history_around(&state, room_id, auth_user.id, message_id, window).await?;

    Ok(Json(ApiResponse::ok(around)))
}
