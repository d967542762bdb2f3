use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult};
use bazar_shared::types::ApiResponse;
use bazar_shared::AuthUser;

use crate::chat;
use crate::chat::search::{SearchOptions, SearchPage};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub room_id: Option<Uuid>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// GET /chat/search
pub async fn search_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<ApiResponse<SearchPage>>> {
    let cursor = params.cursor.as_deref().map(chat::parse_cursor).transpose()?;
    let opts = SearchOptions {
        room_id: params.room_id,
        cursor,
        limit: params.limit,
    };

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let page = chat::search::search(&mut conn, auth_user.id, &params.q, &opts)?;

    Ok(Json(ApiResponse::ok(page)))
}
