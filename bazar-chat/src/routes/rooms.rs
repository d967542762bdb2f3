use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult};
use bazar_shared::types::{ApiResponse, Paginated, PaginationParams};
use bazar_shared::AuthUser;

use crate::chat;
use crate::chat::rooms::RoomDetail;
use crate::events::publisher;
use crate::models::{Message, Room};
use crate::schema::{messages, participants, rooms};
use crate::socket::presence;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenPairRoomRequest {
    pub seller_id: Uuid,
    pub buyer_id: Option<Uuid>,
}

/// One entry of the room list: the room plus everything the inbox UI shows.
#[derive(Debug, Serialize)]
pub struct RoomPreview {
    #[serde(flatten)]
    pub room: Room,
    pub partner_id: Option<Uuid>,
    pub partner_online: bool,
    pub last_message: Option<Message>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: i64,
}

/// The caller must be one side of the pair; their identity comes from the
/// token, never from the body.
fn resolve_pair(caller: Uuid, seller_id: Uuid, buyer_id: Option<Uuid>) -> AppResult<(Uuid, Uuid)> {
    match buyer_id {
        Some(buyer) => {
            if caller != seller_id && caller != buyer {
                return Err(AppError::forbidden("caller must be part of the room"));
            }
            Ok((seller_id, buyer))
        }
        None => Ok((seller_id, caller)),
    }
}

/// POST /chat/room
pub async fn open_pair_room(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenPairRoomRequest>,
) -> AppResult<Json<ApiResponse<RoomDetail>>> {
    let (user_a, user_b) = resolve_pair(auth_user.id, req.seller_id, req.buyer_id)?;

    let (detail, created) = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        chat::rooms::open_or_create_pair_room(&mut conn, user_a, user_b)?
    };

    if created {
        publisher::publish_room_created(&state.rabbitmq, &detail.room).await;
    }

    Ok(Json(ApiResponse::ok(detail)))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRoomRequest {
    pub group_id: Uuid,
}

/// POST /chat/room/group
pub async fn create_group_room(
    _auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRoomRequest>,
) -> AppResult<Json<ApiResponse<RoomDetail>>> {
    let (detail, created) = chat::rooms::create_room_group(&state, req.group_id).await?;

    if created {
        publisher::publish_room_created(&state.rabbitmq, &detail.room).await;
    }

    Ok(Json(ApiResponse::ok(detail)))
}

/// GET /chat/list
pub async fn list_rooms(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<RoomPreview>>>> {
    let user_id = auth_user.id;
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let room_ids: Vec<Uuid> = participants::table
        .filter(participants::user_id.eq(user_id))
        .select(participants::room_id)
        .load::<Uuid>(&mut conn)
        .map_err(AppError::Database)?;

    if room_ids.is_empty() {
        return Ok(Json(ApiResponse::ok(Paginated::new(vec![], 0, &params))));
    }

    let user_rooms: Vec<Room> = rooms::table
        .filter(rooms::id.eq_any(&room_ids))
        .load::<Room>(&mut conn)
        .map_err(AppError::Database)?;

    let unread = chat::unread::unread_counts(&mut conn, user_id)?;

    let last_ids: Vec<Uuid> = user_rooms.iter().filter_map(|r| r.last_message_id).collect();
    let last_messages: HashMap<Uuid, Message> = if last_ids.is_empty() {
        HashMap::new()
    } else {
        messages::table
            .filter(messages::id.eq_any(&last_ids))
            .load::<Message>(&mut conn)
            .map_err(AppError::Database)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect()
    };

    let pair_room_ids: Vec<Uuid> = user_rooms
        .iter()
        .filter(|r| !r.is_group())
        .map(|r| r.id)
        .collect();
    let partner_by_room: HashMap<Uuid, Uuid> = if pair_room_ids.is_empty() {
        HashMap::new()
    } else {
        participants::table
            .filter(participants::room_id.eq_any(&pair_room_ids))
            .filter(participants::user_id.ne(user_id))
            .select((participants::room_id, participants::user_id))
            .load::<(Uuid, Uuid)>(&mut conn)
            .map_err(AppError::Database)?
            .into_iter()
            .collect()
    };

    drop(conn);

    let total = user_rooms.len() as i64;
    let mut previews = Vec::with_capacity(user_rooms.len());
    for room in user_rooms {
        let partner_id = partner_by_room.get(&room.id).copied();
        let partner_online = match partner_id {
            Some(pid) => presence::is_online(&state.redis, pid).await,
            None => false,
        };
        previews.push(RoomPreview {
            partner_id,
            partner_online,
            unread_count: unread.get(&room.id).copied().unwrap_or(0),
            last_message: room.last_message_id.and_then(|id| last_messages.get(&id).cloned()),
            last_activity: room.last_activity(),
            room,
        });
    }

    previews.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

    let items: Vec<RoomPreview> = previews
        .into_iter()
        .skip(params.offset() as usize)
        .take(params.limit() as usize)
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_defaults_to_caller_as_buyer() {
        let caller = Uuid::new_v4();
        let seller = Uuid::new_v4();
        assert_eq!(resolve_pair(caller, seller, None).unwrap(), (seller, caller));
    }

    #[test]
    fn explicit_pair_requires_caller_membership() {
        let caller = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();

        assert!(resolve_pair(caller, seller, Some(buyer)).is_err());
        assert_eq!(
            resolve_pair(seller, seller, Some(buyer)).unwrap(),
            (seller, buyer)
        );
        assert_eq!(
            resolve_pair(buyer, seller, Some(buyer)).unwrap(),
            (seller, buyer)
        );
    }
}
