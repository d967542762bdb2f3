use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult, ErrorCode};

use super::rooms::{is_participant, load_room};
use super::{groups, truncate_page};
use crate::models::{Message, Room};
use crate::schema::messages;
use crate::AppState;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const DEFAULT_WINDOW: i64 = 40;

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub items: Vec<Message>,
    pub next_cursor: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AnchorWindow {
    pub items: Vec<Message>,
    pub anchor_index: Option<usize>,
}

impl HistoryPage {
    fn empty() -> Self {
        HistoryPage {
            items: vec![],
            next_cursor: None,
        }
    }
}

/// Reads are gated on membership. Direct rooms check the participant row,
/// group rooms ask the group service for current approved membership.
/// Non-members get empty results rather than errors, so probing a room id
/// reveals nothing.
async fn can_read(
    state: &AppState,
    conn: &mut PgConnection,
    room: &Room,
    user_id: Uuid,
) -> AppResult<bool> {
    if room.is_group() {
        let group_id = room
            .group_id
            .ok_or_else(|| AppError::internal("group room without group_id"))?;
        groups::is_approved_member(state, group_id, user_id).await
    } else {
        is_participant(conn, room.id, user_id)
    }
}

/// One page of room history, newest page first, items oldest-to-newest
/// within the page. The cursor is the `created_at` of the oldest returned
/// message; pass it back to fetch the next older page.
pub async fn history_page(
    state: &AppState,
    room_id: Uuid,
    user_id: Uuid,
    cursor: Option<DateTime<Utc>>,
    limit: i64,
) -> AppResult<HistoryPage> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let room = load_room(&mut conn, room_id)?;

    if !can_read(state, &mut conn, &room, user_id).await? {
        return Ok(HistoryPage::empty());
    }

    let limit = limit.clamp(1, 100);

    let mut query = messages::table
        .filter(messages::room_id.eq(room_id))
        .into_boxed();
    if let Some(cursor) = cursor {
        query = query.filter(messages::created_at.lt(cursor));
    }

    let mut items: Vec<Message> = query
        .order((messages::created_at.desc(), messages::id.desc()))
        .limit(limit + 1)
        .load::<Message>(&mut conn)
        .map_err(AppError::Database)?;

    let has_more = truncate_page(&mut items, limit as usize);
    let next_cursor = if has_more {
        items.last().map(|m| m.created_at)
    } else {
        None
    };

    items.reverse();

    Ok(HistoryPage { items, next_cursor })
}

/// How many rows to fetch on each side of an anchor for a window of `w`
/// messages: the before-query includes the anchor itself plus one extra row
/// to absorb a timestamp tie.
pub(crate) fn window_split(window: i64) -> (i64, i64) {
    let w = window.max(0);
    ((w + 1) / 2 + 1, w / 2)
}

/// A window of messages centered on an anchor, for jump-to-message.
pub async fn history_around(
    state: &AppState,
    room_id: Uuid,
    user_id: Uuid,
    anchor_id: Uuid,
    window: i64,
) -> AppResult<AnchorWindow> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let room = load_room(&mut conn, room_id)?;

    if !can_read(state, &mut conn, &room, user_id).await? {
        return Ok(AnchorWindow {
            items: vec![],
            anchor_index: None,
        });
    }

    let anchor: Message = messages::table
        .find(anchor_id)
        .first::<Message>(&mut conn)
        .optional()
        .map_err(AppError::Database)?
        .filter(|m| m.room_id == room_id)
        .ok_or_else(|| {
            AppError::new(
                ErrorCode::MessageNotFound,
                "anchor message not found in this room",
            )
        })?;

    let window = window.clamp(0, 200);
    let (before_limit, after_limit) = window_split(window);

    let mut before: Vec<Message> = messages::table
        .filter(messages::room_id.eq(room_id))
        .filter(messages::created_at.le(anchor.created_at))
        .order((messages::created_at.desc(), messages::id.desc()))
        .limit(before_limit)
        .load::<Message>(&mut conn)
        .map_err(AppError::Database)?;
    before.reverse();

    let after: Vec<Message> = messages::table
        .filter(messages::room_id.eq(room_id))
        .filter(messages::created_at.gt(anchor.created_at))
        .order((messages::created_at.asc(), messages::id.asc()))
        .limit(after_limit)
        .load::<Message>(&mut conn)
        .map_err(AppError::Database)?;

    Ok(assemble_window(before, after, anchor_id))
}

fn assemble_window(before_asc: Vec<Message>, after_asc: Vec<Message>, anchor_id: Uuid) -> AnchorWindow {
    let mut items = before_asc;
    items.extend(after_asc);
    let anchor_index = items.iter().position(|m| m.id == anchor_id);
    AnchorWindow { items, anchor_index }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::message_in_room;

    #[test]
    fn window_split_covers_both_sides() {
        assert_eq!(window_split(40), (21, 20));
        assert_eq!(window_split(5), (4, 2));
        assert_eq!(window_split(1), (2, 0));
        assert_eq!(window_split(0), (1, 0));
    }

    #[test]
    fn window_never_exceeds_requested_plus_one() {
        for w in 0..=60 {
            let (before, after) = window_split(w);
            assert!(before + after <= w + 1, "w={w}");
            assert!(before + after >= w.min(1), "w={w}");
        }
    }

    #[test]
    fn assembled_window_is_chronological_with_anchor_located() {
        let room_id = Uuid::new_v4();
        let older = message_in_room(room_id, 10);
        let anchor = message_in_room(room_id, 20);
        let newer = message_in_room(room_id, 30);
        let anchor_id = anchor.id;

        let window = assemble_window(vec![older, anchor], vec![newer], anchor_id);
        assert_eq!(window.items.len(), 3);
        assert_eq!(window.anchor_index, Some(1));
        assert!(window.items[0].created_at < window.items[1].created_at);
        assert!(window.items[1].created_at < window.items[2].created_at);
    }

    #[test]
    fn missing_anchor_yields_no_index() {
        let room_id = Uuid::new_v4();
        let window = assemble_window(vec![message_in_room(room_id, 1)], vec![], Uuid::new_v4());
        assert_eq!(window.anchor_index, None);
        assert_eq!(window.items.len(), 1);
    }
}
