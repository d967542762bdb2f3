use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult, ErrorCode};

use super::groups;
use crate::models::{room_type, Message, NewParticipant, NewRoom, Participant, Room};
use crate::schema::{messages, participants, rooms};
use crate::AppState;

/// A room together with its membership and latest message, as returned by
/// the room-opening endpoints.
#[derive(Debug, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,
    pub participants: Vec<Participant>,
    pub last_message: Option<Message>,
}

/// Canonical identity of a direct room: the two user ids sorted ascending.
/// Both orderings of the same pair produce the same key.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

pub fn load_room(conn: &mut PgConnection, room_id: Uuid) -> AppResult<Room> {
    rooms::table
        .find(room_id)
        .first::<Room>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::RoomNotFound, "room not found"))
}

pub fn is_participant(conn: &mut PgConnection, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    participants::table
        .filter(participants::room_id.eq(room_id))
        .filter(participants::user_id.eq(user_id))
        .select(count_star())
        .first::<i64>(conn)
        .map(|n| n > 0)
        .map_err(AppError::Database)
}

pub fn require_participant(conn: &mut PgConnection, room_id: Uuid, user_id: Uuid) -> AppResult<()> {
    if !is_participant(conn, room_id, user_id)? {
        return Err(AppError::new(
            ErrorCode::NotRoomParticipant,
            "you are not a participant of this room",
        ));
    }
    Ok(())
}

pub fn participant_ids(conn: &mut PgConnection, room_id: Uuid) -> AppResult<Vec<Uuid>> {
    participants::table
        .filter(participants::room_id.eq(room_id))
        .select(participants::user_id)
        .load::<Uuid>(conn)
        .map_err(AppError::Database)
}

/// Open the direct room between two users, creating it on first contact.
/// Returns the detail plus whether this call created the room.
pub fn open_or_create_pair_room(
    conn: &mut PgConnection,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<(RoomDetail, bool)> {
    if user_a == user_b {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "cannot open a chat with yourself",
        ));
    }

    let key = pair_key(user_a, user_b);

    let existing: Option<Room> = rooms::table
        .filter(rooms::pair_key.eq(&key))
        .first::<Room>(conn)
        .optional()
        .map_err(AppError::Database)?;

    let (room, created) = match existing {
        Some(room) => (room, false),
        None => {
            let new_room = NewRoom {
                room_type: room_type::PAIR,
                group_id: None,
                pair_key: Some(key.clone()),
                title: None,
                avatar_url: None,
                participants_count: 2,
            };
            // Two first-contact requests can race here. The unique pair_key
            // turns the loser's insert into a no-op and both sides re-select
            // the winner's row.
            let inserted = diesel::insert_into(rooms::table)
                .values(&new_room)
                .on_conflict(rooms::pair_key)
                .do_nothing()
                .execute(conn)
                .map_err(AppError::Database)?;

            let room = rooms::table
                .filter(rooms::pair_key.eq(&key))
                .first::<Room>(conn)
                .map_err(AppError::Database)?;
            (room, inserted == 1)
        }
    };

    // Repairs partial membership left by an interrupted earlier attempt.
    ensure_participants(conn, room.id, &[user_a, user_b])?;

    Ok((load_detail(conn, room)?, created))
}

/// Find or create the chat room mirroring a marketplace group, then sync
/// title, avatar and membership from the group service snapshot.
pub async fn create_room_group(state: &AppState, group_id: Uuid) -> AppResult<(RoomDetail, bool)> {
    let group = groups::fetch_group(state, group_id).await?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let existing: Option<Room> = rooms::table
        .filter(rooms::group_id.eq(group_id))
        .first::<Room>(&mut conn)
        .optional()
        .map_err(AppError::Database)?;

    let (room, created) = match existing {
        Some(room) => (room, false),
        None => {
            let new_room = NewRoom {
                room_type: room_type::GROUP,
                group_id: Some(group_id),
                pair_key: None,
                title: Some(group.title.clone()),
                avatar_url: group.avatar_url.clone(),
                participants_count: group.approved_member_ids.len() as i32,
            };
            let inserted = diesel::insert_into(rooms::table)
                .values(&new_room)
                .on_conflict(rooms::group_id)
                .do_nothing()
                .execute(&mut conn)
                .map_err(AppError::Database)?;

            let room = rooms::table
                .filter(rooms::group_id.eq(group_id))
                .first::<Room>(&mut conn)
                .map_err(AppError::Database)?;
            (room, inserted == 1)
        }
    };

    let room: Room = diesel::update(rooms::table.find(room.id))
        .set((
            rooms::title.eq(Some(group.title)),
            rooms::avatar_url.eq(group.avatar_url),
            rooms::participants_count.eq(group.approved_member_ids.len() as i32),
            rooms::updated_at.eq(Utc::now()),
        ))
        .get_result::<Room>(&mut conn)
        .map_err(AppError::Database)?;

    // Membership is additive: members removed from the group keep their
    // participant row and their message history.
    ensure_participants(&mut conn, room.id, &group.approved_member_ids)?;

    Ok((load_detail(&mut conn, room)?, created))
}

fn ensure_participants(conn: &mut PgConnection, room_id: Uuid, user_ids: &[Uuid]) -> AppResult<()> {
    let rows: Vec<NewParticipant> = user_ids
        .iter()
        .map(|user_id| NewParticipant { room_id, user_id: *user_id })
        .collect();

    diesel::insert_into(participants::table)
        .values(&rows)
        .on_conflict((participants::room_id, participants::user_id))
        .do_nothing()
        .execute(conn)
        .map_err(AppError::Database)?;

    Ok(())
}

fn load_detail(conn: &mut PgConnection, room: Room) -> AppResult<RoomDetail> {
    let members: Vec<Participant> = participants::table
        .filter(participants::room_id.eq(room.id))
        .order(participants::joined_at.asc())
        .load::<Participant>(conn)
        .map_err(AppError::Database)?;

    let last_message = match room.last_message_id {
        Some(message_id) => messages::table
            .find(message_id)
            .first::<Message>(conn)
            .optional()
            .map_err(AppError::Database)?,
        None => None,
    };

    Ok(RoomDetail {
        room,
        participants: members,
        last_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn pair_key_sorts_ascending() {
        let lo = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let hi = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();
        assert_eq!(pair_key(hi, lo), format!("{lo}:{hi}"));
    }

    #[test]
    fn distinct_pairs_get_distinct_keys() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(pair_key(a, b), pair_key(a, c));
        assert_ne!(pair_key(a, b), pair_key(b, c));
    }
}
