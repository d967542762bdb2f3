use std::collections::HashMap;

use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Uuid as SqlUuid};
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult};

use super::rooms::{load_room, require_participant};
use crate::schema::{messages, participants};

/// Per-room unread counts for group rooms, aggregated against each
/// participant's read cursor. A NULL cursor means nothing was read yet.
const GROUP_UNREAD_SQL: &str = "\
    SELECT m.room_id AS room_id, COUNT(*) AS unread \
    FROM messages m \
    JOIN participants p ON p.room_id = m.room_id \
    JOIN rooms r ON r.id = m.room_id \
    WHERE p.user_id = $1 \
      AND r.room_type = 'GROUP' \
      AND m.sender_id <> $1 \
      AND m.is_recalled = FALSE \
      AND m.created_at > COALESCE(p.last_read_at, 'epoch'::timestamptz) \
    GROUP BY m.room_id";

#[derive(QueryableByName)]
struct UnreadRow {
    #[diesel(sql_type = SqlUuid)]
    room_id: Uuid,
    #[diesel(sql_type = BigInt)]
    unread: i64,
}

/// Mark a room read for one user. Direct rooms flip per-message read flags,
/// group rooms only move the participant's read cursor.
pub fn mark_read(conn: &mut PgConnection, room_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let room = load_room(conn, room_id)?;
    require_participant(conn, room_id, user_id)?;

    if room.is_group() {
        diesel::update(
            participants::table
                .filter(participants::room_id.eq(room_id))
                .filter(participants::user_id.eq(user_id)),
        )
        .set(participants::last_read_at.eq(Some(Utc::now())))
        .execute(conn)
        .map_err(AppError::Database)?;
    } else {
        diesel::update(
            messages::table
                .filter(messages::room_id.eq(room_id))
                .filter(messages::receiver_id.eq(user_id))
                .filter(messages::is_read.eq(false)),
        )
        .set(messages::is_read.eq(true))
        .execute(conn)
        .map_err(AppError::Database)?;
    }

    Ok(())
}

/// Unread counts per room across both models, merged into one map.
pub fn unread_counts(conn: &mut PgConnection, user_id: Uuid) -> AppResult<HashMap<Uuid, i64>> {
    let pair_rows: Vec<(Uuid, i64)> = messages::table
        .filter(messages::receiver_id.eq(user_id))
        .filter(messages::is_read.eq(false))
        .filter(messages::is_recalled.eq(false))
        .group_by(messages::room_id)
        .select((messages::room_id, count_star()))
        .load::<(Uuid, i64)>(conn)
        .map_err(AppError::Database)?;

    let group_rows: Vec<UnreadRow> = diesel::sql_query(GROUP_UNREAD_SQL)
        .bind::<SqlUuid, _>(user_id)
        .load::<UnreadRow>(conn)
        .map_err(AppError::Database)?;

    Ok(merge_counts(
        pair_rows,
        group_rows.into_iter().map(|r| (r.room_id, r.unread)),
    ))
}

pub fn total_unread(conn: &mut PgConnection, user_id: Uuid) -> AppResult<i64> {
    Ok(unread_counts(conn, user_id)?.values().sum())
}

fn merge_counts(
    pair: impl IntoIterator<Item = (Uuid, i64)>,
    group: impl IntoIterator<Item = (Uuid, i64)>,
) -> HashMap<Uuid, i64> {
    let mut merged: HashMap<Uuid, i64> = HashMap::new();
    for (room_id, count) in pair.into_iter().chain(group) {
        *merged.entry(room_id).or_insert(0) += count;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_rooms_distinct() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_counts(vec![(a, 3)], vec![(b, 5)]);
        assert_eq!(merged.get(&a), Some(&3));
        assert_eq!(merged.get(&b), Some(&5));
        assert_eq!(merged.values().sum::<i64>(), 8);
    }

    #[test]
    fn merge_of_empty_sides() {
        let merged = merge_counts(vec![], vec![]);
        assert!(merged.is_empty());

        let a = Uuid::new_v4();
        let merged = merge_counts(vec![(a, 2)], vec![]);
        assert_eq!(merged.get(&a), Some(&2));
    }
}
