use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult, ErrorCode};

use super::rooms::{load_room, participant_ids};
use crate::models::{message_type_for, Message, NewMessage, Room};
use crate::schema::{messages, rooms};

/// Client-supplied message body. The receiver is always derived server-side,
/// so there is no receiver field here.
#[derive(Debug)]
pub struct NewChatMessage {
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub product_id: Option<Uuid>,
    pub content_tag: Option<String>,
    pub reply_to_id: Option<Uuid>,
}

/// A stored message plus the context fan-out needs.
#[derive(Debug)]
pub struct SentMessage {
    pub message: Message,
    pub room: Room,
    pub participant_ids: Vec<Uuid>,
}

fn validate_body(content: Option<&str>, media_url: Option<&str>) -> AppResult<()> {
    let has_content = content.map_or(false, |c| !c.trim().is_empty());
    let has_media = media_url.map_or(false, |u| !u.trim().is_empty());
    if !has_content && !has_media {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "message must have content or media",
        ));
    }
    Ok(())
}

/// In a direct room the receiver is simply the other participant.
fn pair_receiver(member_ids: &[Uuid], sender_id: Uuid) -> Option<Uuid> {
    member_ids.iter().copied().find(|id| *id != sender_id)
}

pub fn send_message(conn: &mut PgConnection, input: NewChatMessage) -> AppResult<SentMessage> {
    validate_body(input.content.as_deref(), input.media_url.as_deref())?;

    let room = load_room(conn, input.room_id)?;
    let member_ids = participant_ids(conn, room.id)?;
    if !member_ids.contains(&input.sender_id) {
        return Err(AppError::new(
            ErrorCode::NotRoomParticipant,
            "you are not a participant of this room",
        ));
    }

    let receiver_id = if room.is_group() {
        None
    } else {
        pair_receiver(&member_ids, input.sender_id)
    };

    if let Some(reply_to) = input.reply_to_id {
        let target_room: Option<Uuid> = messages::table
            .filter(messages::id.eq(reply_to))
            .select(messages::room_id)
            .first::<Uuid>(conn)
            .optional()
            .map_err(AppError::Database)?;
        if target_room != Some(room.id) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "reply target must be a message in the same room",
            ));
        }
    }

    let content = input.content.filter(|c| !c.trim().is_empty());
    let media_url = input.media_url.filter(|u| !u.trim().is_empty());

    let new_message = NewMessage {
        room_id: room.id,
        sender_id: input.sender_id,
        receiver_id,
        message_type: message_type_for(media_url.as_deref()),
        content,
        media_url,
        reply_to_id: input.reply_to_id,
        product_id: input.product_id,
        content_tag: input.content_tag,
    };

    // The insert and the room's last-message pointer move together or not at all.
    let message = conn.transaction::<Message, AppError, _>(|conn| {
        let message: Message = diesel::insert_into(messages::table)
            .values(&new_message)
            .get_result(conn)?;

        diesel::update(rooms::table.find(room.id))
            .set((
                rooms::last_message_id.eq(Some(message.id)),
                rooms::last_message_at.eq(Some(message.created_at)),
                rooms::updated_at.eq(message.created_at),
            ))
            .execute(conn)?;

        Ok(message)
    })?;

    Ok(SentMessage {
        message,
        room,
        participant_ids: member_ids,
    })
}

/// Edit a message's text. The update is a compare-and-set on `version`; a
/// concurrent mutation between read and write leaves zero rows touched and
/// surfaces as an edit conflict.
pub fn edit_message(
    conn: &mut PgConnection,
    user_id: Uuid,
    message_id: Uuid,
    new_content: &str,
) -> AppResult<Message> {
    let trimmed = new_content.trim();
    if trimmed.is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "content must not be empty",
        ));
    }

    let message = load_message(conn, message_id)?;

    if message.sender_id != user_id {
        return Err(AppError::forbidden("only the sender can edit a message"));
    }
    if message.is_recalled {
        return Err(AppError::new(
            ErrorCode::MessageRecalled,
            "recalled messages cannot be edited",
        ));
    }

    let updated: Option<Message> = diesel::update(
        messages::table
            .filter(messages::id.eq(message_id))
            .filter(messages::version.eq(message.version))
            .filter(messages::is_recalled.eq(false)),
    )
    .set((
        messages::content.eq(Some(trimmed.to_string())),
        messages::is_edited.eq(true),
        messages::edit_count.eq(messages::edit_count + 1),
        messages::edited_at.eq(Some(Utc::now())),
        messages::version.eq(messages::version + 1),
    ))
    .get_result::<Message>(conn)
    .optional()
    .map_err(AppError::Database)?;

    updated.ok_or_else(|| {
        AppError::new(
            ErrorCode::EditConflict,
            "message was modified concurrently, reload and retry",
        )
    })
}

/// Recall (destructively redact) a message. Idempotent: recalling an already
/// recalled message returns the tombstone with `false`, so callers skip the
/// fan-out on repeats.
pub fn recall_message(
    conn: &mut PgConnection,
    user_id: Uuid,
    message_id: Uuid,
) -> AppResult<(Message, bool)> {
    let message = load_message(conn, message_id)?;

    if message.sender_id != user_id {
        return Err(AppError::forbidden("only the sender can recall a message"));
    }

    if message.is_recalled {
        return Ok((message, false));
    }

    let recalled: Option<Message> = diesel::update(
        messages::table
            .filter(messages::id.eq(message_id))
            .filter(messages::is_recalled.eq(false)),
    )
    .set((
        messages::content.eq(None::<String>),
        messages::media_url.eq(None::<String>),
        messages::is_recalled.eq(true),
        messages::recalled_by.eq(Some(user_id)),
        messages::recalled_at.eq(Some(Utc::now())),
        messages::version.eq(messages::version + 1),
    ))
    .get_result::<Message>(conn)
    .optional()
    .map_err(AppError::Database)?;

    match recalled {
        Some(message) => Ok((message, true)),
        // Lost a race against another recall of the same message.
        None => {
            let current = load_message(conn, message_id)?;
            Ok((current, false))
        }
    }
}

fn load_message(conn: &mut PgConnection, message_id: Uuid) -> AppResult<Message> {
    messages::table
        .find(message_id)
        .first::<Message>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_requires_content_or_media() {
        assert!(validate_body(None, None).is_err());
        assert!(validate_body(Some("   "), None).is_err());
        assert!(validate_body(Some("hi"), None).is_ok());
        assert!(validate_body(None, Some("https://cdn/bazar/x.jpg")).is_ok());
        assert!(validate_body(Some(""), Some("https://cdn/bazar/x.jpg")).is_ok());
    }

    #[test]
    fn receiver_is_the_other_participant() {
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert_eq!(pair_receiver(&[sender, other], sender), Some(other));
        assert_eq!(pair_receiver(&[other, sender], sender), Some(other));
        assert_eq!(pair_receiver(&[sender], sender), None);
    }
}
