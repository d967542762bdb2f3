use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::{messages, participants, rooms};

/// `rooms.room_type` values.
pub mod room_type {
    pub const PAIR: &str = "PAIR";
    pub const GROUP: &str = "GROUP";
}

/// `messages.message_type` values.
pub mod message_type {
    pub const TEXT: &str = "TEXT";
    pub const IMAGE: &str = "IMAGE";
}

/// Message type is derived from the body, never client-supplied.
pub fn message_type_for(media_url: Option<&str>) -> &'static str {
    if media_url.is_some() {
        message_type::IMAGE
    } else {
        message_type::TEXT
    }
}

// --- Room ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = rooms)]
pub struct Room {
    pub id: Uuid,
    pub room_type: String,
    pub group_id: Option<Uuid>,
    pub pair_key: Option<String>,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub participants_count: i32,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn is_group(&self) -> bool {
        self.room_type == room_type::GROUP
    }

    /// Most recent activity, for sorting room lists.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = rooms)]
pub struct NewRoom {
    pub room_type: &'static str,
    pub group_id: Option<Uuid>,
    pub pair_key: Option<String>,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub participants_count: i32,
}

// --- Participant ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = participants)]
pub struct Participant {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub last_read_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = participants)]
pub struct NewParticipant {
    pub room_id: Uuid,
    pub user_id: Uuid,
}

// --- Message ---

#[derive(Debug, Queryable, QueryableByName, Identifiable, Serialize, Clone)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Option<Uuid>,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub message_type: String,
    pub is_edited: bool,
    pub edit_count: i32,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_recalled: bool,
    pub recalled_by: Option<Uuid>,
    pub recalled_at: Option<DateTime<Utc>>,
    pub reply_to_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub content_tag: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Short body preview for events and room lists (max 100 chars).
    pub fn preview(&self) -> String {
        if self.is_recalled {
            return String::new();
        }
        match &self.content {
            Some(c) => c.chars().take(100).collect(),
            None => "[image]".to_string(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Option<Uuid>,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub message_type: &'static str,
    pub reply_to_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub content_tag: Option<String>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn sample_message(content: Option<&str>, media_url: Option<&str>) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: None,
            content: content.map(|s| s.to_string()),
            media_url: media_url.map(|s| s.to_string()),
            message_type: message_type_for(media_url).to_string(),
            is_edited: false,
            edit_count: 0,
            edited_at: None,
            is_read: false,
            is_recalled: false,
            recalled_by: None,
            recalled_at: None,
            reply_to_id: None,
            product_id: None,
            content_tag: None,
            version: 1,
            created_at: Utc::now(),
        }
    }

    /// A message pinned to a room at a given second offset, for windowing tests.
    pub(crate) fn message_in_room(room_id: Uuid, offset_secs: i64) -> Message {
        let mut msg = sample_message(Some("hello"), None);
        msg.room_id = room_id;
        msg.created_at = chrono::DateTime::from_timestamp(1_760_000_000 + offset_secs, 0).unwrap();
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sample_message;
    use super::*;

    #[test]
    fn message_type_follows_media() {
        assert_eq!(message_type_for(None), "TEXT");
        assert_eq!(message_type_for(Some("https://cdn/bazar/x.jpg")), "IMAGE");
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "x".repeat(300);
        let msg = sample_message(Some(&long), None);
        assert_eq!(msg.preview().chars().count(), 100);

        let image = sample_message(None, Some("https://cdn/bazar/x.jpg"));
        assert_eq!(image.preview(), "[image]");
    }

    #[test]
    fn recalled_preview_is_empty() {
        let mut msg = sample_message(Some("hello"), None);
        msg.is_recalled = true;
        msg.content = None;
        assert_eq!(msg.preview(), "");
    }
}
