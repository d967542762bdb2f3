use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ event envelope wrapping all domain events.
///
/// Routing key format: `bazar.{domain}.{entity}.{action}`
/// Example: `bazar.chat.message.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Chat events
    pub const CHAT_ROOM_CREATED: &str = "bazar.chat.room.created";
    pub const CHAT_MESSAGE_CREATED: &str = "bazar.chat.message.created";
    pub const CHAT_MESSAGE_EDITED: &str = "bazar.chat.message.edited";
    pub const CHAT_MESSAGE_RECALLED: &str = "bazar.chat.message.recalled";

    // Group events (produced by the group service, consumed by chat)
    pub const GROUP_UPDATED: &str = "bazar.group.updated";
    pub const GROUP_MEMBER_APPROVED: &str = "bazar.group.member.approved";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RoomCreated {
        pub room_id: Uuid,
        pub room_type: String,
        pub group_id: Option<Uuid>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageCreated {
        pub message_id: Uuid,
        pub room_id: Uuid,
        pub sender_id: Uuid,
        pub receiver_id: Option<Uuid>,
        pub message_type: String,
        pub content_preview: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageEdited {
        pub message_id: Uuid,
        pub room_id: Uuid,
        pub sender_id: Uuid,
        pub edit_count: i32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageRecalled {
        pub message_id: Uuid,
        pub room_id: Uuid,
        pub recalled_by: Uuid,
    }

    /// Emitted by the group service whenever a group's display data or
    /// approved membership changes. `member.approved` events carry the same
    /// `group_id` field, so one payload deserializes both.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GroupUpdated {
        pub group_id: Uuid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_with_type_and_source() {
        let event = Event::new(
            "bazar-chat",
            routing_keys::CHAT_MESSAGE_CREATED,
            payloads::MessageRecalled {
                message_id: Uuid::new_v4(),
                room_id: Uuid::new_v4(),
                recalled_by: Uuid::new_v4(),
            },
        )
        .with_user(Uuid::new_v4());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "bazar-chat");
        assert_eq!(json["event_type"], "bazar.chat.message.created");
        assert!(json["user_id"].is_string());
        assert!(json["data"]["message_id"].is_string());
    }

    #[test]
    fn group_payload_tolerates_extra_fields() {
        // member.approved events carry user_id alongside group_id
        let raw = serde_json::json!({ "group_id": Uuid::new_v4(), "user_id": Uuid::new_v4() });
        let parsed: payloads::GroupUpdated = serde_json::from_value(raw).unwrap();
        assert!(!parsed.group_id.is_nil());
    }
}
