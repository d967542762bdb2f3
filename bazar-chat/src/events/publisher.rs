use bazar_shared::clients::rabbitmq::RabbitMQClient;
use bazar_shared::types::event::{payloads, routing_keys, Event};

use crate::chat::store::SentMessage;
use crate::models::{Message, Room};

const SOURCE: &str = "bazar-chat";

/// Publishing is best-effort: a broker hiccup must never fail the request
/// that produced the event.
pub async fn publish_room_created(rabbitmq: &RabbitMQClient, room: &Room) {
    let event = Event::new(
        SOURCE,
        routing_keys::CHAT_ROOM_CREATED,
        payloads::RoomCreated {
            room_id: room.id,
            room_type: room.room_type.clone(),
            group_id: room.group_id,
        },
    );

    if let Err(e) = rabbitmq.publish(routing_keys::CHAT_ROOM_CREATED, &event).await {
        tracing::error!(error = %e, room_id = %room.id, "failed to publish room.created");
    }
}

pub async fn publish_message_created(rabbitmq: &RabbitMQClient, sent: &SentMessage) {
    let message = &sent.message;
    let event = Event::new(
        SOURCE,
        routing_keys::CHAT_MESSAGE_CREATED,
        payloads::MessageCreated {
            message_id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message_type: message.message_type.clone(),
            content_preview: message.preview(),
        },
    )
    .with_user(message.sender_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::CHAT_MESSAGE_CREATED, &event)
        .await
    {
        tracing::error!(error = %e, message_id = %message.id, "failed to publish message.created");
    }
}

pub async fn publish_message_edited(rabbitmq: &RabbitMQClient, message: &Message) {
    let event = Event::new(
        SOURCE,
        routing_keys::CHAT_MESSAGE_EDITED,
        payloads::MessageEdited {
            message_id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            edit_count: message.edit_count,
        },
    )
    .with_user(message.sender_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::CHAT_MESSAGE_EDITED, &event)
        .await
    {
        tracing::error!(error = %e, message_id = %message.id, "failed to publish message.edited");
    }
}

pub async fn publish_message_recalled(rabbitmq: &RabbitMQClient, message: &Message) {
    let recalled_by = message.recalled_by.unwrap_or(message.sender_id);
    let event = Event::new(
        SOURCE,
        routing_keys::CHAT_MESSAGE_RECALLED,
        payloads::MessageRecalled {
            message_id: message.id,
            room_id: message.room_id,
            recalled_by,
        },
    )
    .with_user(recalled_by);

    if let Err(e) = rabbitmq
        .publish(routing_keys::CHAT_MESSAGE_RECALLED, &event)
        .await
    {
        tracing::error!(error = %e, message_id = %message.id, "failed to publish message.recalled");
    }
}
