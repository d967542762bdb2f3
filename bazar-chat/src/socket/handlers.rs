use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{Data, SocketRef, TryData};
use uuid::Uuid;

use bazar_shared::errors::{AppError, AppResult};
use bazar_shared::middleware::decode_claims;

use crate::chat::history::{self, DEFAULT_PAGE_LIMIT};
use crate::chat::{self, rooms, store, unread};
use crate::events::publisher;
use crate::models::Message;
use crate::socket::presence;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct IdentifyPayload {
    user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    room_id: Uuid,
    content: Option<String>,
    media_url: Option<String>,
    product_id: Option<Uuid>,
    content_tag: Option<String>,
    reply_to_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct EditMessagePayload {
    message_id: Uuid,
    content: String,
}

#[derive(Debug, Deserialize)]
struct LoadMessagesPayload {
    room_id: Uuid,
    cursor: Option<String>,
    limit: Option<i64>,
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

fn emit_error(socket: &SocketRef, code: &str, message: impl Into<String>) {
    let _ = socket.emit(
        "error",
        &ErrorPayload {
            code: code.to_string(),
            message: message.into(),
        },
    );
}

fn emit_app_error(socket: &SocketRef, err: &AppError) {
    let _ = socket.emit(
        "error",
        &ErrorPayload {
            code: err.code_str().to_string(),
            message: err.to_string(),
        },
    );
}

pub async fn on_connect(
    socket: SocketRef,
    auth: TryData<serde_json::Value>,
    state: Arc<AppState>,
) {
    let user_id = match authenticate_socket(&socket, auth, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, sid = %socket.id, "chat socket auth failed");
            emit_error(&socket, "AUTH_FAILED", msg);
            socket.disconnect().ok();
            return;
        }
    };

    // Store user_id in socket extensions
    socket.extensions.insert(user_id);

    // Join user-specific room so server pushes can target this user
    let user_room = format!("user:{user_id}");
    socket.join(user_room).ok();

    presence::register(&state.redis, user_id, &socket.id.to_string()).await;

    tracing::info!(user_id = %user_id, sid = %socket.id, "chat socket connected");

    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));

    socket.on("identify", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_identify(socket, payload, &state).await;
            }
        }
    });

    socket.on("sendMessage", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_send_message(socket, payload, &state).await;
            }
        }
    });

    socket.on("editMessage", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_edit_message(socket, payload, &state).await;
            }
        }
    });

    socket.on("getMessagesByRoom", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move {
                on_get_messages_by_room(socket, payload, &state).await;
            }
        }
    });

    // Heartbeat handler - refresh presence TTL
    socket.on("heartbeat", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = get_user_id(&socket) {
                    presence::touch(&state.redis, user_id).await;
                }
            }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect_with_state(socket, state).await;
            }
        }
    });
}

async fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    presence::unregister(&state.redis, user_id, &socket.id.to_string()).await;

    tracing::info!(user_id = %user_id, sid = %socket.id, "chat socket disconnected");
}

/// The identity on the wire is whatever the token says; a client-supplied
/// user_id is ignored. The ack echoes the server-side identity back.
async fn on_identify(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    if let Ok(identify) = serde_json::from_value::<IdentifyPayload>(payload) {
        if let Some(claimed) = identify.user_id {
            if claimed != user_id {
                tracing::warn!(claimed = %claimed, actual = %user_id, "identify user_id mismatch ignored");
            }
        }
    }

    presence::touch(&state.redis, user_id).await;

    let _ = socket.emit("identified", &serde_json::json!({ "user_id": user_id }));
}

async fn on_send_message(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let payload: SendMessagePayload = match serde_json::from_value(payload) {
        Ok(p) => p,
        Err(e) => {
            emit_error(&socket, "INVALID_PAYLOAD", format!("sendMessage: {e}"));
            return;
        }
    };

    let sent = {
        let mut conn = match state.db.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "db pool checkout failed");
                emit_error(&socket, "INTERNAL", "temporary failure, try again");
                return;
            }
        };
        store::send_message(
            &mut conn,
            store::NewChatMessage {
                room_id: payload.room_id,
                sender_id: user_id,
                content: payload.content,
                media_url: payload.media_url,
                product_id: payload.product_id,
                content_tag: payload.content_tag,
                reply_to_id: payload.reply_to_id,
            },
        )
    };

    match sent {
        Ok(sent) => {
            publisher::publish_message_created(&state.rabbitmq, &sent).await;
            if let Err(e) = emit_new_message(state, &sent).await {
                tracing::warn!(error = %e, message_id = %sent.message.id, "message fan-out failed");
            }
        }
        Err(e) => emit_app_error(&socket, &e),
    }
}

async fn on_edit_message(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let payload: EditMessagePayload = match serde_json::from_value(payload) {
        Ok(p) => p,
        Err(e) => {
            emit_error(&socket, "INVALID_PAYLOAD", format!("editMessage: {e}"));
            return;
        }
    };

    let edited = {
        let mut conn = match state.db.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "db pool checkout failed");
                emit_error(&socket, "INTERNAL", "temporary failure, try again");
                return;
            }
        };
        store::edit_message(&mut conn, user_id, payload.message_id, &payload.content)
    };

    match edited {
        Ok(message) => {
            publisher::publish_message_edited(&state.rabbitmq, &message).await;
            if let Err(e) = emit_message_edited(state, &message).await {
                tracing::warn!(error = %e, message_id = %message.id, "edit fan-out failed");
            }
        }
        Err(e) => emit_app_error(&socket, &e),
    }
}

async fn on_get_messages_by_room(
    socket: SocketRef,
    payload: serde_json::Value,
    state: &Arc<AppState>,
) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let payload: LoadMessagesPayload = match serde_json::from_value(payload) {
        Ok(p) => p,
        Err(e) => {
            emit_error(&socket, "INVALID_PAYLOAD", format!("getMessagesByRoom: {e}"));
            return;
        }
    };

    let cursor = match payload.cursor.as_deref().map(chat::parse_cursor).transpose() {
        Ok(cursor) => cursor,
        Err(e) => {
            emit_app_error(&socket, &e);
            return;
        }
    };

    let limit = payload.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    match history::history_page(state, payload.room_id, user_id, cursor, limit).await {
        Ok(page) => {
            let _ = socket.emit(
                "loadMessages",
                &serde_json::json!({
                    "room_id": payload.room_id,
                    "items": page.items,
                    "next_cursor": page.next_cursor,
                }),
            );
        }
        Err(e) => emit_app_error(&socket, &e),
    }
}

/// Push a stored message to every participant's user room. The sender's own
/// echo doubles as the delivery ack. Recipients also get a fresh unread total.
pub async fn emit_new_message(state: &AppState, sent: &store::SentMessage) -> AppResult<()> {
    let payload = serde_json::json!({
        "room_id": sent.room.id,
        "room_type": sent.room.room_type,
        "message": sent.message,
    });

    for member_id in &sent.participant_ids {
        let user_room = format!("user:{member_id}");
        let _ = state.io.to(user_room).emit("receiveMessage", &payload);
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    for member_id in sent
        .participant_ids
        .iter()
        .filter(|id| **id != sent.message.sender_id)
    {
        let total = unread::total_unread(&mut conn, *member_id)?;
        let user_room = format!("user:{member_id}");
        let _ = state
            .io
            .to(user_room)
            .emit("unread_count_update", &serde_json::json!({ "count": total }));
    }

    Ok(())
}

/// Edits and recalls are only pushed to the room's participants.
pub async fn emit_message_edited(state: &AppState, message: &Message) -> AppResult<()> {
    emit_to_participants(state, message, "messageEdited").await
}

pub async fn emit_message_recalled(state: &AppState, message: &Message) -> AppResult<()> {
    emit_to_participants(state, message, "messageRecalled").await
}

async fn emit_to_participants(
    state: &AppState,
    message: &Message,
    event: &'static str,
) -> AppResult<()> {
    let member_ids = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        rooms::participant_ids(&mut conn, message.room_id)?
    };

    let payload = serde_json::json!({
        "room_id": message.room_id,
        "message": message,
    });

    for member_id in &member_ids {
        let user_room = format!("user:{member_id}");
        let _ = state.io.to(user_room).emit(event, &payload);
    }

    Ok(())
}

fn authenticate_socket(
    socket: &SocketRef,
    auth: TryData<serde_json::Value>,
    state: &Arc<AppState>,
) -> Result<Uuid, String> {
    let TryData(auth) = auth;

    // Token comes from the Socket.IO auth payload, with the query string
    // kept as a fallback for older clients
    let payload_token = auth.ok().and_then(|value| {
        value
            .get("token")
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
    });

    let token = match payload_token {
        Some(token) => token,
        None => {
            let query = socket.req_parts().uri.query().unwrap_or_default();
            token_from_query(query).ok_or_else(|| "missing auth token".to_string())?
        }
    };

    let claims = decode_claims(&token, &state.config.jwt_secret)
        .map_err(|e| format!("invalid token: {e}"))?;

    Ok(claims.sub)
}

fn token_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut split = pair.splitn(2, '=');
        let key = split.next()?;
        let value = split.next()?;
        if key == "token" {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_extracted_from_query() {
        assert_eq!(
            token_from_query("token=abc.def.ghi&eio=4"),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(
            token_from_query("eio=4&transport=polling&token=xyz"),
            Some("xyz".to_string())
        );
        assert_eq!(token_from_query("eio=4&transport=polling"), None);
        assert_eq!(token_from_query(""), None);
    }

    #[test]
    fn send_payload_accepts_minimal_message() {
        let raw = serde_json::json!({
            "room_id": "2b0f8dd2-8a2e-4c61-9db1-6f3f2b4c5a01",
            "content": "hello"
        });
        let payload: SendMessagePayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.content.as_deref(), Some("hello"));
        assert!(payload.media_url.is_none());
        assert!(payload.reply_to_id.is_none());
    }

    #[test]
    fn send_payload_ignores_client_receiver() {
        let raw = serde_json::json!({
            "room_id": "2b0f8dd2-8a2e-4c61-9db1-6f3f2b4c5a01",
            "receiver_id": "7f9c24e8-3b0d-4f3a-a9a2-c19d5a6b7c01",
            "content": "hello"
        });
        // receiver_id is not part of the payload type; it deserializes fine
        // and the field is dropped.
        assert!(serde_json::from_value::<SendMessagePayload>(raw).is_ok());
    }

    #[test]
    fn send_payload_requires_room_id() {
        let raw = serde_json::json!({ "content": "hello" });
        assert!(serde_json::from_value::<SendMessagePayload>(raw).is_err());
    }

    #[test]
    fn edit_payload_requires_content() {
        let raw = serde_json::json!({
            "message_id": "2b0f8dd2-8a2e-4c61-9db1-6f3f2b4c5a01"
        });
        assert!(serde_json::from_value::<EditMessagePayload>(raw).is_err());
    }
}
