use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use bazar_shared::types::event::{payloads, routing_keys, Event};

use crate::chat::rooms;
use crate::events::publisher;
use crate::AppState;

const QUEUE_NAME: &str = "bazar-chat.group.updated";

/// Group display or membership changes drive a room re-sync, so the chat
/// mirror stays current without anyone hitting the REST trigger.
pub async fn listen_group_updates(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state
        .rabbitmq
        .subscribe(
            QUEUE_NAME,
            &[routing_keys::GROUP_UPDATED, routing_keys::GROUP_MEMBER_APPROVED],
        )
        .await?;

    tracing::info!(queue = QUEUE_NAME, "listening for group update events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::GroupUpdated>>(&delivery.data) {
                    Ok(event) => {
                        let group_id = event.data.group_id;
                        tracing::info!(
                            group_id = %group_id,
                            event_type = %event.event_type,
                            "received group update event"
                        );

                        match rooms::create_room_group(&state, group_id).await {
                            Ok((detail, true)) => {
                                publisher::publish_room_created(&state.rabbitmq, &detail.room)
                                    .await;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(error = %e, group_id = %group_id, "group room sync failed");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize group update event");
                    }
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!(error = %e, "failed to ack group update event");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "group update consumer error");
            }
        }
    }

    Ok(())
}
