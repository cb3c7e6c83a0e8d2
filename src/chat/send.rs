use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::AppResult;
use crate::chat::presence::Presence;
use crate::chat::store::{self, DeliveredMessage};

/// The send request as it arrives over the socket. Names and roles are
/// taken at the caller's word; only the ids and body are persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_name: String,
    pub sender_id: String,
    pub sender_role: String,
    pub receiver_name: String,
    pub receiver_id: String,
    pub receiver_role: String,
    pub message: String,
}

/// Frames pushed to live connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    NewMessage(DeliveredMessage),
    MessageSent(DeliveredMessage),
    MessageError { error: String },
}

/// Persists the message, then fans the decorated record out to the
/// receiver's connections as `new-message` and the sender's as
/// `message-sent`. Store-first: if the append fails nothing is emitted,
/// so a message that was never durably recorded is never seen by either
/// party. Once persisted, delivery is best-effort; connections missing
/// from the registry at emission time are simply skipped.
pub async fn send(
    db_pool: &SqlitePool,
    presence: &Presence,
    req: SendMessage,
) -> AppResult<DeliveredMessage> {
    let row = store::append(db_pool, &req.sender_id, &req.receiver_id, &req.message).await?;

    let delivered = DeliveredMessage {
        message: row,
        sender_name: req.sender_name,
        sender_role: req.sender_role,
        receiver_name: req.receiver_name,
        receiver_role: req.receiver_role,
    };

    presence.emit(
        &delivered.message.receiver_id,
        &serde_json::to_string(&ServerEvent::NewMessage(delivered.clone()))?,
    );
    presence.emit(
        &delivered.message.sender_id,
        &serde_json::to_string(&ServerEvent::MessageSent(delivered.clone()))?,
    );

    info!(
        sender = %delivered.sender_name,
        sender_role = %delivered.sender_role,
        receiver = %delivered.receiver_name,
        receiver_role = %delivered.receiver_role,
        "message sent"
    );
    Ok(delivered)
}
