use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::WebSocket},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};

use crate::chat::presence::{ConnId, Presence};
use crate::chat::send::{self, SendMessage, ServerEvent};

/// Frames a client may push over the socket. Anything that does not
/// parse as one of these is dropped.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ClientEvent {
    Join(String),
    SendMessage(SendMessage),
}

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |socket| handle_socket(socket, db_pool, presence).await)
}

/// One connection's whole life: register, forward registry frames out,
/// react to client events, and leave the registry exactly once at the
/// end, however the socket died.
async fn handle_socket(socket: WebSocket, db_pool: SqlitePool, presence: Presence) {
    info!("new client connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = presence.register(tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        handle_frame(&db_pool, &presence, conn_id, &tx, &frame.into_data()).await;
    }

    presence.leave(conn_id);
    writer.abort();
    info!("client disconnected");
}

/// Dispatches one inbound frame. Unparseable frames are skipped; a send
/// whose pipeline fails answers the originating connection, and only it,
/// with a `message-error` frame through `tx`.
async fn handle_frame(
    db_pool: &SqlitePool,
    presence: &Presence,
    conn_id: ConnId,
    tx: &UnboundedSender<String>,
    data: &[u8],
) {
    let Ok(event) = serde_json::from_slice::<ClientEvent>(data) else {
        return;
    };

    match event {
        ClientEvent::Join(user_id) => {
            presence.join(&user_id, conn_id);
            info!(%user_id, "user joined");
        }
        ClientEvent::SendMessage(req) => {
            if let Err(err) = send::send(db_pool, presence, req).await {
                warn!(error = %err.0, "error sending message");
                let event = ServerEvent::MessageError {
                    error: "Failed to send message".to_owned(),
                };
                if let Ok(frame) = serde_json::to_string(&event) {
                    let _ = tx.send(frame);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::chat::store;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        store::init(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn garbage_frame_is_skipped() {
        let pool = test_pool().await;
        let presence = Presence::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = presence.register(tx.clone());

        handle_frame(&pool, &presence, conn_id, &tx, b"not json").await;
        handle_frame(&pool, &presence, conn_id, &tx, b"{\"event\":\"nope\"}").await;

        assert!(rx.try_recv().is_err());
        assert!(store::conversation(&pool, "u1", "u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_frame_registers_membership() {
        let pool = test_pool().await;
        let presence = Presence::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn_id = presence.register(tx.clone());

        handle_frame(&pool, &presence, conn_id, &tx, b"{\"event\":\"join\",\"data\":\"u1\"}")
            .await;

        assert!(presence.members_of("u1").contains(&conn_id));
    }

    #[tokio::test]
    async fn failed_send_answers_origin_with_message_error() {
        let pool = test_pool().await;
        let presence = Presence::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = presence.register(tx.clone());
        presence.join("u1", conn_id);
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        let other = presence.register(other_tx);
        presence.join("u2", other);

        pool.close().await;
        let frame = br#"{"event":"send-message","data":{
            "senderName":"u1 name","senderId":"u1","senderRole":"employee",
            "receiverName":"u2 name","receiverId":"u2","receiverRole":"manager",
            "message":"lost"}}"#;
        handle_frame(&pool, &presence, conn_id, &tx, frame).await;

        let reply: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(reply["event"], "message-error");
        assert_eq!(reply["data"]["error"], "Failed to send message");
        assert!(rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }
}
