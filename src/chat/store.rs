use serde::Serialize;
use sqlx::SqlitePool;

/// A chat row as persisted: append-only, never updated or deleted.
/// `id` and `sent_at` are store-assigned, ascending per insert.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    pub sent_at: String,
}

/// What goes out on the wire: the stored row plus the display fields the
/// send caller supplied. A separate type so decoration never ends up in
/// the table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub sender_name: String,
    pub sender_role: String,
    pub receiver_name: String,
    pub receiver_role: String,
}

/// Runs at startup; the process must not serve without the table.
pub async fn init(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            message TEXT NOT NULL CHECK (message <> ''),
            sent_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%d %H:%M:%f', 'NOW'))
        )",
    )
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Sender and receiver ids are stored as given; whether they name real
/// users is the user directory's problem, not ours.
pub async fn append(
    db_pool: &SqlitePool,
    sender_id: &str,
    receiver_id: &str,
    body: &str,
) -> Result<Message, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO chats (sender_id, receiver_id, message)
         VALUES (?, ?, ?)
         RETURNING id, sender_id, receiver_id, message, sent_at",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(body)
    .fetch_one(db_pool)
    .await
}

/// Full history for the unordered pair, both directions, ascending by
/// send time (id breaks ties within one timestamp tick). Unbounded: no
/// pagination, so very long conversations pay for the whole history on
/// every call.
pub async fn conversation(
    db_pool: &SqlitePool,
    user_a: &str,
    user_b: &str,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, sender_id, receiver_id, message, sent_at FROM chats
         WHERE (sender_id = ? AND receiver_id = ?)
            OR (sender_id = ? AND receiver_id = ?)
         ORDER BY sent_at ASC, id ASC",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .fetch_all(db_pool)
    .await
}
