use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use sqlx::SqlitePool;

use crate::AppResult;
use crate::chat::store::{self, Message};

/// Whole conversation between the pair, oldest first. Empty when the two
/// have never spoken. The caller is assumed to be authenticated upstream.
#[debug_handler(state = crate::AppState)]
pub async fn messages(
    Path((user_id1, user_id2)): Path<(String, String)>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(
        store::conversation(&db_pool, &user_id1, &user_id2).await?,
    ))
}
