pub mod presence;
pub mod send;
pub mod store;

mod history;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/{user_id1}/{user_id2}", get(history::messages))
        .route("/ws", get(ws::chat_ws))
}
