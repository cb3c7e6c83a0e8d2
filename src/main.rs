use axum::{Router, routing::get};
use crmchat::{AppState, chat};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(dotenv::var("DATABASE_URL").unwrap().as_str())
        .await
        .expect("database connection failed");
    info!("database connection successful");

    // Missing schema is fatal here, never a per-request error.
    chat::store::init(&db_pool)
        .await
        .expect("chat table initialization failed");
    info!("database tables initialized");

    let app_state = AppState {
        db_pool,
        presence: chat::presence::Presence::new(),
    };

    let app = Router::new()
        .route("/", get(hello))
        .nest("/api/v1/chat", chat::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let port = dotenv::var("PORT").unwrap_or_else(|_| "3000".to_owned());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .unwrap();
    info!("server is running on port {port}");
    axum::serve(listener, app).await.unwrap();
}

async fn hello() -> &'static str {
    "Welcome to CRM Database API"
}
