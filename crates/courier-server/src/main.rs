use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_db::schema;
use courier_messaging::Messaging;

mod gateway;
mod routes;

#[derive(Clone)]
pub struct AppState {
    pub messaging: Messaging,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("COURIER_DB_PATH").unwrap_or_else(|_| "courier.db".into());
    let host = std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = Arc::new(courier_db::Database::open(&PathBuf::from(&db_path))?);

    // Courier-owned deployments provision their store here; the installers
    // are no-ops on a store that already has the tables.
    match std::env::var("COURIER_PROVISION").ok().as_deref() {
        Some("direct") => db.with_conn(|conn| schema::install_direct(conn))?,
        Some("conversation") => db.with_conn(|conn| schema::install_conversation(conn))?,
        Some(other) => anyhow::bail!(
            "COURIER_PROVISION must be 'direct' or 'conversation', got '{}'",
            other
        ),
        None => {}
    }

    // Resolve the store layout once
    let messaging = Messaging::connect(db)?;

    let state = AppState { messaging };

    let app = Router::new()
        .route("/messages", post(routes::send_message))
        .route("/messages/read", post(routes::mark_read))
        .route("/messages/{user_id}/{other_user_id}", get(routes::fetch_messages))
        .route(
            "/messages/{user_id}/{other_user_id}/unread",
            get(routes::unread_count),
        )
        .route("/conversations/{user_id}", get(routes::list_conversations))
        .route("/gateway/{user_id}", get(gateway::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Courier listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
