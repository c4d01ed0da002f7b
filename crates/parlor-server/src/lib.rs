pub mod config;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use parlor_api::{AppStateInner, ENVELOPE_HEADROOM};
use parlor_db::durability::{DurabilityTimer, IntervalClock};
use parlor_db::{CredentialStore, Database, TimelineStore};
use parlor_gateway::Dispatcher;
use parlor_gateway::connection;

use crate::config::Config;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    max_message_bytes: usize,
}

/// All routes: the `/ws` gateway, the HTTP API, and static files from
/// `static_dir` if given.
pub fn build_router(dispatcher: Dispatcher, max_body_bytes: usize, static_dir: Option<&Path>) -> Router {
    let api_state = Arc::new(AppStateInner::new(dispatcher.clone()));

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(ServerState {
            dispatcher,
            max_message_bytes: max_body_bytes,
        });

    let mut app = Router::new()
        .merge(parlor_api::router(api_state, max_body_bytes))
        .merge(ws_route);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let limit = state.max_message_bytes + ENVELOPE_HEADROOM;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher))
}

/// Bind the configured address and serve until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Chat server running on {}", addr);
    info!("Local access: http://localhost:{}", addr.port());

    serve(config, listener, shutdown_signal()).await
}

/// Open the database and serve on `listener` until `signal` completes.
///
/// Shutdown runs in order: the gateway stops taking commands, HTTP
/// requests drain, connection tasks finish, and only then does the
/// durability timer write its final flush.
pub async fn serve<F>(config: Config, listener: TcpListener, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let db = Arc::new(Database::open(&config.db_path)?);
    let (users, entries) = db.counts()?;
    info!("Database ready: {} users, {} timeline entries", users, entries);

    let dispatcher = Dispatcher::new(
        CredentialStore::new(db.clone()),
        TimelineStore::new(db.clone()),
    );

    let flush_shutdown = CancellationToken::new();
    let timer = tokio::spawn(
        DurabilityTimer::new(db.clone(), IntervalClock::new(config.flush_interval))
            .run(flush_shutdown.clone()),
    );

    let static_dir = config.static_dir.is_dir().then_some(config.static_dir.as_path());
    match static_dir {
        Some(dir) => info!("Serving static files from {}", dir.display()),
        None => info!("Static directory {} not found, serving API only", config.static_dir.display()),
    }
    let app = build_router(dispatcher.clone(), config.max_body_bytes, static_dir);

    let gateway = dispatcher.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Closing gateway");
            gateway.close();
        })
        .await;

    // Covers the case where serve returned on its own.
    dispatcher.close();
    dispatcher.wait_closed().await;

    flush_shutdown.cancel();
    timer.await?;
    served?;
    info!("Server closed");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down gracefully...");
    }
}
