//! HTTP surface of the orchestrator.
//!
//! Lifecycle operations answer with a server-sent event stream: one `data:`
//! line of JSON per feed event, ending with exactly one `error` or `status`
//! event. Everything else is plain JSON.

mod error;
mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;
use crate::lifecycle::LifecycleController;

pub use error::status_for;
pub use routes::{RemoveParams, RenderResponse};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Lifecycle controller, which also owns the session store.
    pub controller: Arc<LifecycleController>,
}

impl AppState {
    /// Wraps a controller.
    #[must_use]
    pub const fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/render", post(routes::render))
        .route(
            "/sessions",
            post(routes::create_session).get(routes::list_sessions),
        )
        .route("/sessions/{id}", axum::routing::delete(routes::remove_session))
        .route("/sessions/{id}/init", post(routes::init))
        .route("/sessions/{id}/plan", post(routes::plan))
        .route("/sessions/{id}/apply", post(routes::apply))
        .route("/sessions/{id}/destroy", post(routes::destroy))
        .route("/sessions/{id}/status", get(routes::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the HTTP service until interrupted.
///
/// # Errors
///
/// Returns an error if the workspace cannot be created or the listen
/// address cannot be bound.
pub async fn serve(settings: &Settings) -> Result<()> {
    tokio::fs::create_dir_all(&settings.workspace_root).await?;
    let controller = Arc::new(LifecycleController::from_settings(settings));
    let app = router(AppState::new(controller));

    let listener = TcpListener::bind(&settings.listen).await?;
    info!(
        "Serving on {} (tool: {}, workspace: {})",
        listener.local_addr()?,
        settings.tool,
        settings.workspace_root.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
