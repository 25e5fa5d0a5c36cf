//! Server startup helper for the binary.
//!
//! [`spawn_observer`] binds the port eagerly, so a taken port is reported
//! to the caller, then serves on a background Tokio task alongside the
//! engine's tick task.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the HTTP server and spawn it on a background Tokio task.
///
/// The server runs until the runtime shuts down or the returned handle is
/// aborted.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address is invalid or cannot be
/// bound.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "HTTP server exited with error");
        }
    });

    tracing::info!(port = config.port, "HTTP server spawned on background task");

    Ok(handle)
}
