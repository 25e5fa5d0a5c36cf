//! HTTP server lifecycle management.
//!
//! [`bind`] claims the TCP port and [`serve`] runs the Axum router on it
//! until the task is aborted or the listener fails. [`start_server`] does
//! both in one call.

use std::net::SocketAddr;
use std::sync::Arc;

use solar_twin_core::config::ServerSettings;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 3001,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
        }
    }
}

impl ServerConfig {
    /// Parse the configured host and port into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is not valid.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))
    }
}

/// Bind the configured TCP address.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is invalid or the port
/// cannot be claimed.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "HTTP server listening");
    Ok(listener)
}

/// Serve requests on an already-bound listener.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the server hits a fatal I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))
}

/// Bind and serve until the process is terminated.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let listener = bind(config).await?;
    serve(listener, state).await
}

/// Errors that can occur when starting or running the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_host_is_a_bind_error() {
        let config = ServerConfig {
            host: String::from("not a host"),
            port: 3001,
        };
        assert!(matches!(config.socket_addr(), Err(ServerError::Bind(_))));
    }

    #[test]
    fn settings_convert() {
        let settings = ServerSettings::default();
        let config = ServerConfig::from(&settings);
        assert_eq!(config.port, 3001);
        assert!(config.socket_addr().is_ok());
    }
}
