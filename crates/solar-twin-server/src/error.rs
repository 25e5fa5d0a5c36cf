//! Error types for the server binary.
//!
//! [`AppError`] wraps every failure that can abort startup or shutdown so
//! `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: solar_twin_core::ConfigError,
    },

    /// The HTTP server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: solar_twin_observer::StartupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
