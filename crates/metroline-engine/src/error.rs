//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup, the run loop
//! and snapshot persistence, so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: metroline_core::ConfigError,
    },

    /// The session could not be created or restored.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: metroline_core::SessionError,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot encoding error: {source}")]
    Snapshot {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// A snapshot file could not be read or written.
    #[error("snapshot I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The background snapshot writer stopped unexpectedly.
    #[error("snapshot writer error: {message}")]
    Writer {
        /// Description of the failure.
        message: String,
    },
}
