//! Error types for the simulation binary.

/// Top-level error for the binary. `main` propagates it with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: nexus_core::ConfigError,
    },

    /// The simulation could not be built from its configuration.
    #[error("setup error: {source}")]
    Setup {
        /// The underlying setup error.
        #[from]
        source: nexus_core::SetupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The tick loop task ended abnormally.
    #[error("tick loop task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
