//! Error types for kauth

use std::io;

use thiserror::Error;

/// Result type alias for kauth
pub type Result<T> = std::result::Result<T, Error>;

/// kauth errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The local callback listener could not bind its port
    #[error("Failed to start callback listener on {addr}: {source}")]
    ListenerBindFailed {
        /// Address we tried to bind
        addr: String,
        /// Underlying bind error
        #[source]
        source: io::Error,
    },

    /// The default browser could not be opened
    #[error("Failed to open browser: {0}")]
    BrowserLaunchFailed(String),

    /// Reading or writing the client configuration failed
    #[error("Client configuration {path}: {message}")]
    ConfigIoFailed {
        /// Path of the configuration document
        path: String,
        /// What went wrong
        message: String,
    },

    /// The kubeconfig context name we would create is already used for
    /// another cluster
    #[error(
        "kubeconfig context {context:?} already refers to cluster {cluster:?}; \
         pass --cluster {cluster:?} or choose a cluster name not used as a context name \
         (requested {requested:?})"
    )]
    ContextConflict {
        /// Existing context name
        context: String,
        /// Cluster that context references
        cluster: String,
        /// Cluster we were asked to add
        requested: String,
    },

    /// The browser flow did not deliver credentials in time
    #[error("Timed out after {0:?} waiting for the browser login to complete")]
    CallbackTimeout(std::time::Duration),

    /// The callback request arrived without usable credentials
    #[error("Login callback failed: {0}")]
    Callback(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::ConfigIoFailed`] for the given path
    pub fn config_io(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::ConfigIoFailed {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}
