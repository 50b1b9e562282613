//! Server-level errors.

use std::io;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;

/// Failures starting the server or running one of its loops.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("loop '{name}' panicked: {message}")]
    LoopPanicked { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
