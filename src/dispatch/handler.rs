//! Application callback interface.

use crate::error::ServerError;

/// Error type handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a task did not complete normally.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Receives tasks from the worker pool.
///
/// `handle` runs on a worker thread, isolated per task: an `Err` or a panic
/// is routed to `on_error` and the worker moves on. The default callbacks
/// only log.
pub trait MessageHandler<T>: Send + Sync + 'static {
    fn handle(&self, task: &T) -> Result<(), BoxError>;

    /// The task could not be queued (dispatch overflow or pool stopped).
    fn on_reject(&self, _task: T) {
        tracing::warn!("Task rejected, dispatch queue is full or stopped");
    }

    /// `handle` returned an error or panicked.
    fn on_error(&self, _task: &T, error: &HandlerError) {
        tracing::error!(error = %error, "Task failed");
    }

    /// A server loop hit an error it survived.
    fn on_failure(&self, error: &ServerError) {
        tracing::error!(error = %error, "Server loop failure");
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
