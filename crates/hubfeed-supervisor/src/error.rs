//! Error types for the hub contract and the supervisor.

use std::time::Duration;

/// Failures reported by a [`HubClient`](crate::HubClient).
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// The connection (or its handshake) could not be established.
    #[error("hub connect failed: {0}")]
    Connect(String),

    /// The server answered an invocation with an error.
    #[error("invocation of {method} failed: {reason}")]
    Invocation { method: String, reason: String },

    /// The client has no live connection.
    #[error("hub client is not connected")]
    NotConnected,

    /// The operation did not finish in time.
    #[error("hub operation timed out after {0:?}")]
    Timeout(Duration),

    /// The connection closed while the operation was pending.
    #[error("hub connection closed")]
    Closed,
}

/// Errors returned by [`ConnectionSupervisor`](crate::ConnectionSupervisor).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SupervisorError {
    /// A connect attempt failed.
    #[error("connect failed: {0}")]
    ConnectFailure(#[source] HubError),

    /// The supervisor has been disposed; nothing can be started again.
    #[error("supervisor has been disposed")]
    Disposed,
}
