//! Unified error type for hubfeed.

use hubfeed_protocol::ProtocolError;
use hubfeed_supervisor::{HubError, SupervisorError};
use hubfeed_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum HubfeedError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (frame encoding, unexpected result shape).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The hub client failed an invocation.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The connection could not be established.
    #[error(transparent)]
    Supervisor(SupervisorError),

    /// The hub answered a subscribe call with a negative acknowledgement.
    #[error("subscription to {function} was rejected")]
    SubscriptionRejected { function: String },

    /// The manager has been disposed.
    #[error("hub manager has been disposed")]
    Disposed,
}

impl From<SupervisorError> for HubfeedError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Disposed => HubfeedError::Disposed,
            other => HubfeedError::Supervisor(other),
        }
    }
}
