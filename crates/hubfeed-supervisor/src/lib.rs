//! Connection lifecycle for hubfeed.
//!
//! This crate keeps exactly one hub connection alive for as long as anyone
//! is subscribed:
//!
//! 1. **Hub contract**: what a hub client must offer ([`HubClient`],
//!    [`HubConnector`])
//! 2. **Supervision**: connect, stop, dispose, and the background
//!    reconnect loop that replays every subscription after a drop
//!    ([`ConnectionSupervisor`])
//! 3. **State**: an observable [`ConnectionState`] with `Disposed` as a
//!    terminal state
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)      ← HubManager: Open/Close handles, auth pass-throughs
//!     ↕
//! Supervisor (this crate)  ← one physical connection, reconnect loop
//!     ↕
//! Registry (below)    ← subscriptions to replay, dispatcher for pushes
//! ```

mod config;
mod error;
mod hub;
mod state;
mod supervisor;

pub use config::SupervisorConfig;
pub use error::{HubError, SupervisorError};
pub use hub::{ClosedHandler, HubClient, HubConnector, PushHandler, is_negative_ack};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
