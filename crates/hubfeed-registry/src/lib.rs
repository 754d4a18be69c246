//! Subscription bookkeeping for hubfeed.
//!
//! Many logical listeners share one physical hub connection. This crate
//! keeps track of who is listening to what and fans pushed messages out:
//!
//! 1. **Naming**: mapping caller-facing names to wire names
//!    ([`FunctionNameMap`])
//! 2. **Registration**: the set of live subscriptions and their callbacks
//!    ([`SubscriptionRegistry`])
//! 3. **Dispatch**: decoding a push and invoking every callback, each in
//!    isolation ([`MessageDispatcher`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Supervisor (above)  ← replays subscriptions, binds push handlers
//!     ↕
//! Registry (this crate)  ← who listens to which wire name
//!     ↕
//! Protocol (below)  ← WireCodec turns pushes into text
//! ```

mod dispatcher;
mod names;
mod registry;
mod subscription;

pub use dispatcher::{DispatchReport, MessageDispatcher};
pub use names::FunctionNameMap;
pub use registry::{Registration, Removal, SubscriptionRegistry};
pub use subscription::{Callback, Subscription, callback};
