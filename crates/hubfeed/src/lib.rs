//! # hubfeed
//!
//! Client-side manager for hub-style RPC connections: subscribe to
//! server-pushed events (market-data ticks, order updates) and invoke
//! request/response methods (authentication) over one persistent
//! connection that reconnects by itself.
//!
//! The caller opens subscriptions and gets back a [`ConnectionHandle`];
//! dropping or closing the handle unsubscribes exactly that listener. The
//! first subscriber pays for connecting, the last one to leave stops the
//! connection, and a lost connection is re-established in the background
//! with every live subscription replayed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hubfeed::prelude::*;
//!
//! # async fn run() -> Result<(), HubfeedError> {
//! let manager = HubManagerBuilder::new()
//!     .map_function("ticker", "SubscribeToExchangeDeltas")
//!     .websocket("https://hub.example.com/c2");
//!
//! let handle = manager
//!     .open("ticker", |json| println!("{json}"), vec!["BTC-USD".into()])
//!     .await?;
//!
//! // ... later
//! manager.close(handle).await;
//! manager.dispose();
//! # Ok(())
//! # }
//! ```

mod error;
mod handle;
mod json_hub;
mod logging;
mod manager;

pub use error::HubfeedError;
pub use handle::ConnectionHandle;
pub use json_hub::{JsonHubClient, JsonHubConfig, JsonHubConnector};
pub use logging::init_tracing;
pub use manager::{HubManager, HubManagerBuilder};

pub use hubfeed_protocol::{WireCodec, create_signature};
pub use hubfeed_registry::{Callback, FunctionNameMap, callback};
pub use hubfeed_supervisor::{
    ClosedHandler, ConnectionState, HubClient, HubConnector, HubError, PushHandler,
    SupervisorConfig,
};
pub use hubfeed_transport::{Connection, Transport};
#[cfg(feature = "websocket")]
pub use hubfeed_transport::WebSocketTransport;

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{
        ConnectionHandle, ConnectionState, FunctionNameMap, HubManager, HubManagerBuilder,
        HubfeedError, SupervisorConfig, callback, init_tracing,
    };
}
