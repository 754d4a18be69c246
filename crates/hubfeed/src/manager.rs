//! `HubManager` builder and facade.
//!
//! Ties the layers together: registry (who listens to what), supervisor
//! (one connection, reconnect loop) and the hub client behind it.

use std::sync::{Arc, Weak};

use hubfeed_protocol::{ProtocolError, create_signature};
use hubfeed_registry::{Callback, FunctionNameMap, Removal, SubscriptionRegistry, callback};
use hubfeed_supervisor::{
    ConnectionState, ConnectionSupervisor, HubClient, HubConnector, SupervisorConfig,
    is_negative_ack,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::handle::{ConnectionHandle, Release};
use crate::HubfeedError;
#[cfg(feature = "websocket")]
use crate::JsonHubConnector;
#[cfg(feature = "websocket")]
use hubfeed_transport::WebSocketTransport;

/// Hub method that returns an auth challenge for an API key.
pub const GET_AUTH_CONTEXT: &str = "GetAuthContext";
/// Hub method that submits a signed challenge.
pub const AUTHENTICATE: &str = "Authenticate";

/// Builder for a [`HubManager`].
///
/// # Example
///
/// ```rust,ignore
/// let manager = HubManagerBuilder::new()
///     .map_function("ticker_BTCUSD", "SubscribeTicker")
///     .supervisor_config(SupervisorConfig::default())
///     .build(my_connector);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HubManagerBuilder {
    names: FunctionNameMap,
    config: SupervisorConfig,
}

impl HubManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the logical → wire name map.
    pub fn function_names(mut self, names: FunctionNameMap) -> Self {
        self.names = names;
        self
    }

    /// Adds one logical → wire name mapping.
    pub fn map_function(mut self, logical: &str, wire: impl Into<String>) -> Self {
        self.names.insert(logical, wire);
        self
    }

    pub fn supervisor_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds an idle manager around `connector`. Nothing connects yet.
    pub fn build<C: HubConnector>(self, connector: C) -> HubManager<C> {
        let registry = Arc::new(SubscriptionRegistry::new(self.names));
        let supervisor = ConnectionSupervisor::new(connector, registry, self.config);
        HubManager {
            inner: Arc::new(ManagerInner { supervisor }),
        }
    }

    /// Builds a manager using the JSON hub client over a WebSocket.
    #[cfg(feature = "websocket")]
    pub fn websocket(
        self,
        url: impl Into<String>,
    ) -> HubManager<JsonHubConnector<WebSocketTransport>> {
        self.build(JsonHubConnector::new(WebSocketTransport::new(url)))
    }
}

struct ManagerInner<C: HubConnector> {
    supervisor: ConnectionSupervisor<C>,
}

impl<C: HubConnector> Release for ManagerInner<C> {
    fn release(&self, wire_name: &str, callback: &Callback) -> Removal {
        let removal = self.supervisor.registry().remove_wire(wire_name, callback);
        debug!(function = %wire_name, ?removal, "handle released");
        removal
    }

    fn schedule_stop(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, connection left open");
            return;
        };
        let supervisor = self.supervisor.clone();
        runtime.spawn(async move {
            supervisor.stop_if_idle().await;
        });
    }
}

impl<C: HubConnector> Drop for ManagerInner<C> {
    fn drop(&mut self) {
        if !self.supervisor.is_disposed() {
            debug!("hub manager dropped, disposing");
            self.supervisor.dispose();
        }
    }
}

/// Subscription manager over one hub connection.
///
/// Disposes itself when dropped. Handles keep only a weak link back, so
/// they never keep a manager alive.
pub struct HubManager<C: HubConnector> {
    inner: Arc<ManagerInner<C>>,
}

#[cfg(feature = "websocket")]
impl HubManager<JsonHubConnector<WebSocketTransport>> {
    /// A manager with no name mappings speaking JSON hub frames to `url`.
    pub fn websocket(url: impl Into<String>) -> Self {
        HubManagerBuilder::new().websocket(url)
    }
}

impl<C: HubConnector> HubManager<C> {
    /// A manager with default settings and no name mappings.
    pub fn new(connector: C) -> Self {
        HubManagerBuilder::new().build(connector)
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.inner.supervisor
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.subscribe_state()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.supervisor.is_disposed()
    }

    /// Wire names with at least one open handle, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut names = self.inner.supervisor.registry().function_names();
        names.sort();
        names
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Connects now instead of on the first [`open`](Self::open).
    pub async fn start(&self) -> Result<(), HubfeedError> {
        self.inner.supervisor.start().await?;
        Ok(())
    }

    /// Closes the connection. Subscriptions stay registered and are
    /// replayed by the next `start` or `open`.
    pub async fn stop(&self) {
        self.inner.supervisor.stop().await;
    }

    /// Terminal teardown: drops every subscription and the connection.
    /// Later calls fail with [`HubfeedError::Disposed`].
    pub fn dispose(&self) {
        self.inner.supervisor.dispose();
    }

    // -----------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------

    /// Subscribes `f` to `function_name` (a logical or wire name).
    ///
    /// Connects first if needed, registers the callback, then invokes the
    /// subscribe method with `params`. Pushes arrive as decoded text.
    /// Opening the same callback twice under one name yields two handles
    /// for one pair; closing either closes it.
    ///
    /// # Errors
    ///
    /// - [`HubfeedError::SubscriptionRejected`] if the hub answered with a
    ///   negative acknowledgement; nothing stays registered.
    /// - [`HubfeedError::Disposed`] after [`dispose`](Self::dispose).
    /// - A supervisor or hub error if connecting or invoking failed.
    pub async fn open<F>(
        &self,
        function_name: &str,
        f: F,
        params: Vec<Value>,
    ) -> Result<ConnectionHandle, HubfeedError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.open_callback(function_name, callback(f), params).await
    }

    /// Like [`open`](Self::open) with a shared callback, so the same
    /// listener can be registered under several names.
    pub async fn open_callback(
        &self,
        function_name: &str,
        callback: Callback,
        params: Vec<Value>,
    ) -> Result<ConnectionHandle, HubfeedError> {
        let supervisor = &self.inner.supervisor;
        let (client, registration) = supervisor
            .connect_and_register(function_name, callback.clone(), params.clone())
            .await?;

        let owner: Weak<dyn Release> = Arc::downgrade(&self.inner) as Weak<dyn Release>;
        let mut handle = ConnectionHandle::new(registration.wire_name.clone(), callback, owner);

        let wire_name = registration.wire_name.clone();
        let outcome = client.invoke(&wire_name, params).await;
        let rejected = match outcome {
            Ok(ref result) if is_negative_ack(result) => {
                warn!(function = %wire_name, %result, "subscription rejected");
                Some(HubfeedError::SubscriptionRejected {
                    function: wire_name.clone(),
                })
            }
            Ok(_) => None,
            Err(error) => {
                warn!(function = %wire_name, %error, "subscribe invocation failed");
                Some(HubfeedError::Hub(error))
            }
        };

        if let Some(error) = rejected {
            if registration.added {
                self.release_now(&mut handle).await;
            } else {
                // The pair was already open; a rejected repeat must not close it.
                handle.disarm();
            }
            return Err(error);
        }
        info!(function = %wire_name, "subscription opened");
        Ok(handle)
    }

    /// Closes `handle`, waiting for the connection to stop if it was the
    /// last subscription. Never fails.
    pub async fn close(&self, mut handle: ConnectionHandle) {
        self.release_now(&mut handle).await;
    }

    async fn release_now(&self, handle: &mut ConnectionHandle) {
        let Some(removal) = handle.release() else {
            return;
        };
        if removal.emptied_registry() {
            self.inner.supervisor.stop_if_idle().await;
        }
    }

    // -----------------------------------------------------------------
    // Auth pass-throughs
    // -----------------------------------------------------------------

    /// Asks the hub for an auth challenge for `api_key`.
    pub async fn get_auth_context(&self, api_key: &str) -> Result<String, HubfeedError> {
        let client = self.inner.supervisor.ensure_connected().await?;
        let result = client
            .invoke(GET_AUTH_CONTEXT, vec![Value::from(api_key)])
            .await?;
        match result {
            Value::String(challenge) => Ok(challenge),
            other => Err(ProtocolError::InvalidMessage(format!(
                "{GET_AUTH_CONTEXT} returned {other}, expected a string"
            ))
            .into()),
        }
    }

    /// Submits a signed challenge. Returns the hub's verdict.
    pub async fn authenticate(&self, api_key: &str, signature: &str) -> Result<bool, HubfeedError> {
        let client = self.inner.supervisor.ensure_connected().await?;
        let result = client
            .invoke(
                AUTHENTICATE,
                vec![Value::from(api_key), Value::from(signature)],
            )
            .await?;
        result.as_bool().ok_or_else(|| {
            ProtocolError::InvalidMessage(format!(
                "{AUTHENTICATE} returned {result}, expected a boolean"
            ))
            .into()
        })
    }

    /// Fetches a challenge, signs it with `api_secret` and authenticates.
    pub async fn authenticate_with_secret(
        &self,
        api_key: &str,
        api_secret: &str,
    ) -> Result<bool, HubfeedError> {
        let challenge = self.get_auth_context(api_key).await?;
        let signature = create_signature(api_secret, &challenge);
        let accepted = self.authenticate(api_key, &signature).await?;
        info!(accepted, "authentication completed");
        Ok(accepted)
    }
}
