//! The connection supervisor.
//!
//! Owns the one physical hub connection and replaces it wholesale on every
//! (re)connect. Three locks/flags cooperate:
//!
//! - `connect_lock` (async) serializes connect, stop and register so a
//!   first subscriber's connect is paid once and a concurrent stop can
//!   never tear down a connection someone is about to use;
//! - `current` (sync, never held across `.await`) holds the live client
//!   and its generation;
//! - `reconnecting` guarantees at most one background reconnect loop.
//!
//! Close notifications carry the generation of the connection that raised
//! them. Only the live generation counts; anything else is a connection
//! that was already replaced, stopped or disposed.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use hubfeed_registry::{Callback, MessageDispatcher, Registration, SubscriptionRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time;
use tracing::{debug, info, warn};

use crate::hub::{ClosedHandler, HubClient, HubConnector, PushHandler, is_negative_ack};
use crate::{ConnectionState, HubError, SupervisorConfig, SupervisorError};

struct Current<T> {
    client: Arc<T>,
    generation: u64,
}

struct Inner<C: HubConnector> {
    connector: C,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: MessageDispatcher,
    config: SupervisorConfig,
    connect_lock: AsyncMutex<()>,
    current: Mutex<Option<Current<C::Client>>>,
    state: watch::Sender<ConnectionState>,
    /// Last generation handed out.
    generation: AtomicU64,
    /// Generation whose close notification is honored; 0 = none.
    live_generation: AtomicU64,
    reconnecting: AtomicBool,
    /// Set by `stop()`, cleared by the next connect attempt.
    stopped: AtomicBool,
    disposed: AtomicBool,
    attempts: AtomicU32,
}

/// Keeps one hub connection alive while anyone is subscribed.
///
/// Cheap to clone; clones share the same connection.
pub struct ConnectionSupervisor<C: HubConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: HubConnector> Clone for ConnectionSupervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: HubConnector> fmt::Debug for ConnectionSupervisor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("subscriptions", &self.inner.registry.len())
            .finish()
    }
}

impl<C: HubConnector> ConnectionSupervisor<C> {
    /// Creates an idle supervisor. Nothing connects until
    /// [`start`](Self::start) or the first registration.
    pub fn new(
        connector: C,
        registry: Arc<SubscriptionRegistry>,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let dispatcher = MessageDispatcher::new(Arc::clone(&registry));
        Self {
            inner: Arc::new(Inner {
                connector,
                registry,
                dispatcher,
                config: config.validated(),
                connect_lock: AsyncMutex::new(()),
                current: Mutex::new(None),
                state,
                generation: AtomicU64::new(0),
                live_generation: AtomicU64::new(0),
                reconnecting: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
            }),
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Generation of the live connection, or 0 when there is none.
    pub fn generation(&self) -> u64 {
        self.inner.live_generation.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Returns `true` while a reconnect loop is running.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::SeqCst)
    }

    /// Connect attempts made by the current or most recent reconnect loop.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// The live client, if connected.
    pub fn client(&self) -> Option<Arc<C::Client>> {
        self.inner
            .current
            .lock()
            .as_ref()
            .map(|c| Arc::clone(&c.client))
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Establishes a fresh connection, disposing any previous one first.
    ///
    /// Binds push handlers for every known wire name and, once the hub is
    /// ready, replays a subscribe invoke for every registered subscription.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::ConnectFailure`] if the connect attempt fails or
    /// times out, [`SupervisorError::Disposed`] after [`dispose`](Self::dispose).
    /// A failure during an outage leaves the running reconnect loop in
    /// charge.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let _guard = self.inner.connect_lock.lock().await;
        self.connect_locked(self.connect_mode()).await.map(|_| ())
    }

    /// Returns the live client, connecting first if there is none.
    ///
    /// The caller waits for the whole connect attempt.
    pub async fn ensure_connected(&self) -> Result<Arc<C::Client>, SupervisorError> {
        let _guard = self.inner.connect_lock.lock().await;
        self.ensure_connected_locked().await
    }

    /// Connects if needed, then registers `callback` under `function_name`.
    ///
    /// Both steps run under the connect lock, so a stop scheduled by a
    /// concurrent last-close either runs first (and this call reconnects)
    /// or sees the new registration and leaves the connection alone.
    pub async fn connect_and_register(
        &self,
        function_name: &str,
        callback: Callback,
        params: Vec<Value>,
    ) -> Result<(Arc<C::Client>, Registration), SupervisorError> {
        let _guard = self.inner.connect_lock.lock().await;
        let client = self.ensure_connected_locked().await?;

        let registration = self.inner.registry.add(function_name, callback.clone(), params);
        if self.is_disposed() {
            self.inner.registry.remove_wire(&registration.wire_name, &callback);
            return Err(SupervisorError::Disposed);
        }

        // Mapped names were bound at connect time.
        if registration.created
            && !self
                .inner
                .registry
                .names()
                .wire_names()
                .contains(&registration.wire_name)
        {
            client.on(
                &registration.wire_name,
                push_handler(self.inner.dispatcher.clone(), registration.wire_name.clone()),
            );
        }
        Ok((client, registration))
    }

    /// Closes the connection gracefully, waiting at most the stop grace.
    ///
    /// Not terminal: a later [`start`](Self::start) is legal. Ends a running
    /// reconnect loop.
    pub async fn stop(&self) {
        let _guard = self.inner.connect_lock.lock().await;
        self.stop_locked().await;
    }

    /// Stops the connection only if the registry is empty.
    ///
    /// Returns `true` if it stopped.
    pub async fn stop_if_idle(&self) -> bool {
        let _guard = self.inner.connect_lock.lock().await;
        if !self.inner.registry.is_empty() {
            debug!("subscriptions re-added, keeping connection");
            return false;
        }
        self.stop_locked().await;
        true
    }

    /// Terminal teardown.
    ///
    /// Clears the registry and disposes the live client without waiting.
    /// A connect already in flight finishes, sees the flag and disposes its
    /// own client; a sleeping reconnect loop wakes and exits.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.state.send_replace(ConnectionState::Disposed);
        self.inner.registry.clear();
        self.inner.live_generation.store(0, Ordering::SeqCst);

        let taken = self.inner.current.lock().take();
        if let Some(current) = taken {
            current.client.dispose();
        }
        info!("connection supervisor disposed");
    }

    /// Reports that the live connection dropped unexpectedly.
    ///
    /// Hub clients call this through the [`ClosedHandler`] they were
    /// created with. No-op when the registry is empty or a reconnect loop
    /// is already running; otherwise starts one in the background.
    pub fn notify_closed(&self) {
        match self.generation() {
            0 => self.handle_closed(None),
            live => self.handle_closed(Some(live)),
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn set_state(&self, next: ConnectionState) {
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "connection state changed");
            *state = next;
            true
        });
    }

    async fn ensure_connected_locked(&self) -> Result<Arc<C::Client>, SupervisorError> {
        if self.is_disposed() {
            return Err(SupervisorError::Disposed);
        }
        if let Some(client) = self.client() {
            return Ok(client);
        }
        self.connect_locked(self.connect_mode()).await
    }

    fn connect_mode(&self) -> ConnectionState {
        if self.is_reconnecting() {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        }
    }

    /// One connect attempt. Caller holds `connect_lock`.
    async fn connect_locked(
        &self,
        mode: ConnectionState,
    ) -> Result<Arc<C::Client>, SupervisorError> {
        let inner = &self.inner;
        if self.is_disposed() {
            return Err(SupervisorError::Disposed);
        }

        inner.stopped.store(false, Ordering::SeqCst);

        // Retire the old generation before tearing its client down.
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.live_generation.store(generation, Ordering::SeqCst);
        let previous = inner.current.lock().take();
        if let Some(previous) = previous {
            debug!(generation = previous.generation, "disposing previous connection");
            previous.client.dispose();
        }
        self.set_state(mode);

        let client = Arc::new(inner.connector.create(self.closed_handler(generation)));
        self.bind_handlers(client.as_ref());

        let timeout = inner.config.connect_timeout;
        let started = match time::timeout(timeout, client.start()).await {
            Ok(result) => result,
            Err(_) => Err(HubError::Timeout(timeout)),
        };
        if let Err(error) = started {
            let _ = inner.live_generation.compare_exchange(
                generation,
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            client.dispose();
            if mode == ConnectionState::Connecting {
                self.set_state(ConnectionState::Idle);
            }
            warn!(generation, %error, "hub connect failed");
            return Err(SupervisorError::ConnectFailure(error));
        }

        {
            let mut current = inner.current.lock();
            if self.is_disposed() {
                drop(current);
                client.dispose();
                return Err(SupervisorError::Disposed);
            }
            // Dropped between ready and here; the close handler has taken over.
            if self.generation() != generation {
                drop(current);
                client.dispose();
                return Err(SupervisorError::ConnectFailure(HubError::Closed));
            }
            *current = Some(Current {
                client: Arc::clone(&client),
                generation,
            });
        }
        self.replay(client.as_ref()).await;
        // Lost again during replay: the close handler already took over.
        if self.generation() == generation {
            self.set_state(ConnectionState::Connected);
            info!(generation, "hub connected");
        }
        Ok(client)
    }

    fn bind_handlers(&self, client: &C::Client) {
        let registry = &self.inner.registry;
        let mut names: BTreeSet<String> = registry.names().wire_names();
        names.extend(registry.function_names());
        for name in names {
            client.on(
                &name,
                push_handler(self.inner.dispatcher.clone(), name.clone()),
            );
        }
    }

    async fn replay(&self, client: &C::Client) {
        let subscriptions = self.inner.registry.snapshot();
        if subscriptions.is_empty() {
            return;
        }
        info!(count = subscriptions.len(), "replaying subscriptions");
        for subscription in subscriptions {
            let function = subscription.function_name();
            match client.invoke(function, subscription.params().to_vec()).await {
                Ok(result) if is_negative_ack(&result) => {
                    warn!(%function, %result, "subscription replay rejected");
                }
                Ok(_) => debug!(%function, "subscription replayed"),
                Err(error) => warn!(%function, %error, "subscription replay failed"),
            }
        }
    }

    /// Caller holds `connect_lock`.
    async fn stop_locked(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.live_generation.store(0, Ordering::SeqCst);
        let taken = self.inner.current.lock().take();
        self.set_state(ConnectionState::Idle);

        let Some(current) = taken else {
            return;
        };
        let grace = self.inner.config.stop_grace;
        if time::timeout(grace, current.client.stop(grace)).await.is_err() {
            warn!(generation = current.generation, ?grace, "hub did not stop within grace period");
        }
        current.client.dispose();
        info!(generation = current.generation, "hub connection stopped");
    }

    fn closed_handler(&self, generation: u64) -> ClosedHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                ConnectionSupervisor { inner }.handle_closed(Some(generation));
            }
        })
    }

    fn handle_closed(&self, generation: Option<u64>) {
        if self.is_disposed() {
            return;
        }
        if let Some(generation) = generation {
            let live = self.inner.live_generation.compare_exchange(
                generation,
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            if live.is_err() {
                debug!(generation, "close from a retired connection ignored");
                return;
            }
            let lost = {
                let mut current = self.inner.current.lock();
                if current.as_ref().is_some_and(|c| c.generation == generation) {
                    current.take()
                } else {
                    None
                }
            };
            if let Some(lost) = lost {
                lost.client.dispose();
            }
            info!(generation, "hub connection lost");
        }

        if self.inner.registry.is_empty() {
            self.set_state(ConnectionState::Idle);
            debug!("no subscriptions, not reconnecting");
            return;
        }
        self.set_state(ConnectionState::Reconnecting);
        self.spawn_reconnect();
    }

    fn spawn_reconnect(&self) {
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("reconnect already in progress");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime available, cannot reconnect");
            self.inner.reconnecting.store(false, Ordering::SeqCst);
            return;
        };
        let supervisor = self.clone();
        runtime.spawn(async move { supervisor.reconnect_loop().await });
    }

    async fn reconnect_loop(self) {
        let inner = &self.inner;
        inner.attempts.store(0, Ordering::SeqCst);
        let mut state_rx = inner.state.subscribe();
        info!("reconnect loop started");

        loop {
            if self.is_disposed() {
                break;
            }
            if inner.registry.is_empty() {
                self.set_state(ConnectionState::Idle);
                info!("no subscriptions left, reconnect loop ends");
                break;
            }
            if inner.stopped.load(Ordering::SeqCst) {
                info!("connection stopped, reconnect loop ends");
                break;
            }

            let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.reconnect_once().await {
                Ok(()) => {
                    info!(attempt, "reconnected");
                    break;
                }
                Err(SupervisorError::Disposed) => break,
                Err(error) => {
                    let delay = inner.config.next_retry_delay();
                    warn!(attempt, %error, ?delay, "reconnect attempt failed, retrying");
                    sleep_unless_disposed(&mut state_rx, delay).await;
                }
            }
        }

        inner.reconnecting.store(false, Ordering::SeqCst);
        // A loss raised while the flag was still set would otherwise be missed.
        if !self.is_disposed()
            && self.state() == ConnectionState::Reconnecting
            && self.client().is_none()
        {
            self.spawn_reconnect();
        }
    }

    async fn reconnect_once(&self) -> Result<(), SupervisorError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.client().is_some() {
            // Someone else connected while we slept.
            self.set_state(ConnectionState::Connected);
            return Ok(());
        }
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.connect_locked(ConnectionState::Reconnecting)
            .await
            .map(|_| ())
    }
}

/// Sleeps for `delay`, returning early if the supervisor is disposed.
async fn sleep_unless_disposed(
    state_rx: &mut watch::Receiver<ConnectionState>,
    delay: Duration,
) {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return,
            changed = state_rx.changed() => {
                if changed.is_err() || state_rx.borrow().is_terminal() {
                    return;
                }
            }
        }
    }
}

fn push_handler(dispatcher: MessageDispatcher, wire_name: String) -> PushHandler {
    Arc::new(move |args: Vec<Value>| {
        let Some(payload) = args.iter().find_map(Value::as_str) else {
            warn!(function = %wire_name, "push without a string payload dropped");
            return;
        };
        match dispatcher.dispatch(&wire_name, payload) {
            Ok(report) => debug!(
                function = %wire_name,
                delivered = report.delivered,
                failed = report.failed,
                "push dispatched"
            ),
            Err(error) => warn!(function = %wire_name, %error, "undecodable push dropped"),
        }
    })
}
