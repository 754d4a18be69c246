//! Scriptable in-memory hub used by the supervisor tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use hubfeed_supervisor::{ClosedHandler, HubClient, HubConnector, HubError, PushHandler};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Everything the fake hub records, shared by the connector and its clients.
#[derive(Default)]
pub struct HubLog {
    pub created: AtomicUsize,
    pub fail_connects: AtomicUsize,
    pub hang_connects: AtomicBool,
    pub nack: Mutex<HashSet<String>>,
    pub invocations: Mutex<Vec<(String, Vec<Value>)>>,
    pub clients: Mutex<Vec<Arc<ClientState>>>,
}

impl HubLog {
    /// Fails the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn nack_method(&self, method: &str) {
        self.nack.lock().insert(method.to_string());
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Arc<ClientState> {
        Arc::clone(self.clients.lock().last().expect("no client created"))
    }

    pub fn invoked_methods(&self) -> Vec<String> {
        self.invocations.lock().iter().map(|(m, _)| m.clone()).collect()
    }
}

pub struct ClientState {
    pub handlers: Mutex<HashMap<String, PushHandler>>,
    pub on_closed: ClosedHandler,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    pub disposed: AtomicBool,
    log: Arc<HubLog>,
}

impl ClientState {
    /// Delivers a push as the server would.
    pub fn push(&self, event: &str, args: Vec<Value>) {
        let handler = self.handlers.lock().get(&event.to_lowercase()).cloned();
        if let Some(handler) = handler {
            handler(args);
        }
    }

    /// Simulates an unexpected transport loss.
    pub fn drop_connection(&self) {
        (self.on_closed)();
    }

    pub fn bound_events(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

pub struct FakeClient(Arc<ClientState>);

impl std::fmt::Debug for FakeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeClient").finish_non_exhaustive()
    }
}

impl HubClient for FakeClient {
    fn on(&self, event: &str, handler: PushHandler) {
        self.0.handlers.lock().insert(event.to_lowercase(), handler);
    }

    async fn start(&self) -> Result<(), HubError> {
        if self.0.log.hang_connects.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let remaining = self.0.log.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.0.log.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(HubError::Connect("refused".into()));
        }
        self.0.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, HubError> {
        if !self.0.started.load(Ordering::SeqCst) || self.0.is_disposed() {
            return Err(HubError::NotConnected);
        }
        self.0
            .log
            .invocations
            .lock()
            .push((method.to_string(), args));
        if self.0.log.nack.lock().contains(method) {
            Ok(json!(false))
        } else {
            Ok(json!(true))
        }
    }

    async fn stop(&self, _timeout: Duration) {
        self.0.stopped.store(true, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.0.disposed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub log: Arc<HubLog>,
}

impl HubConnector for FakeConnector {
    type Client = FakeClient;

    fn create(&self, on_closed: ClosedHandler) -> FakeClient {
        self.log.created.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(ClientState {
            handlers: Mutex::new(HashMap::new()),
            on_closed,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            log: Arc::clone(&self.log),
        });
        self.log.clients.lock().push(Arc::clone(&state));
        FakeClient(state)
    }
}
