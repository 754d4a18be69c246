//! In-memory hub for the manager tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use hubfeed::{ClosedHandler, HubClient, HubConnector, HubError, PushHandler};
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Default)]
pub struct HubLog {
    pub created: AtomicUsize,
    pub fail_connects: AtomicUsize,
    pub nack: Mutex<HashSet<String>>,
    pub responses: Mutex<HashMap<String, Value>>,
    pub invocations: Mutex<Vec<(String, Vec<Value>)>>,
    pub clients: Mutex<Vec<Arc<ClientState>>>,
}

impl HubLog {
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn nack_method(&self, method: &str) {
        self.nack.lock().insert(method.to_string());
    }

    /// Scripts the result `method` returns.
    pub fn respond(&self, method: &str, result: Value) {
        self.responses.lock().insert(method.to_string(), result);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Arc<ClientState> {
        Arc::clone(self.clients.lock().last().expect("no client created"))
    }

    pub fn invocations(&self) -> Vec<(String, Vec<Value>)> {
        self.invocations.lock().clone()
    }
}

pub struct ClientState {
    handlers: Mutex<HashMap<String, PushHandler>>,
    on_closed: ClosedHandler,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    pub disposed: AtomicBool,
    log: Arc<HubLog>,
}

impl ClientState {
    pub fn push(&self, event: &str, payload: &str) {
        let handler = self.handlers.lock().get(&event.to_lowercase()).cloned();
        if let Some(handler) = handler {
            handler(vec![json!(payload)]);
        }
    }

    pub fn drop_connection(&self) {
        (self.on_closed)();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

pub struct FakeClient(Arc<ClientState>);

impl HubClient for FakeClient {
    fn on(&self, event: &str, handler: PushHandler) {
        self.0.handlers.lock().insert(event.to_lowercase(), handler);
    }

    async fn start(&self) -> Result<(), HubError> {
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
        let log = &self.0.log;
        log.invocations.lock().push((method.to_string(), args));
        if log.nack.lock().contains(method) {
            return Ok(json!(false));
        }
        Ok(log.responses.lock().get(method).cloned().unwrap_or(json!(true)))
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
