//! The contract a hub client must satisfy.
//!
//! A hub client owns one physical connection: it registers push handlers
//! by event name, starts the connection, performs request/response
//! invocations, and reports an unexpected loss through the
//! [`ClosedHandler`] it was created with. The supervisor never sees
//! frames or sockets; `hubfeed::JsonHubClient` is the bundled
//! implementation and tests plug in in-memory fakes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::HubError;

/// Receives the arguments of a server push.
pub type PushHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Raised by a hub client when its connection drops without a `stop`.
pub type ClosedHandler = Arc<dyn Fn() + Send + Sync>;

/// One physical hub connection.
///
/// Clients are single-use: the supervisor creates a fresh one for every
/// (re)connect and disposes the old one, never restarting it.
pub trait HubClient: Send + Sync + 'static {
    /// Registers a handler for pushes named `event` (case-insensitive).
    ///
    /// Called before [`start`](Self::start) for every known wire name;
    /// handlers added later apply to subsequent pushes.
    fn on(&self, event: &str, handler: PushHandler);

    /// Establishes the connection. Resolves once the hub is ready.
    fn start(&self) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Invokes `method` and awaits its result.
    fn invoke(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, HubError>> + Send;

    /// Closes the connection gracefully, waiting at most `timeout`.
    ///
    /// Must not raise the closed notification.
    fn stop(&self, timeout: Duration) -> impl Future<Output = ()> + Send;

    /// Releases everything immediately. Idempotent.
    fn dispose(&self);
}

/// Creates hub clients bound to one endpoint.
pub trait HubConnector: Send + Sync + 'static {
    type Client: HubClient;

    /// Creates an unstarted client that calls `on_closed` on unexpected loss.
    fn create(&self, on_closed: ClosedHandler) -> Self::Client;
}

/// Returns `true` if a subscribe result is a negative acknowledgement.
///
/// A NACK is JSON `false`, or an object whose `"success"` field is
/// `false`. Anything else, `null` included, counts as accepted.
pub fn is_negative_ack(result: &Value) -> bool {
    match result {
        Value::Bool(accepted) => !accepted,
        Value::Object(fields) => fields.get("success") == Some(&Value::Bool(false)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_is_negative_ack_false_rejects() {
        assert!(is_negative_ack(&json!(false)));
        assert!(is_negative_ack(&json!({"success": false, "reason": "no"})));
    }

    #[test]
    fn test_is_negative_ack_other_values_accept() {
        for v in [
            json!(true),
            json!(null),
            json!("ok"),
            json!({"success": true}),
            json!({}),
            json!(0),
        ] {
            assert!(!is_negative_ack(&v), "{v} should be accepted");
        }
    }
}
