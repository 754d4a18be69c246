//! Routes decoded push payloads to registered callbacks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hubfeed_protocol::{DecodeError, WireCodec};

use crate::SubscriptionRegistry;

/// Outcome of one [`MessageDispatcher::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

impl DispatchReport {
    /// Total callbacks invoked.
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Decodes pushes and fans them out to the registry's callbacks.
///
/// The callback list is snapshotted under the registry lock and invoked
/// after it is released, so a callback may freely open or close handles.
/// A panicking callback is logged and skipped; the rest still run.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    registry: Arc<SubscriptionRegistry>,
    codec: WireCodec,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            codec: WireCodec,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Decodes `payload` and delivers it to every callback of `wire_name`.
    ///
    /// Pushes for unknown functions are dropped (an empty report). On a
    /// decode failure no callback runs.
    pub fn dispatch(
        &self,
        wire_name: &str,
        payload: &str,
    ) -> Result<DispatchReport, DecodeError> {
        let Some(callbacks) = self.registry.callbacks(wire_name) else {
            tracing::trace!(function = %wire_name, "push for unknown function dropped");
            return Ok(DispatchReport::default());
        };

        let text = self.codec.decode(payload)?;
        Ok(self.deliver(wire_name, &callbacks, &text))
    }

    fn deliver(
        &self,
        wire_name: &str,
        callbacks: &[crate::Callback],
        text: &str,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for cb in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| cb(text))) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(function = %wire_name, "subscription callback panicked");
                }
            }
        }
        report
    }
}

// =========================================================================
// Tests
// =========================================================================
