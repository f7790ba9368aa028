// ABOUTME: Outbound notification transports that receive every published event as JSON.
// ABOUTME: Transports are fire-and-forget; the tracing transport ships events to the log.

use serde_json::Value;

/// Publish/subscribe channel outside the process (websocket rooms, a message bus...).
///
/// Must not block; delivery problems are the transport's to log and drop.
pub trait NotificationTransport: Send + Sync {
    fn publish(&self, topic: &str, payload: &Value);
}

/// Writes each event to the `ccdeploy::notify` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

impl NotificationTransport for TracingTransport {
    fn publish(&self, topic: &str, payload: &Value) {
        tracing::info!(target: "ccdeploy::notify", topic, %payload, "progress");
    }
}
