//! Routes outbound chat events to the matching registered connections.
//!
//! The registry is copied under its lock and frames are enqueued on each
//! recipient's own outbound queue after the lock is released. Only a
//! connection's writer task ever touches its socket.

use std::sync::Arc;

use super::events::OutboundEvent;
use super::registry::ConnectionRegistry;

/// Outcome of a single `route` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    broadcast_id: String,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, broadcast_id: impl Into<String>) -> Self {
        Self {
            registry,
            broadcast_id: broadcast_id.into(),
        }
    }

    /// Deliver `event` to every connection when `destination` is the
    /// broadcast id, otherwise to every connection registered as
    /// `destination` or as `sender`.
    ///
    /// Best-effort: a failed enqueue is logged and skipped.
    pub fn route(&self, event: &OutboundEvent, destination: &str, sender: &str) -> RouteReport {
        let frame: Arc<str> = match event.to_json() {
            Ok(json) => json.into(),
            Err(err) => {
                tracing::error!(%err, "failed to serialize outbound event");
                return RouteReport::default();
            }
        };

        let broadcast = destination == self.broadcast_id;
        let mut report = RouteReport::default();

        for entry in self.registry.snapshot() {
            if !broadcast && entry.username != destination && entry.username != sender {
                continue;
            }
            match entry.deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        conn_id = %entry.conn_id,
                        username = %entry.username,
                        %err,
                        "delivery failed"
                    );
                }
            }
        }

        tracing::debug!(
            %destination,
            %sender,
            broadcast,
            delivered = report.delivered,
            failed = report.failed,
            "routed chat message"
        );

        report
    }
}
