//! Per-connection chat session state machine.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::identity::{Identity, IdentityResolver};

use super::error::GatewayError;
use super::events::{InboundEvent, OutboundEvent};
use super::fanout::MessageRouter;
use super::registry::{CloseSignal, ConnectionId, ConnectionRegistry, Frame};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConnect,
    Active(Identity),
    Closed,
}

/// Whether the read loop should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// State for a single chat connection.
///
/// Owns the strong end of the connection's outbound queue. The registry only
/// ever sees a weak handle, so dropping the session lets the writer finish.
pub struct ConnectionSession {
    conn_id: ConnectionId,
    state: SessionState,
    outbound: mpsc::Sender<Frame>,
    signal: Arc<CloseSignal>,
    identities: IdentityResolver,
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
}

impl ConnectionSession {
    pub fn new(
        outbound: mpsc::Sender<Frame>,
        identities: IdentityResolver,
        registry: Arc<ConnectionRegistry>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            conn_id: ConnectionId::generate(),
            state: SessionState::AwaitingConnect,
            outbound,
            signal: Arc::new(CloseSignal::new()),
            identities,
            registry,
            router,
        }
    }

    pub fn conn_id(&self) -> &ConnectionId {
        &self.conn_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Signal the writer task waits on; fired by `close`.
    pub fn close_signal(&self) -> Arc<CloseSignal> {
        self.signal.clone()
    }

    /// Advance the state machine with one inbound event.
    ///
    /// On `Err` the session has already been closed.
    pub async fn handle(&mut self, event: InboundEvent) -> Result<Flow, GatewayError> {
        let active = match self.state {
            SessionState::Closed => return Ok(Flow::Stop),
            SessionState::AwaitingConnect => false,
            SessionState::Active(_) => true,
        };

        match (active, event) {
            (false, InboundEvent::Connect { token }) => self.connect(&token).await,
            (false, other) => {
                self.close();
                Err(GatewayError::ProtocolViolation(format!(
                    "expected connect, got {}",
                    other.action()
                )))
            }
            (true, InboundEvent::ChatMessage { token, to, body }) => {
                self.relay(&token, to, body).await
            }
            (true, InboundEvent::Close {}) => {
                self.close();
                Ok(Flow::Stop)
            }
            (true, InboundEvent::Connect { .. }) => {
                self.close();
                Err(GatewayError::ProtocolViolation("already connected".to_string()))
            }
        }
    }

    async fn connect(&mut self, token: &str) -> Result<Flow, GatewayError> {
        let identity = match self.identities.resolve(token).await {
            Ok(identity) => identity,
            Err(err) => return Err(self.reject(err.into()).await),
        };

        if let Err(err) = self.send(&OutboundEvent::connected(&identity)).await {
            self.close();
            return Err(err);
        }

        self.registry.register(
            self.conn_id.clone(),
            identity.username.clone(),
            &self.outbound,
            self.signal.clone(),
        );

        tracing::info!(
            conn_id = %self.conn_id,
            username = %identity.username,
            "chat session connected"
        );

        self.state = SessionState::Active(identity);
        Ok(Flow::Continue)
    }

    async fn relay(&mut self, token: &str, to: String, body: String) -> Result<Flow, GatewayError> {
        // Every message re-authenticates with the token it carries.
        let sender = match self.identities.resolve(token).await {
            Ok(identity) => identity,
            Err(err) => return Err(self.reject(err.into()).await),
        };

        let event = OutboundEvent::chat_message(&sender, body, to.clone());
        self.router.route(&event, &to, &sender.username);
        Ok(Flow::Continue)
    }

    /// Tell the client `close`, then close the session.
    async fn reject(&mut self, err: GatewayError) -> GatewayError {
        tracing::debug!(conn_id = %self.conn_id, %err, "rejecting chat session");
        if let Err(send_err) = self.send(&OutboundEvent::Closed).await {
            tracing::debug!(conn_id = %self.conn_id, err = %send_err, "close notice not sent");
        }
        self.close();
        err
    }

    async fn send(&self, event: &OutboundEvent) -> Result<(), GatewayError> {
        let frame = event.to_json()?;
        self.outbound
            .send(frame.into())
            .await
            .map_err(|_| GatewayError::Disconnected)
    }

    /// Stop accepting frames, unregister, and tell the writer to close the
    /// transport once it has flushed what was already queued.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        // Shut before unregistering so a stale snapshot cannot enqueue.
        self.signal.close();
        let was_registered = self.registry.unregister(&self.conn_id);
        self.state = SessionState::Closed;

        tracing::info!(conn_id = %self.conn_id, was_registered, "chat session closed");
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}
