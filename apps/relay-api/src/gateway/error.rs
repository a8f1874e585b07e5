use crate::auth::identity::IdentityError;

/// Reasons a chat session ends abnormally.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The token did not resolve; the client was sent `close`.
    #[error("authentication failed: {0}")]
    AuthFailure(#[from] IdentityError),
    /// Malformed frame or an action not valid in the current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The connection's own writer has stopped.
    #[error("connection writer is gone")]
    Disconnected,
    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),
}
