//! Chat channel wire format.
//!
//! Clients send `{action, token, to, message}` objects and receive
//! `{action, username, headimgurl, message, toUsername}` objects. Outbound
//! frames always carry all five keys.

use serde::{Deserialize, Serialize};

use crate::auth::identity::Identity;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum InboundEvent {
    Connect {
        #[serde(default)]
        token: String,
    },
    #[serde(rename = "message")]
    ChatMessage {
        #[serde(default)]
        token: String,
        #[serde(default)]
        to: String,
        #[serde(default, rename = "message")]
        body: String,
    },
    Close {},
}

impl InboundEvent {
    /// Decode a text or binary frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::ChatMessage { .. } => "message",
            Self::Close {} => "close",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

pub const ACTION_CONNECTED: &str = "connected";
pub const ACTION_CLOSE: &str = "close";
pub const ACTION_MESSAGE: &str = "message";

/// An event the server sends to one or more connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Connected {
        username: String,
        avatar_ref: String,
    },
    Closed,
    ChatMessage {
        username: String,
        avatar_ref: String,
        body: String,
        to_username: String,
    },
}

impl OutboundEvent {
    pub fn connected(identity: &Identity) -> Self {
        Self::Connected {
            username: identity.username.clone(),
            avatar_ref: identity.avatar_ref.clone(),
        }
    }

    pub fn chat_message(sender: &Identity, body: String, to_username: String) -> Self {
        Self::ChatMessage {
            username: sender.username.clone(),
            avatar_ref: sender.avatar_ref.clone(),
            body,
            to_username,
        }
    }

    fn frame(&self) -> OutboundFrame<'_> {
        match self {
            Self::Connected {
                username,
                avatar_ref,
            } => OutboundFrame {
                action: ACTION_CONNECTED,
                username,
                headimgurl: avatar_ref,
                message: "",
                to_username: "",
            },
            Self::Closed => OutboundFrame {
                action: ACTION_CLOSE,
                username: "",
                headimgurl: "",
                message: "",
                to_username: "",
            },
            Self::ChatMessage {
                username,
                avatar_ref,
                body,
                to_username,
            } => OutboundFrame {
                action: ACTION_MESSAGE,
                username,
                headimgurl: avatar_ref,
                message: body,
                to_username,
            },
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.frame())
    }
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    action: &'static str,
    username: &'a str,
    headimgurl: &'a str,
    message: &'a str,
    #[serde(rename = "toUsername")]
    to_username: &'a str,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn parses_each_action() {
        let connect = InboundEvent::parse(br#"{"action":"connect","token":"tok_1"}"#).unwrap();
        assert_eq!(connect, InboundEvent::Connect { token: "tok_1".into() });

        let msg = InboundEvent::parse(
            br#"{"action":"message","token":"tok_1","to":"bob","message":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            InboundEvent::ChatMessage {
                token: "tok_1".into(),
                to: "bob".into(),
                body: "hi".into(),
            }
        );

        let close =
            InboundEvent::parse(br#"{"action":"close","token":"","to":"","message":""}"#).unwrap();
        assert_eq!(close, InboundEvent::Close {});
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let msg = InboundEvent::parse(br#"{"action":"message"}"#).unwrap();
        assert_eq!(
            msg,
            InboundEvent::ChatMessage {
                token: String::new(),
                to: String::new(),
                body: String::new(),
            }
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(InboundEvent::parse(b"not json").is_err());
        assert!(InboundEvent::parse(br#"{"token":"tok_1"}"#).is_err());
        assert!(InboundEvent::parse(br#"{"action":"subscribe"}"#).is_err());
        assert!(InboundEvent::parse(br#"{"action":"connect","token":5}"#).is_err());
    }

    #[test]
    fn outbound_frames_carry_every_key() {
        let closed: Value = serde_json::from_str(&OutboundEvent::Closed.to_json().unwrap()).unwrap();
        assert_eq!(
            closed,
            json!({"action":"close","username":"","headimgurl":"","message":"","toUsername":""})
        );

        let alice = Identity {
            username: "alice".into(),
            avatar_ref: "/uploads/a.png".into(),
        };
        let connected: Value =
            serde_json::from_str(&OutboundEvent::connected(&alice).to_json().unwrap()).unwrap();
        assert_eq!(connected["action"], "connected");
        assert_eq!(connected["username"], "alice");
        assert_eq!(connected["headimgurl"], "/uploads/a.png");

        let message = OutboundEvent::chat_message(&alice, "hi".into(), "bob".into());
        let v: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "action": "message",
                "username": "alice",
                "headimgurl": "/uploads/a.png",
                "message": "hi",
                "toUsername": "bob",
            })
        );
    }
}
