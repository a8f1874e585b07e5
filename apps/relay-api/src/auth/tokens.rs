//! Opaque chat token generation and token store access.

use serde::{Deserialize, Serialize};

use crate::db::kv::{KeyValueStore, KvError};
use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Opaque token generation
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Chat tokens never expire; they carry 256 bits of entropy.
pub fn generate_chat_token() -> String {
    generate_opaque_token(relay_common::id::prefix::TOKEN, 32)
}

// ---------------------------------------------------------------------------
// Token records
// ---------------------------------------------------------------------------

/// Data stored alongside a chat token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub username: String,
    /// Public path of the uploaded avatar, e.g. `/uploads/img_abc_me.png`.
    #[serde(default)]
    pub headimgurl: String,
}

pub async fn store_token(
    kv: &dyn KeyValueStore,
    token: &str,
    record: &TokenRecord,
) -> Result<(), ApiError> {
    let value = serde_json::to_string(record).map_err(|_| ApiError::internal("serialization"))?;
    kv.set(token, &value).await?;
    Ok(())
}

/// Fetch the raw stored value for `token`, if any.
///
/// The token itself is the store key, so records written by any issuer that
/// stores `token -> JSON` resolve here.
pub async fn lookup_token(kv: &dyn KeyValueStore, token: &str) -> Result<Option<String>, KvError> {
    kv.get(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryStore;

    #[test]
    fn chat_tokens_are_prefixed_and_unique() {
        let a = generate_chat_token();
        let b = generate_chat_token();
        assert!(a.starts_with("tok_"));
        // 32 bytes -> 43 base64 chars without padding.
        assert_eq!(a.len(), 4 + 43);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn stored_record_round_trips_through_store() {
        let kv = MemoryStore::new();
        let record = TokenRecord {
            username: "alice".to_string(),
            headimgurl: "/uploads/a.png".to_string(),
        };
        store_token(&kv, "tok_1", &record).await.unwrap();

        let raw = lookup_token(&kv, "tok_1").await.unwrap().unwrap();
        let parsed: TokenRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, record);
        assert!(lookup_token(&kv, "tok_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_are_keyed_by_the_bare_token() {
        let kv = MemoryStore::new();
        let record = TokenRecord {
            username: "alice".to_string(),
            headimgurl: String::new(),
        };
        store_token(&kv, "tok_1", &record).await.unwrap();

        let raw = kv.get("tok_1").await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<TokenRecord>(&raw).unwrap(), record);
    }

    #[test]
    fn record_uses_wire_field_names() {
        let record = TokenRecord {
            username: "bob".to_string(),
            headimgurl: "/uploads/b.png".to_string(),
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v, serde_json::json!({"username": "bob", "headimgurl": "/uploads/b.png"}));
    }
}
