//! Resolves chat tokens into display identities.

use std::sync::Arc;

use crate::db::kv::KeyValueStore;

use super::tokens::{self, TokenRecord};

/// Display identity attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub avatar_ref: String,
}

impl From<TokenRecord> for Identity {
    fn from(record: TokenRecord) -> Self {
        Self {
            username: record.username,
            avatar_ref: record.headimgurl,
        }
    }
}

/// Why a token did not resolve. Every variant means "unauthenticated".
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("token not found")]
    NotFound,
    #[error("token record is corrupt")]
    Corrupt,
    #[error("token store unavailable")]
    StoreUnavailable,
}

/// Looks tokens up in the token store. Holds no state of its own.
#[derive(Clone)]
pub struct IdentityResolver {
    kv: Arc<dyn KeyValueStore>,
}

impl IdentityResolver {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::NotFound);
        }

        let raw = tokens::lookup_token(self.kv.as_ref(), token)
            .await
            .map_err(|err| {
                tracing::warn!(%err, "token lookup failed");
                IdentityError::StoreUnavailable
            })?
            .ok_or(IdentityError::NotFound)?;

        let record: TokenRecord = serde_json::from_str(&raw).map_err(|err| {
            tracing::warn!(%err, "unparseable token record");
            IdentityError::Corrupt
        })?;

        if record.username.is_empty() {
            return Err(IdentityError::NotFound);
        }

        Ok(record.into())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::kv::{KvError, MemoryStore};

    struct DownStore;

    #[async_trait]
    impl KeyValueStore for DownStore {
        async fn set(&self, _key: &str, _value: &str) -> Result<(), KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn del(&self, _key: &str) -> Result<(), KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }
    }

    async fn resolver_with(token: &str, value: &str) -> IdentityResolver {
        let kv = Arc::new(MemoryStore::new());
        kv.set(token, value).await.unwrap();
        IdentityResolver::new(kv)
    }

    #[tokio::test]
    async fn resolves_stored_token() {
        let resolver =
            resolver_with("tok_a", r#"{"username":"alice","headimgurl":"/uploads/a.png"}"#).await;
        let identity = resolver.resolve("tok_a").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.avatar_ref, "/uploads/a.png");
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_found() {
        let resolver =
            resolver_with("tok_a", r#"{"username":"alice","headimgurl":""}"#).await;
        for token in ["garbage", "tok_b", "", "TOK_A"] {
            assert!(
                matches!(resolver.resolve(token).await, Err(IdentityError::NotFound)),
                "token {token:?} should not resolve"
            );
        }
    }

    #[tokio::test]
    async fn resolves_record_written_by_another_issuer() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("tok_raw", r#"{"username":"alice","headimgurl":"/uploads/a.png"}"#)
            .await
            .unwrap();

        let identity = IdentityResolver::new(kv).resolve("tok_raw").await.unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn empty_username_is_not_an_identity() {
        let resolver = resolver_with("tok_a", r#"{"username":"","headimgurl":"x"}"#).await;
        assert!(matches!(resolver.resolve("tok_a").await, Err(IdentityError::NotFound)));
    }

    #[tokio::test]
    async fn unparseable_record_is_corrupt() {
        let resolver = resolver_with("tok_a", "not json").await;
        assert!(matches!(resolver.resolve("tok_a").await, Err(IdentityError::Corrupt)));
    }

    #[tokio::test]
    async fn unreachable_store_is_reported() {
        let resolver = IdentityResolver::new(Arc::new(DownStore));
        assert!(matches!(
            resolver.resolve("tok_a").await,
            Err(IdentityError::StoreUnavailable)
        ));
    }
}
