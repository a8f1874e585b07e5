pub mod kv;

use std::sync::Arc;

use crate::config::{Config, TokenStoreKind};
use kv::{KeyValueStore, KvError, MemoryStore, RedisStore};

/// Build the token store selected by `config`.
///
/// The Redis backend is contacted eagerly so an unreachable store fails
/// startup instead of every later lookup.
pub async fn connect(config: &Config) -> Result<Arc<dyn KeyValueStore>, KvError> {
    match config.token_store {
        TokenStoreKind::Redis => Ok(Arc::new(RedisStore::connect(&config.redis_url).await?)),
        TokenStoreKind::Memory => {
            tracing::warn!("using in-memory token store; tokens are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
