pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::identity::IdentityResolver;
use config::Config;
use db::kv::KeyValueStore;
use gateway::fanout::MessageRouter;
use gateway::registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    pub identities: IdentityResolver,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    pub fn new(config: Config, kv: Arc<dyn KeyValueStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new(registry.clone(), config.broadcast_id.clone()));
        Self {
            identities: IdentityResolver::new(kv.clone()),
            kv,
            config: Arc::new(config),
            registry,
            router,
        }
    }
}
