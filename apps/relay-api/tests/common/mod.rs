#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use relay_api::auth::tokens::{self, TokenRecord};
use relay_api::config::{Config, TokenStoreKind};
use relay_api::db::kv::{KeyValueStore, MemoryStore};
use relay_api::AppState;

pub const BROADCAST: &str = "everyone";

/// Test fixture. The upload directory is removed when this is dropped.
pub struct TestContext {
    pub state: AppState,
    pub uploads: TempDir,
}

pub fn test_config(upload_dir: &std::path::Path) -> Config {
    Config {
        port: 0,
        redis_url: String::new(),
        token_store: TokenStoreKind::Memory,
        upload_dir: upload_dir.to_path_buf(),
        broadcast_id: BROADCAST.to_string(),
        max_upload_bytes: 1 << 20,
        outbound_buffer: 16,
    }
}

/// Build application state over an in-memory token store.
pub fn test_state() -> TestContext {
    let uploads = tempfile::tempdir().expect("create upload dir");
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
    let state = AppState::new(test_config(uploads.path()), kv);
    TestContext { state, uploads }
}

/// Full router wired to a fresh state.
pub fn test_app() -> (Router, TestContext) {
    let ctx = test_state();
    let app = relay_api::routes::router(&ctx.state.config).with_state(ctx.state.clone());
    (app, ctx)
}

/// Store a token for `username` directly, bypassing `/getToken`.
pub async fn issue_test_token(state: &AppState, username: &str) -> String {
    let token = tokens::generate_chat_token();
    tokens::store_token(
        state.kv.as_ref(),
        &token,
        &TokenRecord {
            username: username.to_string(),
            headimgurl: format!("/uploads/{username}.png"),
        },
    )
    .await
    .expect("store test token");
    token
}
