use std::path::PathBuf;
use std::str::FromStr;

/// Default reserved destination meaning "every connected client".
pub const DEFAULT_BROADCAST_ID: &str = "Go语言讨论组";

/// Which token store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStoreKind {
    Redis,
    Memory,
}

impl FromStr for TokenStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown token store `{other}` (expected `redis` or `memory`)")),
        }
    }
}

/// Relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Redis connection string for the token store.
    pub redis_url: String,
    /// Token store backend. `memory` is intended for local development.
    pub token_store: TokenStoreKind,
    /// Directory uploaded avatars are written to and served from.
    pub upload_dir: PathBuf,
    /// Reserved `to` value that fans a message out to every connection.
    pub broadcast_id: String,
    /// Maximum accepted request body size for `/getToken`.
    pub max_upload_bytes: usize,
    /// Capacity of each connection's outbound frame queue.
    pub outbound_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default. Panics with a descriptive message if a
    /// variable is set to a value that cannot be parsed.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT", 10080),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            token_store: parsed_var("TOKEN_STORE", TokenStoreKind::Redis),
            upload_dir: std::env::var("UPLOAD_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage/uploads")),
            broadcast_id: std::env::var("BROADCAST_ID")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_BROADCAST_ID.to_string()),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", 32 << 20),
            outbound_buffer: parsed_var("OUTBOUND_BUFFER", 256).max(1),
        }
    }
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value `{v}`: {e}")),
        _ => default,
    }
}
