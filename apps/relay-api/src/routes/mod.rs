pub mod health;
pub mod tokens;

use axum::Router;
use tower_http::services::ServeDir;
use utoipa::OpenApi;

use crate::config::Config;
use crate::AppState;

pub fn router(config: &Config) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(tokens::router(config))
        .nest_service(tokens::UPLOADS_PREFIX, ServeDir::new(&config.upload_dir))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        tokens::issue_token,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            health::HealthResponse,
            tokens::IssueTokenForm,
            tokens::TokenResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Tokens", description = "Chat token issuance"),
    )
)]
pub struct ApiDoc;
