//! Token issuance: `POST /getToken` with a display name and an avatar upload.

use std::path::Path;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::tokens::{self, TokenRecord};
use crate::config::Config;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

/// Public path prefix uploaded avatars are served under.
pub const UPLOADS_PREFIX: &str = "/uploads";

pub fn router(config: &Config) -> Router<AppState> {
    Router::new()
        .route("/getToken", post(issue_token))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
}

/// Multipart form accepted by `/getToken`.
#[derive(ToSchema)]
pub struct IssueTokenForm {
    /// Display name attached to the token.
    pub username: String,
    /// Avatar image.
    #[schema(value_type = String, format = Binary)]
    pub headimg: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

struct Upload {
    file_name: String,
    data: axum::body::Bytes,
}

#[utoipa::path(
    post,
    path = "/getToken",
    tag = "Tokens",
    request_body(content = IssueTokenForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Malformed form or missing avatar", body = ApiErrorBody),
        (status = 401, description = "Missing username", body = ApiErrorBody),
        (status = 413, description = "Upload too large", body = ApiErrorBody),
    ),
)]
pub async fn issue_token(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TokenResponse>, ApiError> {
    let mut username: Option<String> = None;
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "username" => username = Some(field.text().await?),
            "headimg" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                upload = Some(Upload { file_name, data });
            }
            _ => {}
        }
    }

    let username = username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::unauthorized("username is required"))?;
    let upload = upload.ok_or_else(|| ApiError::bad_request("headimg is required"))?;

    let headimgurl = save_avatar(&state.config.upload_dir, &upload).await?;

    let token = tokens::generate_chat_token();
    tokens::store_token(
        state.kv.as_ref(),
        &token,
        &TokenRecord {
            username: username.clone(),
            headimgurl,
        },
    )
    .await?;

    tracing::info!(%username, "chat token issued");

    Ok(Json(TokenResponse { token }))
}

/// Write the avatar under a fresh random name and return its public path.
async fn save_avatar(upload_dir: &Path, upload: &Upload) -> Result<String, ApiError> {
    let stored_name = format!(
        "{}_{}",
        relay_common::id::prefixed_ulid(relay_common::id::prefix::UPLOAD),
        sanitize_file_name(&upload.file_name)
    );

    tokio::fs::write(upload_dir.join(&stored_name), &upload.data)
        .await
        .map_err(|err| {
            tracing::error!(%err, dir = %upload_dir.display(), "failed to store avatar");
            ApiError::internal("Failed to store upload")
        })?;

    Ok(format!("{UPLOADS_PREFIX}/{stored_name}"))
}

/// Keep only the final path component and a conservative character set.
fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "avatar".to_string()
    } else {
        cleaned.to_string()
    }
}
