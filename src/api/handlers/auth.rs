use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::extract::ActiveUser;
use crate::api::response::{ApiError, AppForm, AppJson};
use crate::auth::AccessToken;
use crate::storage::models::PublicUser;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// OAuth2 password-grant style form body
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: String,
    pub username: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let user = state
        .auth
        .register(&req.username, &req.email, &req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppForm(form): AppForm<LoginForm>,
) -> Result<Json<AccessToken>, ApiError> {
    let token = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(token))
}

pub async fn read_current_user(ActiveUser(identity): ActiveUser) -> Json<PublicUser> {
    Json(identity.public())
}
