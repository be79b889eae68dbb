//! Registration and login. Both issue a credential through the
//! `Credentials` collaborator; neither is part of the messaging core.

use axum::{Json, extract::State};
use duplex_core::ApiEnvelope;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::auth::Credentials;
use crate::error::ApiError;
use crate::models::UserPayload;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

/// Auth responses carry the profile plus the bearer credential.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(flatten)]
    pub user: UserPayload,
    pub auth_token: String,
}

fn validate_register(input: &RegisterInput) -> Result<(), ApiError> {
    if input.first_name.trim().is_empty() {
        return Err(ApiError::Validation("firstName is required".into()));
    }
    if input.username.trim().is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    if !input.email.contains('@') {
        return Err(ApiError::Validation("email is invalid".into()));
    }
    if input.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if input.password != input.password_confirmation {
        return Err(ApiError::Validation("passwords do not match".into()));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<ApiEnvelope<AuthPayload>>, ApiError> {
    if !state.config.auth.allow_registration {
        return Err(ApiError::Forbidden("registration is disabled".into()));
    }
    validate_register(&input)?;

    if state
        .repository
        .get_user_by_username(&input.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Validation("username is already taken".into()));
    }
    if state
        .repository
        .get_user_by_email(input.email.trim())
        .await?
        .is_some()
    {
        return Err(ApiError::Validation("email is already registered".into()));
    }

    let user = state
        .repository
        .create_user(
            input.first_name.trim(),
            input.last_name.as_deref(),
            input.username.trim(),
            input.email.trim(),
            &input.password,
        )
        .await?;

    let credential = state.credentials.issue(&user).map_err(|_| {
        ApiError::Internal(anyhow::anyhow!("failed to issue credential"))
    })?;

    info!(username = %user.username, "registered new user");

    Ok(Json(ApiEnvelope::success(AuthPayload {
        user: UserPayload::from(&user),
        auth_token: credential.to_string(),
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<ApiEnvelope<AuthPayload>>, ApiError> {
    let user = state
        .repository
        .verify_user_password(&input.username, &input.password)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let credential = state.credentials.issue(&user).map_err(|_| {
        ApiError::Internal(anyhow::anyhow!("failed to issue credential"))
    })?;

    Ok(Json(ApiEnvelope::success(AuthPayload {
        user: UserPayload::from(&user),
        auth_token: credential.to_string(),
    })))
}
