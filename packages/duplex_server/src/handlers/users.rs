//! Profile updates. Avatar hosting lives with an external media service and
//! is not modeled here.

use axum::{Json, extract::State};
use duplex_core::ApiEnvelope;
use serde::Deserialize;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::UserPayload;
use crate::repository::ProfileChanges;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// `PATCH /api/users` — partial profile update for the authenticated user.
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<ApiEnvelope<UserPayload>>, ApiError> {
    if let Some(email) = &input.email
        && !email.contains('@')
    {
        return Err(ApiError::Validation("email is invalid".into()));
    }
    if let Some(password) = &input.password
        && password.len() < 8
    {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let user = state
        .repository
        .update_profile(
            session.id,
            ProfileChanges {
                first_name: input.first_name,
                last_name: input.last_name,
                email: input.email,
                password: input.password,
            },
        )
        .await?;

    Ok(Json(ApiEnvelope::success(UserPayload::from(&user))))
}
