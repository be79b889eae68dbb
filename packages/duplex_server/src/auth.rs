//! Authentication: bearer-credential verification at the HTTP boundary.
//!
//! Token issuance/validation sits behind the `Credentials` trait so the rest
//! of the server only depends on `verify(token) -> session-or-error`. The
//! shipped implementation signs HS256 tokens whose payload carries the
//! identity JSON that clients decode locally.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use duplex_core::{ApiErrorBody, Credential, Session};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::AppState;
use crate::models::User;

// =============================================================================
// Credentials seam
// =============================================================================

/// External collaborator contract: issue a credential for a known user and
/// verify an incoming one back into a `Session`.
pub trait Credentials: Send + Sync {
    fn issue(&self, user: &User) -> Result<Credential, AuthError>;
    fn verify(&self, token: &str) -> Result<Session, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid or expired credential")]
    InvalidCredential,
    #[error("credential does not match a known account")]
    UnknownUser,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            axum::Json(ApiErrorBody::new("Unauthorized")),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    session: Session,
    exp: u64,
}

/// HS256 implementation of the `Credentials` seam.
pub struct JwtCredentials {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl JwtCredentials {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Load the signing secret from `<data_dir>/token.secret`, generating and
    /// persisting a fresh one on first run so restarts keep sessions valid.
    pub fn from_data_dir(data_dir: &Path, ttl_secs: u64) -> anyhow::Result<Self> {
        let secret_path = data_dir.join("token.secret");
        let secret = match std::fs::read_to_string(&secret_path) {
            Ok(encoded) => STANDARD.decode(encoded.trim())?,
            Err(_) => {
                let mut bytes = [0u8; 32];
                rand::rng().fill_bytes(&mut bytes);
                std::fs::write(&secret_path, STANDARD.encode(bytes))?;
                bytes.to_vec()
            }
        };
        Ok(Self::new(&secret, ttl_secs))
    }
}

impl Credentials for JwtCredentials {
    fn issue(&self, user: &User) -> Result<Credential, AuthError> {
        let claims = Claims {
            session: Session {
                id: user.id,
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                username: user.username.clone(),
                email: user.email.clone(),
            },
            exp: (chrono::Utc::now().timestamp() as u64) + self.ttl_secs,
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|_| AuthError::InvalidCredential)?;
        Ok(Credential::new(token))
    }

    fn verify(&self, token: &str) -> Result<Session, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                warn!("credential rejected: {e}");
                AuthError::InvalidCredential
            })?;
        Ok(data.claims.session)
    }
}

// =============================================================================
// Middleware + extractor
// =============================================================================

/// Authenticated identity, populated by the middleware.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Session);

/// Bearer-credential middleware.
///
/// Public routes pass through. Everything else needs a valid credential in
/// the `Authorization: Bearer` header — or, for WebSocket upgrades where
/// headers are out of the browser's reach, a `?token=` query parameter —
/// and the account must still exist.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if is_public_route(&path) {
        return next.run(request).await;
    }

    let token = bearer_token(request.headers()).or_else(|| query_token(request.uri()));
    let Some(token) = token else {
        return AuthError::MissingCredential.into_response();
    };

    let session = match state.credentials.verify(&token) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    // A credential may outlive its account
    match state.repository.get_user_by_id(session.id).await {
        Ok(Some(_)) => {}
        Ok(None) => return AuthError::UnknownUser.into_response(),
        Err(err) => return crate::error::ApiError::Internal(err).into_response(),
    }

    request.extensions_mut().insert(AuthUser(session));
    next.run(request).await
}

fn is_public_route(path: &str) -> bool {
    path == "/health" || path == "/api/auth/login" || path == "/api/auth/register"
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn query_token(uri: &Uri) -> Option<String> {
    uri.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(str::to_string)
}

/// Extract AuthUser from request extensions (set by middleware).
/// Returns 401 if not present.
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$irrelevant".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issue_then_verify_roundtrips_identity() {
        let creds = JwtCredentials::new(b"test-secret", 3600);
        let user = test_user();

        let credential = creds.issue(&user).unwrap();
        let session = creds.verify(credential.as_str()).unwrap();
        assert_eq!(session.id, user.id);
        assert_eq!(session.username, "ada");
        assert_eq!(session.last_name.as_deref(), Some("Lovelace"));
    }

    #[test]
    fn issued_credential_payload_is_client_decodable() {
        // The client never verifies signatures; it only base64-decodes the
        // payload segment. Make sure issued tokens support that.
        let creds = JwtCredentials::new(b"test-secret", 3600);
        let user = test_user();

        let credential = creds.issue(&user).unwrap();
        let session = credential.session().unwrap();
        assert_eq!(session.id, user.id);
        assert_eq!(session.email, "ada@example.com");
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let issuer = JwtCredentials::new(b"secret-a", 3600);
        let verifier = JwtCredentials::new(b"secret-b", 3600);
        let credential = issuer.issue(&test_user()).unwrap();
        assert!(matches!(
            verifier.verify(credential.as_str()),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn verify_rejects_garbage() {
        let creds = JwtCredentials::new(b"test-secret", 3600);
        assert!(creds.verify("not-a-token").is_err());
    }

    #[test]
    fn secret_persists_across_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let first = JwtCredentials::from_data_dir(tmp.path(), 3600).unwrap();
        let credential = first.issue(&test_user()).unwrap();

        // A second load reads the same secret, so the credential still verifies
        let second = JwtCredentials::from_data_dir(tmp.path(), 3600).unwrap();
        assert!(second.verify(credential.as_str()).is_ok());
    }

    #[test]
    fn bearer_and_query_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        let uri: Uri = "/api/rooms/1/ws?token=abc.def.ghi".parse().unwrap();
        assert_eq!(query_token(&uri).as_deref(), Some("abc.def.ghi"));

        let uri: Uri = "/api/rooms/1/ws".parse().unwrap();
        assert!(query_token(&uri).is_none());
    }

    #[test]
    fn public_routes() {
        assert!(is_public_route("/health"));
        assert!(is_public_route("/api/auth/login"));
        assert!(is_public_route("/api/auth/register"));
        assert!(!is_public_route("/api/rooms"));
        assert!(!is_public_route("/api/users"));
    }
}
