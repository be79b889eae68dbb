//! Credential handling: the opaque bearer string and the identity decoded
//! from its payload segment.
//!
//! The credential is consumed, never produced, on the client side: the
//! payload (second dot-delimited segment, base64url) carries the identity
//! JSON. Verification of the signature is the server collaborator's job.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque bearer token. Treated as a value and threaded explicitly through
/// the conversation core rather than read from ambient storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the identity carried in the payload segment.
    pub fn session(&self) -> Result<Session, SessionDecodeError> {
        Session::from_credential(self)
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The current user's decoded identity. Read-only within the conversation
/// core; refreshed only when the credential changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub username: String,
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionDecodeError {
    #[error("credential is not a three-segment token")]
    MalformedToken,
    #[error("credential payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("credential payload is not valid identity JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Session {
    /// Decode the second dot-delimited segment of the credential as
    /// base64url-encoded identity JSON. Unknown payload fields (expiry and
    /// friends) are ignored.
    pub fn from_credential(credential: &Credential) -> Result<Self, SessionDecodeError> {
        let mut segments = credential.as_str().split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
            _ => return Err(SessionDecodeError::MalformedToken),
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_for(payload: &serde_json::Value) -> Credential {
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
        Credential::new(format!("header.{encoded}.signature"))
    }

    #[test]
    fn decodes_identity_from_payload_segment() {
        let id = Uuid::new_v4();
        let credential = credential_for(&serde_json::json!({
            "id": id,
            "firstName": "Ada",
            "lastName": "Lovelace",
            "username": "ada",
            "email": "ada@example.com",
            "exp": 4102444800u64,
        }));

        let session = credential.session().unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.first_name, "Ada");
        assert_eq!(session.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(session.username, "ada");
    }

    #[test]
    fn missing_last_name_is_none() {
        let credential = credential_for(&serde_json::json!({
            "id": Uuid::new_v4(),
            "firstName": "Prince",
            "username": "prince",
            "email": "prince@example.com",
        }));
        assert!(credential.session().unwrap().last_name.is_none());
    }

    #[test]
    fn rejects_token_without_three_segments() {
        let err = Credential::new("just-an-opaque-string").session().unwrap_err();
        assert!(matches!(err, SessionDecodeError::MalformedToken));

        let err = Credential::new("a.b.c.d").session().unwrap_err();
        assert!(matches!(err, SessionDecodeError::MalformedToken));
    }

    #[test]
    fn rejects_non_base64_payload() {
        let err = Credential::new("header.!!!.sig").session().unwrap_err();
        assert!(matches!(err, SessionDecodeError::Base64(_)));
    }

    #[test]
    fn rejects_non_identity_payload() {
        let encoded = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        let err = Credential::new(format!("h.{encoded}.s"))
            .session()
            .unwrap_err();
        assert!(matches!(err, SessionDecodeError::Json(_)));
    }
}
