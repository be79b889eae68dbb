//! Collaborator endpoints the terminal front end needs around the
//! conversation core: login, registration, the inbox, opening a room, and
//! profile updates. All of them speak the `{status, meta, data}` envelope.

use duplex_core::{ApiEnvelope, ApiErrorBody, Credential, Room};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// The slice of the auth response the client needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    auth_token: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ClientError::network)?;
        Ok(Self {
            http,
            api_base_url: config.api_base_url.clone(),
        })
    }

    pub async fn register(&self, input: &RegisterInput) -> Result<Credential, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/auth/register", self.api_base_url))
            .json(input)
            .send()
            .await
            .map_err(ClientError::network)?;
        let data: AuthData = decode_envelope(response).await?;
        Ok(Credential::new(data.auth_token))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.api_base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(ClientError::network)?;
        let data: AuthData = decode_envelope(response).await?;
        Ok(Credential::new(data.auth_token))
    }

    /// The inbox: rooms the user participates in, most recent first.
    pub async fn rooms(&self, credential: &Credential) -> Result<Vec<Room>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/rooms", self.api_base_url))
            .bearer_auth(credential.as_str())
            .send()
            .await
            .map_err(ClientError::network)?;
        decode_envelope(response).await
    }

    /// Open (or fetch the existing) private room with `username`.
    pub async fn open_room(
        &self,
        credential: &Credential,
        username: &str,
    ) -> Result<Room, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/rooms", self.api_base_url))
            .bearer_auth(credential.as_str())
            .json(&serde_json::json!({ "username": username }))
            .send()
            .await
            .map_err(ClientError::network)?;
        decode_envelope(response).await
    }
}

async fn decode_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Auth);
    }
    if !status.is_success() {
        // Prefer the server's error message when the envelope parses
        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| format!("request failed with status {status}"));
        return Err(ClientError::Network(message));
    }

    let envelope: ApiEnvelope<T> = response.json().await.map_err(ClientError::network)?;
    Ok(envelope.data)
}
