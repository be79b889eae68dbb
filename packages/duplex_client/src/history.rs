//! History retrieval: the REST half of entering a room.

use duplex_core::{ApiEnvelope, Credential, Message};
use reqwest::StatusCode;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Messages requested when the caller does not say otherwise.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// Fetches the newest messages of a room, oldest-first.
///
/// Never retries: a failed fetch propagates to the controller, which owns
/// the user-visible fallback (seed an empty timeline, mark it degraded).
#[derive(Clone)]
pub struct HistoryFetcher {
    http: reqwest::Client,
    api_base_url: String,
}

impl HistoryFetcher {
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

    /// Fetch up to `limit` messages for `room_id`, passing the caller's
    /// credential through. An empty room is `Ok(vec![])`, not an error.
    pub async fn fetch(
        &self,
        credential: &Credential,
        room_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Message>, ClientError> {
        let url = format!(
            "{}/api/rooms/{room_id}/messages?limit={limit}",
            self.api_base_url
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(credential.as_str())
            .send()
            .await
            .map_err(ClientError::network)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Auth);
        }
        if !status.is_success() {
            return Err(ClientError::Network(format!(
                "history fetch failed with status {status}"
            )));
        }

        let envelope: ApiEnvelope<Vec<Message>> =
            response.json().await.map_err(ClientError::network)?;
        Ok(envelope.data)
    }
}
