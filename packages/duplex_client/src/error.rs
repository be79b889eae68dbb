//! Client error taxonomy.
//!
//! Nothing here is fatal to the process: history failures degrade to an
//! empty timeline, transport failures disable sending until a reconnect
//! succeeds, and validation failures never leave the client.

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// REST collaborator unreachable or returned a non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// The credential was rejected (401) or could not be decoded.
    #[error("authentication failed")]
    Auth,

    /// The room socket failed to open or closed unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outgoing payload was rejected before any network traffic.
    #[error("{0}")]
    Validation(String),
}

impl ClientError {
    pub(crate) fn network(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}
