//! Wire protocol: the REST response envelope and the per-room WebSocket
//! frame types.
//!
//! Every REST response is wrapped in `{status, meta, data}` on success or
//! `{status, message}` on error. On the room channel, the client sends
//! `OutboundFrame` ({body, attachment?}) and receives full `Message` objects.

use serde::{Deserialize, Serialize};

use crate::models::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// Pagination metadata echoed back on list responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

/// Success envelope: `{status: "success", meta, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: ApiStatus,
    #[serde(default)]
    pub meta: Meta,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ApiStatus::Success,
            meta: Meta::default(),
            data,
        }
    }

    pub fn with_meta(data: T, meta: Meta) -> Self {
        Self {
            status: ApiStatus::Success,
            meta,
            data,
        }
    }
}

/// Error envelope: `{status: "error", message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub status: ApiStatus,
    pub message: String,
}

impl ApiErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
        }
    }
}

/// Client → server frame on the room channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

/// Server → client frame: the persisted message, echoed to every room
/// subscriber including the sender.
pub fn decode_inbound(text: &str) -> Result<Message, serde_json::Error> {
    serde_json::from_str(text)
}
