//! The message envelope transported over the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Standard wrapper around every queued payload.
///
/// Produced once per send and immutable afterwards. The body is whatever the
/// publisher serialized; consumers decode it with [`Envelope::payload`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub message_id: String,

    /// Creation timestamp, RFC3339 on the wire.
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, Value>>,

    /// Opaque serialized payload.
    pub body: Value,
}

impl Envelope {
    /// Wrap a payload in a new envelope with a generated id and timestamp.
    pub fn new<T: Serialize>(
        body: &T,
        headers: Option<HashMap<String, Value>>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            headers,
            body: serde_json::to_value(body)?,
        })
    }

    /// Serialize for transport.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse an envelope off the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Decode the body into the payload type the publisher serialized.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}
