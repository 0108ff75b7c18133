use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ShipperError;

/// One socket message: `{"event": ..., "data": ..., "cid": ...}`.
///
/// `cid` tags a correlated request; a backend that echoes it lets concurrent
/// requests resolve independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Uuid>,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            cid: None,
        }
    }

    pub fn with_cid(mut self, cid: Uuid) -> Self {
        self.cid = Some(cid);
        self
    }

    pub fn encode(&self) -> Result<String, ShipperError> {
        serde_json::to_string(self)
            .map_err(|err| ShipperError::Internal(format!("failed to encode frame: {err}")))
    }

    pub fn decode(text: &str) -> Result<Self, ShipperError> {
        serde_json::from_str(text)
            .map_err(|err| ShipperError::Decode(format!("malformed frame: {err}")))
    }
}
