//! Wire types for the engine's REST-style control surface and event stream.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeObject {
    pub id: String,
}

/// Engine event-stream payloads. Unknown event types are preserved under
/// `Other` rather than causing a parse failure, since the stream may carry
/// events this service does not act on.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    CallBegin { channel: ChannelObject },
    CallEnd { channel: ChannelObject },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateBridgeRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl Default for CreateBridgeRequest {
    fn default() -> Self {
        Self { kind: "mixing" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddChannelRequest<'a> {
    pub channel: &'a str,
}

/// Outcome of a `lookup` call, used by the zombie scrubber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Exists,
    NotFound,
    TransportError,
}
