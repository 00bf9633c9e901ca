//! Cross-origin message contract between the Host Shell and the Assistant
//! Frame. Every message is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::UserProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbedMessage {
    /// Frame -> parent, once per frame load.
    Ready,

    /// Parent -> frame. Both fields are null once the host is logged out.
    Auth {
        token: Option<String>,
        user: Option<UserProfile>,
    },

    /// Frame -> parent acknowledgement of an AUTH. Extra fields are opaque.
    AuthReceived {
        #[serde(flatten)]
        details: Map<String, Value>,
    },

    /// Frame -> parent: navigate the top-level window.
    Navigate { url: String },

    /// Frame -> parent: download a document through the host.
    #[serde(rename_all = "camelCase")]
    Download {
        document_id: String,
        document_name: String,
    },
}

impl EmbedMessage {
    pub fn auth(token: Option<String>, user: Option<UserProfile>) -> Self {
        EmbedMessage::Auth { token, user }
    }

    /// Parse an inbound message. Anything that is not a well-formed member of
    /// the contract yields `None`; unknown types are expected from newer
    /// frames and are not an error.
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = value.get("type").and_then(Value::as_str)?;
        match serde_json::from_value::<EmbedMessage>(value.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!("Ignoring embed message of type '{}': {}", kind, e);
                None
            }
        }
    }

    /// Like [`EmbedMessage::from_value`] for a raw JSON string.
    pub fn from_json(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::debug!("Ignoring non-JSON embed message: {}", e);
                None
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EmbedMessage::Ready => "READY",
            EmbedMessage::Auth { .. } => "AUTH",
            EmbedMessage::AuthReceived { .. } => "AUTH_RECEIVED",
            EmbedMessage::Navigate { .. } => "NAVIGATE",
            EmbedMessage::Download { .. } => "DOWNLOAD",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
