//! Wire envelopes exchanged with clients.
//!
//! Inbound documents are decoded once into a typed [`Request`]; everything
//! past this module works with the typed form only.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{Result, RouterError};
use crate::ids::TabId;

/// Notice sent back when a tab id is already registered.
pub const TAB_ALREADY_ASSIGNED: &str = "Tab has already been assigned";

/// Diagnostic text sent to the originator when a query matches nobody.
pub fn no_agent_found(role: &str) -> String {
    format!("No agent found with the role '{role}'")
}

/// Action selector of an inbound envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Registering,
    Query,
    Reset,
    Heartbeat,
    Unknown(String),
}

impl Action {
    pub fn parse(s: &str) -> Self {
        match s {
            "Registering" => Self::Registering,
            "Query" => Self::Query,
            "Reset" => Self::Reset,
            "Heartbeat" => Self::Heartbeat,
            other => Self::Unknown(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Registering => "Registering",
            Self::Query => "Query",
            Self::Reset => "Reset",
            Self::Heartbeat => "Heartbeat",
            Self::Unknown(s) => s,
        }
    }
}

/// Inbound document as it appears on the wire.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub action: Option<String>,
    pub tab_id: Option<TabId>,
    pub role: Option<String>,
    /// `None` only when the key is absent. An explicit `null` is a payload.
    #[serde(default, deserialize_with = "present")]
    pub query: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Query payload, resolved at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(Value),
}

impl Payload {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }

    /// Textual form delivered to recipients.
    ///
    /// Text passes through unchanged; structured values use compact JSON.
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => serde_json::to_string(v).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "payload serialization failed, using display form");
                v.to_string()
            }),
        }
    }
}

/// Typed request handed to the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Register {
        tab_id: TabId,
        role: String,
    },
    Query {
        tab_id: Option<TabId>,
        role: String,
        payload: Payload,
    },
    Reset,
    Heartbeat,
    /// Recognized action with a required field absent.
    Incomplete {
        action: Action,
        missing: &'static str,
    },
    /// Missing or unrecognized action.
    Ignored {
        action: Option<String>,
    },
}

impl Request {
    /// Short name used for logging/metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "registering",
            Self::Query { .. } => "query",
            Self::Reset => "reset",
            Self::Heartbeat => "heartbeat",
            Self::Incomplete { .. } => "incomplete",
            Self::Ignored { .. } => "ignored",
        }
    }
}

impl From<InboundEnvelope> for Request {
    fn from(env: InboundEnvelope) -> Self {
        let Some(action) = env.action else {
            return Self::Ignored { action: None };
        };

        match Action::parse(&action) {
            Action::Registering => match (env.tab_id, env.role) {
                (Some(tab_id), Some(role)) => Self::Register { tab_id, role },
                (None, _) => Self::Incomplete {
                    action: Action::Registering,
                    missing: "tabId",
                },
                (_, None) => Self::Incomplete {
                    action: Action::Registering,
                    missing: "role",
                },
            },
            Action::Query => match (env.role, env.query) {
                (Some(role), Some(query)) => Self::Query {
                    tab_id: env.tab_id,
                    role,
                    payload: Payload::from_value(query),
                },
                (None, _) => Self::Incomplete {
                    action: Action::Query,
                    missing: "role",
                },
                (_, None) => Self::Incomplete {
                    action: Action::Query,
                    missing: "query",
                },
            },
            Action::Reset => Self::Reset,
            Action::Heartbeat => Self::Heartbeat,
            Action::Unknown(other) => Self::Ignored {
                action: Some(other),
            },
        }
    }
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<Request> {
    let envelope: InboundEnvelope = serde_json::from_str(text)?;
    Ok(envelope.into())
}

/// Decode one inbound binary frame. Must be UTF-8.
pub fn decode_bytes(bytes: &[u8]) -> Result<Request> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| RouterError::InvalidFrame(format!("binary frame is not UTF-8: {e}")))?;
    decode(text)
}

/// Outbound document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "tabId")]
    pub tab_id: Option<TabId>,
    pub message: String,
}

impl OutboundEnvelope {
    pub fn to_tab(tab_id: TabId, message: impl Into<String>) -> Self {
        Self {
            tab_id: Some(tab_id),
            message: message.into(),
        }
    }

    /// Envelope not tied to any tab (diagnostics).
    pub fn untagged(message: impl Into<String>) -> Self {
        Self {
            tab_id: None,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
