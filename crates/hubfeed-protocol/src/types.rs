//! Hub frame types.
//!
//! A hub connection speaks JSON frames, each terminated by the ASCII
//! record separator. After a one-off handshake every frame carries a
//! numeric `type`:
//!
//! | type | meaning |
//! |---|---|
//! | 1 | invocation (call a method; with no `invocationId` it is a push) |
//! | 3 | completion (result or error for an invocation id) |
//! | 6 | ping |
//! | 7 | close |
//!
//! Serde cannot tag enums with integers, so [`HubMessage`] goes through a
//! flat [`WireFrame`] on both paths.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Terminates every frame on the wire.
pub const RECORD_SEPARATOR: u8 = 0x1e;

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// First frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Frame encoding; always `"json"` here.
    pub protocol: String,
    /// Protocol version.
    pub version: u32,
}

impl HandshakeRequest {
    /// The JSON protocol, version 1.
    pub fn json() -> Self {
        Self {
            protocol: "json".to_string(),
            version: 1,
        }
    }
}

/// The hub's answer to the handshake. An empty object means accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Set when the hub rejected the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// HubMessage
// ---------------------------------------------------------------------------

/// A frame exchanged after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// A method call. From the hub with no `invocation_id` this is a push
    /// event; from the client it is an RPC awaiting a [`Completion`].
    ///
    /// [`Completion`]: HubMessage::Completion
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },

    /// The outcome of an earlier invocation.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },

    /// Keep-alive; carries nothing.
    Ping,

    /// The hub is closing the connection.
    Close { error: Option<String> },

    /// A frame type this client does not handle (streaming, cancel, ...).
    Unsupported { kind: u8 },
}

/// The flat JSON shape shared by every frame type.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&HubMessage> for WireFrame {
    fn from(message: &HubMessage) -> Self {
        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => WireFrame {
                kind: TYPE_INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..WireFrame::default()
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => WireFrame {
                kind: TYPE_COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                result: result.clone(),
                error: error.clone(),
                ..WireFrame::default()
            },
            HubMessage::Ping => WireFrame {
                kind: TYPE_PING,
                ..WireFrame::default()
            },
            HubMessage::Close { error } => WireFrame {
                kind: TYPE_CLOSE,
                error: error.clone(),
                ..WireFrame::default()
            },
            HubMessage::Unsupported { kind } => WireFrame {
                kind: *kind,
                ..WireFrame::default()
            },
        }
    }
}

impl TryFrom<WireFrame> for HubMessage {
    type Error = String;

    fn try_from(frame: WireFrame) -> Result<Self, Self::Error> {
        match frame.kind {
            TYPE_INVOCATION => Ok(HubMessage::Invocation {
                invocation_id: frame.invocation_id,
                target: frame
                    .target
                    .ok_or("invocation frame without a target")?,
                arguments: frame.arguments.unwrap_or_default(),
            }),
            TYPE_COMPLETION => Ok(HubMessage::Completion {
                invocation_id: frame
                    .invocation_id
                    .ok_or("completion frame without an invocationId")?,
                result: frame.result,
                error: frame.error,
            }),
            TYPE_PING => Ok(HubMessage::Ping),
            TYPE_CLOSE => Ok(HubMessage::Close { error: frame.error }),
            kind => Ok(HubMessage::Unsupported { kind }),
        }
    }
}

impl Serialize for HubMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireFrame::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HubMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let frame = WireFrame::deserialize(deserializer)?;
        HubMessage::try_from(frame).map_err(serde::de::Error::custom)
    }
}
