//! Wire envelopes exchanged between the host and the guest surface.
//!
//! The channel carries self-describing JSON messages in four shapes: requests
//! (carry an id and expect exactly one response), notifications (no id, no
//! response), and success/error responses (carry the id of the request they
//! settle). The shapes are mutually exclusive, so the envelope is modeled as
//! an untagged enum and serde does the classification.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The protocol revision every envelope is stamped with.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Marker that serializes as the constant protocol revision and refuses to
/// deserialize anything else. Messages from other protocols sharing the same
/// bus fail classification here and are dropped by the channel adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolMarker;

impl Serialize for ProtocolMarker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(PROTOCOL_VERSION)
    }
}

impl<'de> Deserialize<'de> for ProtocolMarker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == PROTOCOL_VERSION {
            Ok(ProtocolMarker)
        } else {
            Err(D::Error::custom(format!(
                "unsupported protocol revision `{version}`"
            )))
        }
    }
}

/// Correlation id for one request. Allocated from a monotonically increasing
/// counter owned by the issuing session; never reused within that session,
/// even after the call settles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Structured error carried by an error response envelope.
///
/// Built-in and fallback handler failures share this shape; the caller cannot
/// tell from the wire which side produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request matched neither a built-in nor the fallback handler.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Request params failed to deserialize for a built-in method.
pub const INVALID_PARAMS: i64 = -32602;
/// Handler failed without a structured error of its own.
pub const INTERNAL_ERROR: i64 = -32603;

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("invalid params: {detail}"))
    }

    pub fn internal_error(detail: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, detail.to_string())
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// One message unit exchanged over the channel.
///
/// Variant order matters for deserialization: serde tries each in turn, and
/// the required fields (`method` + `id`, `result`, `error`, `method` alone)
/// make the variants disjoint. A response carries exactly one of
/// `result`/`error` by construction; `params` is omitted from the wire
/// entirely when absent, never serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Request {
        jsonrpc: ProtocolMarker,
        id: RequestId,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Success {
        jsonrpc: ProtocolMarker,
        id: RequestId,
        result: Value,
    },
    Failure {
        jsonrpc: ProtocolMarker,
        id: RequestId,
        error: ErrorObject,
    },
    Notification {
        jsonrpc: ProtocolMarker,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
}

impl Envelope {
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Envelope::Request {
            jsonrpc: ProtocolMarker,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Envelope::Notification {
            jsonrpc: ProtocolMarker,
            method: method.into(),
            params,
        }
    }

    pub fn success(id: RequestId, result: Value) -> Self {
        Envelope::Success {
            jsonrpc: ProtocolMarker,
            id,
            result,
        }
    }

    pub fn failure(id: RequestId, error: ErrorObject) -> Self {
        Envelope::Failure {
            jsonrpc: ProtocolMarker,
            id,
            error,
        }
    }

    /// The correlation id, if this envelope carries one.
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Envelope::Request { id, .. }
            | Envelope::Success { id, .. }
            | Envelope::Failure { id, .. } => Some(*id),
            Envelope::Notification { .. } => None,
        }
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Envelope::Request { method, .. } | Envelope::Notification { method, .. } => {
                Some(method.as_str())
            }
            _ => None,
        }
    }
}
