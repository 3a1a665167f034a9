//! WebSocket frame vocabulary
//!
//! Every inbound message is UTF-8 JSON with a required `type` field and
//! an optional `requestId` that replies must echo. Parsing is lenient
//! about everything except `type`: operation-level field checks happen in
//! the dispatcher so violations can be answered with a response frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};

/// Operation names accepted on `operation` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationName {
    Schema,
    Test,
    Create,
    Get,
    Update,
    Delete,
    Search,
    Sync,
    AddAttributeValues,
    RemoveAttributeValues,
    ScriptOnConnector,
}

impl OperationName {
    /// Get the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::Schema => "schema",
            OperationName::Test => "test",
            OperationName::Create => "create",
            OperationName::Get => "get",
            OperationName::Update => "update",
            OperationName::Delete => "delete",
            OperationName::Search => "search",
            OperationName::Sync => "sync",
            OperationName::AddAttributeValues => "addAttributeValues",
            OperationName::RemoveAttributeValues => "removeAttributeValues",
            OperationName::ScriptOnConnector => "scriptOnConnector",
        }
    }
}

impl std::fmt::Display for OperationName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Application-level liveness check.
    Ping { request_id: Option<String> },
    /// Request for the current connector list.
    ListConnectors { request_id: Option<String> },
    /// A uniform operation to dispatch.
    Operation(OperationRequest),
    /// Recognized as a frame, but of an unknown type.
    Unknown {
        frame_type: String,
        request_id: Option<String>,
    },
}

/// An `operation` frame before payload validation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// Correlation id; mandatory for operations, echoed in the response.
    pub request_id: Option<String>,
    /// Target connector instance id.
    pub connector_id: Option<String>,
    /// Requested operation, when recognized.
    pub operation: Option<OperationName>,
    /// Raw operation name as received, for error messages.
    pub operation_raw: Option<String>,
    /// Operation payload; defaults to an empty object.
    pub payload: Value,
}

/// Decode one inbound text frame.
///
/// Fails only when the message is not a JSON object or lacks `type`; per
/// the protocol those are logged and never answered.
pub fn parse_frame(text: &str) -> SessionResult<InboundFrame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SessionError::protocol(format!("frame is not valid JSON: {e}")))?;

    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SessionError::protocol("frame has no 'type' field"))?
        .to_string();

    let request_id = value
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let frame = match frame_type.as_str() {
        "ping" => InboundFrame::Ping { request_id },
        "list-connectors" => InboundFrame::ListConnectors { request_id },
        "operation" => {
            let operation_raw = value
                .get("operation")
                .and_then(Value::as_str)
                .map(str::to_string);
            let operation = operation_raw
                .as_deref()
                .and_then(|raw| serde_json::from_value(Value::String(raw.to_string())).ok());
            InboundFrame::Operation(OperationRequest {
                request_id,
                connector_id: value
                    .get("connectorId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                operation,
                operation_raw,
                payload: value.get("payload").cloned().unwrap_or_else(|| Value::Object(Default::default())),
            })
        }
        _ => InboundFrame::Unknown {
            frame_type,
            request_id,
        },
    };

    Ok(frame)
}

/// Structured error carried in response and error frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireError {
    pub message: String,
    pub name: String,
}

impl WireError {
    /// Build the wire error for a session-layer failure.
    #[must_use]
    pub fn from_error(error: &SessionError) -> Self {
        Self {
            message: error.to_string(),
            name: error.wire_name().to_string(),
        }
    }
}

/// Outbound frames, tagged by `type`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Sent once after a successful connection.
    #[serde(rename = "service-info")]
    ServiceInfo {
        service: String,
        #[serde(rename = "startedAt")]
        started_at: DateTime<Utc>,
        connectors: Vec<String>,
    },

    /// Reply to an application-level ping.
    #[serde(rename = "pong")]
    Pong {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        timestamp: DateTime<Utc>,
        connectors: Vec<String>,
    },

    /// Reply to a connector list request.
    #[serde(rename = "connectors")]
    Connectors {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        connectors: Vec<String>,
    },

    /// Operation outcome.
    #[serde(rename = "response")]
    Response {
        #[serde(rename = "requestId")]
        request_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },

    /// Reply to an unknown frame type carrying a request id.
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "requestId")]
        request_id: String,
        error: WireError,
    },
}

impl OutboundFrame {
    /// Successful operation response.
    #[must_use]
    pub fn success(request_id: String, result: Value) -> Self {
        OutboundFrame::Response {
            request_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed operation response.
    #[must_use]
    pub fn failure(request_id: String, error: &SessionError) -> Self {
        OutboundFrame::Response {
            request_id,
            success: false,
            result: None,
            error: Some(WireError::from_error(error)),
        }
    }

    /// Serialize for the wire.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
