//! Session error types
//!
//! Errors raised by the control-plane session: token acquisition,
//! transport failures and protocol violations. Connector-level errors
//! pass through unchanged so their wire names survive to the response
//! frame.

use portico_connector::error::ConnectorError;
use thiserror::Error;

/// Error that can occur in the remote session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The OAuth token endpoint answered with a non-2xx status or an
    /// unparseable body.
    #[error("token request failed with status {status}: {body}")]
    TokenRequestFailed { status: u16, body: String },

    /// A WebSocket frame was malformed or missed required fields.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Transport-level failure (connect, send, receive).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operation failed inside the connector framework.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl SessionError {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        SessionError::Protocol {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        SessionError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SessionError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Stable name for the `error.name` field of response frames.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            SessionError::TokenRequestFailed { .. } => "TokenRequestFailed",
            SessionError::Protocol { .. } => "ProtocolError",
            SessionError::Transport { .. } => "TransportError",
            SessionError::Connector(inner) => inner.wire_name(),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            SessionError::TokenRequestFailed {
                status: 500,
                body: "oops".into()
            }
            .wire_name(),
            "TokenRequestFailed"
        );
        assert_eq!(SessionError::protocol("bad frame").wire_name(), "ProtocolError");
        assert_eq!(
            SessionError::from(ConnectorError::validation("bad filter")).wire_name(),
            "ValidationFailed"
        );
        assert_eq!(
            SessionError::from(ConnectorError::ConnectorNotFound { id: "x".into() }).wire_name(),
            "ConnectorNotFound"
        );
    }

    #[test]
    fn test_display_passthrough() {
        let err = SessionError::from(ConnectorError::not_supported("sync"));
        assert_eq!(err.to_string(), "operation not supported: sync");
    }
}
