//! Connector framework error types
//!
//! Error definitions with transient/permanent classification and stable
//! wire names for the remote protocol.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Configuration errors (permanent)
    /// Connector configuration failed validation.
    #[error("invalid configuration for '{property}': {message}")]
    ConfigInvalid { property: String, message: String },

    /// No factory registered for the requested type/version pair.
    #[error("unknown connector type: {key}")]
    UnknownConnectorType { key: String },

    /// Connector instance id is not registered.
    #[error("connector not found: {id}")]
    ConnectorNotFound { id: String },

    /// The connector does not implement the requested operation.
    #[error("operation not supported: {operation}")]
    NotSupported { operation: String },

    // Input errors (permanent)
    /// Input failed structural validation (filter, options, payload).
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    /// A filter could not be translated to the backend query dialect.
    #[error("filter translation failed: {message}")]
    Translation { message: String },

    // Resilience errors (transient)
    /// Circuit breaker is open; the backend is considered unavailable.
    #[error("circuit breaker open for connector {connector_id}")]
    CircuitOpen { connector_id: String },

    /// Concurrency cap reached for the connector.
    #[error("too many in-flight requests for connector {connector_id}")]
    TooManyRequests { connector_id: String },

    /// The per-call timer fired before the backend answered.
    #[error("operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The connector implementation failed against its backend.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Internal errors
    /// Value could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient.
    ///
    /// Transient errors are caused by conditions that may resolve on their
    /// own (backend outage, saturation, slow calls). The circuit breaker
    /// counts `Timeout` and `Backend` as failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::CircuitOpen { .. }
                | ConnectorError::TooManyRequests { .. }
                | ConnectorError::Timeout { .. }
                | ConnectorError::Backend { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification in logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConfigInvalid { .. } => "CONFIG_INVALID",
            ConnectorError::UnknownConnectorType { .. } => "UNKNOWN_CONNECTOR_TYPE",
            ConnectorError::ConnectorNotFound { .. } => "CONNECTOR_NOT_FOUND",
            ConnectorError::NotSupported { .. } => "NOT_SUPPORTED",
            ConnectorError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ConnectorError::Translation { .. } => "TRANSLATION_FAILED",
            ConnectorError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            ConnectorError::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            ConnectorError::Timeout { .. } => "BREAKER_TIMEOUT",
            ConnectorError::Backend { .. } => "BACKEND_ERROR",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Stable name used in the `error.name` field of protocol responses.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            ConnectorError::ConfigInvalid { .. } => "ConfigInvalid",
            ConnectorError::UnknownConnectorType { .. } => "UnknownConnectorType",
            ConnectorError::ConnectorNotFound { .. } => "ConnectorNotFound",
            ConnectorError::NotSupported { .. } => "NotSupported",
            ConnectorError::ValidationFailed { .. } | ConnectorError::Translation { .. } => {
                "ValidationFailed"
            }
            ConnectorError::CircuitOpen { .. } => "CircuitOpen",
            ConnectorError::TooManyRequests { .. } => "TooManyRequests",
            ConnectorError::Timeout { .. } => "BreakerTimeout",
            ConnectorError::Backend { .. } => "BackendError",
            ConnectorError::Serialization { .. } | ConnectorError::Internal { .. } => {
                "InternalError"
            }
        }
    }

    // Convenience constructors

    /// Create a configuration error naming the offending property.
    pub fn config_invalid(property: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::ConfigInvalid {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ConnectorError::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create a translation error.
    pub fn translation(message: impl Into<String>) -> Self {
        ConnectorError::Translation {
            message: message.into(),
        }
    }

    /// Create a not-supported error for a named operation.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        ConnectorError::NotSupported {
            operation: operation.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        ConnectorError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error with source.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::Serialization {
            message: e.to_string(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
