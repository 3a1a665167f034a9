//! Connector framework type definitions
//!
//! Keys, operation kinds and circuit state shared across the framework.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConnectorError, ConnectorResult};

/// Composite key identifying a registered connector factory.
///
/// Rendered as `type@version` (e.g. `ldap@1.2.0`). The version component
/// must be valid semver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorKey {
    /// Connector type name (e.g. `ldap`, `graph`).
    pub connector_type: String,
    /// Connector version (semver).
    pub version: String,
}

impl ConnectorKey {
    /// Create a new key, validating the version component.
    pub fn new(
        connector_type: impl Into<String>,
        version: impl Into<String>,
    ) -> ConnectorResult<Self> {
        let connector_type = connector_type.into();
        let version = version.into();

        if connector_type.is_empty() {
            return Err(ConnectorError::validation("connector type must not be empty"));
        }
        if semver::Version::parse(&version).is_err() {
            return Err(ConnectorError::validation(format!(
                "invalid connector version '{version}': must be valid semver"
            )));
        }

        Ok(Self {
            connector_type,
            version,
        })
    }

    /// Parsed semver version.
    #[must_use]
    pub fn semver(&self) -> semver::Version {
        // Validated in `new`; an unparseable version cannot be constructed.
        semver::Version::parse(&self.version).unwrap_or_else(|_| semver::Version::new(0, 0, 0))
    }

    /// The composite `type@version` form used as a registry key.
    #[must_use]
    pub fn composite(&self) -> String {
        format!("{}@{}", self.connector_type, self.version)
    }
}

impl fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.connector_type, self.version)
    }
}

impl FromStr for ConnectorKey {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (connector_type, version) = s.split_once('@').ok_or_else(|| {
            ConnectorError::validation(format!("invalid connector key '{s}': expected type@version"))
        })?;
        ConnectorKey::new(connector_type, version)
    }
}

/// A uniform operation the framework can route to a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Get,
    Search,
    Sync,
}

impl OperationKind {
    /// Get all operation kinds.
    #[must_use]
    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::Create,
            OperationKind::Update,
            OperationKind::Delete,
            OperationKind::Get,
            OperationKind::Search,
            OperationKind::Sync,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Get => "GET",
            OperationKind::Search => "SEARCH",
            OperationKind::Sync => "SYNC",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(OperationKind::Create),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            "GET" => Ok(OperationKind::Get),
            "SEARCH" => Ok(OperationKind::Search),
            "SYNC" => Ok(OperationKind::Sync),
            _ => Err(ConnectorError::validation(format!(
                "invalid operation kind '{s}'"
            ))),
        }
    }
}

/// Circuit breaker state for connector health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, operations are processed normally
    #[default]
    Closed,
    /// Circuit is open, operations are rejected
    Open,
    /// Circuit is half-open, probe operations are allowed
    HalfOpen,
}

impl CircuitState {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Check if operations should be allowed through.
    #[must_use]
    pub fn allows_operations(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
