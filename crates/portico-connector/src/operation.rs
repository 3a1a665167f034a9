//! Uniform operation types
//!
//! Objects, attribute values, the operation-options bag and the result
//! shapes shared by every connector operation.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConnectorError, ConnectorResult};

/// Marker attribute conveying a deletion in a sync delta.
pub const DELETED_MARKER: &str = "__DELETED__";

/// Longest accepted attribute name.
const MAX_ATTRIBUTE_NAME_LEN: usize = 128;

/// A primitive attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// JSON null.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// String value.
    String(String),
}

impl ScalarValue {
    /// Get the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

/// A single attribute value: primitive, ordered primitives, a nested
/// complex object, or ordered complex objects. Complex values may nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single primitive.
    Scalar(ScalarValue),
    /// An ordered sequence of primitives.
    ScalarList(Vec<ScalarValue>),
    /// A nested complex object.
    Complex(BTreeMap<String, AttributeValue>),
    /// An ordered sequence of complex objects.
    ComplexList(Vec<BTreeMap<String, AttributeValue>>),
}

impl AttributeValue {
    /// Convenience constructor for a string scalar.
    pub fn string(v: impl Into<String>) -> Self {
        AttributeValue::Scalar(ScalarValue::String(v.into()))
    }

    /// Convenience constructor for a boolean scalar.
    #[must_use]
    pub fn boolean(v: bool) -> Self {
        AttributeValue::Scalar(ScalarValue::Boolean(v))
    }

    /// Convenience constructor for an integer scalar.
    #[must_use]
    pub fn integer(v: i64) -> Self {
        AttributeValue::Scalar(ScalarValue::Integer(v))
    }
}

/// Attribute name → value mapping carried by objects and write payloads.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Validate attribute names: non-empty, bounded length.
pub fn validate_attribute_names(attributes: &AttributeMap) -> ConnectorResult<()> {
    for name in attributes.keys() {
        if name.is_empty() {
            return Err(ConnectorError::validation("attribute name must not be empty"));
        }
        if name.len() > MAX_ATTRIBUTE_NAME_LEN {
            let shown: String = name.chars().take(32).collect();
            return Err(ConnectorError::validation(format!(
                "attribute name '{shown}…' exceeds {MAX_ATTRIBUTE_NAME_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// An object surfaced by a connector.
///
/// `uid` is the stable identifier, unique within (connector instance,
/// object class). `name` is the optional human-readable identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorObject {
    /// Logical type of the remote entity (e.g. `User`, `Group`).
    pub object_class: String,
    /// Stable identifier within the object class.
    pub uid: String,
    /// Human-readable name, when the backend has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Attribute values keyed by name.
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl ConnectorObject {
    /// Create a new object with no attributes.
    pub fn new(object_class: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            uid: uid.into(),
            name: None,
            attributes: AttributeMap::new(),
        }
    }

    /// Set the human-readable name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Build the marker object conveying a deletion in a sync delta.
    pub fn deleted(object_class: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::new(object_class, uid).with_attribute(DELETED_MARKER, AttributeValue::boolean(true))
    }

    /// Whether this object carries the deletion marker.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(
            self.attributes.get(DELETED_MARKER),
            Some(AttributeValue::Scalar(ScalarValue::Boolean(true)))
        )
    }

    /// Get an attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.object_class.is_empty() {
            return Err(ConnectorError::validation("objectClass must not be empty"));
        }
        if self.uid.is_empty() {
            return Err(ConnectorError::validation("uid must not be empty"));
        }
        validate_attribute_names(&self.attributes)
    }
}

/// Search scope relative to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    Object,
    OneLevel,
    Subtree,
}

/// Policy for computing the total result count of a paged search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TotalPagedResultsPolicy {
    None,
    Estimate,
    Exact,
}

/// Sort direction for the `sortOrder` convenience key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    /// Attribute to sort on.
    pub field: String,
    /// Ascending when true.
    #[serde(default = "default_true")]
    pub ascending: bool,
}

fn default_true() -> bool {
    true
}

/// Reference to a container object for scoped searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRef {
    pub object_class: String,
    pub uid: String,
}

/// The operation-options bag.
///
/// All keys are optional; `validate` enforces the documented bounds.
/// Unknown keys are rejected at deserialization time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationOptions {
    /// Requested attribute projection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,

    /// Page size, 1..=500.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Zero-based paging offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paged_results_offset: Option<u64>,

    /// Opaque continuation token from a prior page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paged_results_cookie: Option<String>,

    /// Sort keys, at most 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_keys: Option<Vec<SortKey>>,

    /// Convenience single sort field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    /// Convenience sort direction for `sort_by`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,

    /// Container to search under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerRef>,

    /// Search scope relative to `container`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SearchScope>,

    /// Total-count policy for paged searches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_paged_results_policy: Option<TotalPagedResultsPolicy>,

    /// Execute as this user, when the backend supports impersonation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<String>,

    /// Password for `run_as_user`. Never serialized back out; read it
    /// through [`secrecy::ExposeSecret`].
    #[serde(default, skip_serializing)]
    pub run_with_password: Option<SecretString>,

    /// Force serial execution of a batched operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_serial: Option<bool>,

    /// Abort a batched operation on first error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_on_error: Option<bool>,

    /// Per-call timeout override, 100..=120000 ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl OperationOptions {
    /// Create an empty options bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attribute projection.
    #[must_use]
    pub fn with_attributes_to_get(mut self, attrs: Vec<String>) -> Self {
        self.attributes_to_get = Some(attrs);
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate the documented bounds.
    pub fn validate(&self) -> ConnectorResult<()> {
        if let Some(size) = self.page_size {
            if !(1..=500).contains(&size) {
                return Err(ConnectorError::validation(format!(
                    "pageSize {size} out of range 1..=500"
                )));
            }
        }
        if let Some(keys) = &self.sort_keys {
            if keys.len() > 5 {
                return Err(ConnectorError::validation(format!(
                    "sortKeys has {} entries, at most 5 allowed",
                    keys.len()
                )));
            }
            for key in keys {
                if key.field.is_empty() {
                    return Err(ConnectorError::validation("sortKeys field must not be empty"));
                }
            }
        }
        if let Some(timeout) = self.timeout_ms {
            if !(100..=120_000).contains(&timeout) {
                return Err(ConnectorError::validation(format!(
                    "timeoutMs {timeout} out of range 100..=120000"
                )));
            }
        }
        Ok(())
    }

    /// The effective sort keys, folding the `sort_by`/`sort_order`
    /// convenience keys in when no explicit list is present.
    #[must_use]
    pub fn effective_sort_keys(&self) -> Vec<SortKey> {
        if let Some(keys) = &self.sort_keys {
            return keys.clone();
        }
        match &self.sort_by {
            Some(field) => vec![SortKey {
                field: field.clone(),
                ascending: !matches!(self.sort_order, Some(SortOrder::Desc)),
            }],
            None => Vec::new(),
        }
    }

    /// Attribute projection normalized for cache keying: sorted and
    /// deduplicated.
    #[must_use]
    pub fn normalized_attributes_to_get(&self) -> Vec<String> {
        let mut attrs = self.attributes_to_get.clone().unwrap_or_default();
        attrs.sort();
        attrs.dedup();
        attrs
    }
}

/// Opaque delta-sync continuation marker. Only the connector interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncToken {
    pub value: String,
}

impl SyncToken {
    /// Create a token from its opaque value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Result of a delta-sync call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDelta {
    /// Token to resume from on the next call.
    pub token: SyncToken,
    /// Changed objects; deletions carry the [`DELETED_MARKER`] attribute.
    pub changes: Vec<ConnectorObject>,
}

/// One page of list-mode search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<ConnectorObject>,
    /// Offset of the next page, when more results exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u64>,
}

/// Terminal status of a streaming search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingSearchResult {
    /// Continuation cookie observed on the last fetched page.
    pub paged_results_cookie: Option<String>,
    /// Remaining result estimate, when the backend reports one.
    pub remaining_paged_results: Option<i64>,
}

/// Context for running a script on the connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptContext {
    /// Script language understood by the connector (e.g. `powershell`).
    pub language: String,
    /// Script body.
    pub script: String,
    /// Optional named arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Map<String, serde_json::Value>>,
}
