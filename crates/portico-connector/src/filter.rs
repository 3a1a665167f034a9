//! Search filter AST
//!
//! A structured predicate tree parsed from untrusted JSON payloads.
//! Parsing enforces structural bounds (path length, fan-out, depth and a
//! total node cap) so hostile inputs cannot exhaust the stack or memory.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::ScalarValue;

/// Maximum path segments in a comparison.
const MAX_PATH_SEGMENTS: usize = 8;
/// Maximum length of a single path segment.
const MAX_SEGMENT_LEN: usize = 128;
/// Maximum children of a boolean combinator.
const MAX_COMBINATOR_CHILDREN: usize = 50;
/// Maximum values in an `IN` list.
const MAX_IN_VALUES: usize = 100;
/// Maximum nesting depth.
const MAX_DEPTH: usize = 50;
/// Cap on total nodes in one tree.
const MAX_TOTAL_NODES: usize = 1_000;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CmpOp {
    Eq,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
}

impl CmpOp {
    /// Get the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "EQ",
            CmpOp::Contains => "CONTAINS",
            CmpOp::StartsWith => "STARTS_WITH",
            CmpOp::EndsWith => "ENDS_WITH",
            CmpOp::Gt => "GT",
            CmpOp::Gte => "GTE",
            CmpOp::Lt => "LT",
            CmpOp::Lte => "LTE",
            CmpOp::In => "IN",
            CmpOp::Exists => "EXISTS",
        }
    }
}

/// Comparison operand: a single primitive or a primitive list (`IN`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
}

// Maps an explicit JSON `null` to `Some(Scalar(Null))` so it stays
// distinguishable from an absent `value` field.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<FilterValue>, D::Error>
where
    D: Deserializer<'de>,
{
    FilterValue::deserialize(deserializer).map(Some)
}

/// A filter predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Filter {
    /// A comparison against a dotted attribute path.
    #[serde(rename = "CMP")]
    Cmp {
        op: CmpOp,
        path: Vec<String>,
        #[serde(default, deserialize_with = "deserialize_present")]
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<FilterValue>,
    },
    /// All children must match.
    #[serde(rename = "AND")]
    And { nodes: Vec<Filter> },
    /// At least one child must match.
    #[serde(rename = "OR")]
    Or { nodes: Vec<Filter> },
    /// The child must not match.
    #[serde(rename = "NOT")]
    Not { node: Box<Filter> },
}

impl Filter {
    /// Parse and validate a filter from an untrusted JSON value.
    pub fn parse(value: &serde_json::Value) -> ConnectorResult<Filter> {
        let filter: Filter = serde_json::from_value(value.clone())
            .map_err(|e| ConnectorError::validation(format!("invalid filter: {e}")))?;
        filter.validate()?;
        Ok(filter)
    }

    /// Equality comparison on a single-segment path.
    pub fn eq(attribute: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
        Filter::cmp(CmpOp::Eq, attribute, value)
    }

    /// Substring comparison on a single-segment path.
    pub fn contains(attribute: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
        Filter::cmp(CmpOp::Contains, attribute, value)
    }

    /// Presence test on a single-segment path.
    pub fn exists(attribute: impl Into<String>) -> Filter {
        Filter::Cmp {
            op: CmpOp::Exists,
            path: vec![attribute.into()],
            value: None,
        }
    }

    /// Membership test on a single-segment path.
    pub fn is_in(attribute: impl Into<String>, values: Vec<ScalarValue>) -> Filter {
        Filter::Cmp {
            op: CmpOp::In,
            path: vec![attribute.into()],
            value: Some(FilterValue::List(values)),
        }
    }

    /// General comparison on a single-segment path.
    pub fn cmp(op: CmpOp, attribute: impl Into<String>, value: impl Into<ScalarValue>) -> Filter {
        Filter::Cmp {
            op,
            path: vec![attribute.into()],
            value: Some(FilterValue::Scalar(value.into())),
        }
    }

    /// Conjunction.
    #[must_use]
    pub fn and(nodes: Vec<Filter>) -> Filter {
        Filter::And { nodes }
    }

    /// Disjunction.
    #[must_use]
    pub fn or(nodes: Vec<Filter>) -> Filter {
        Filter::Or { nodes }
    }

    /// Negation.
    #[must_use]
    pub fn not(node: Filter) -> Filter {
        Filter::Not {
            node: Box::new(node),
        }
    }

    /// Validate structural bounds over the whole tree.
    pub fn validate(&self) -> ConnectorResult<()> {
        let mut nodes_seen = 0usize;
        self.validate_node(0, &mut nodes_seen)
    }

    fn validate_node(&self, depth: usize, nodes_seen: &mut usize) -> ConnectorResult<()> {
        if depth > MAX_DEPTH {
            return Err(ConnectorError::validation(format!(
                "filter exceeds maximum depth {MAX_DEPTH}"
            )));
        }
        *nodes_seen += 1;
        if *nodes_seen > MAX_TOTAL_NODES {
            return Err(ConnectorError::validation(format!(
                "filter exceeds maximum size of {MAX_TOTAL_NODES} nodes"
            )));
        }

        match self {
            Filter::Cmp { op, path, value } => Self::validate_cmp(*op, path, value.as_ref()),
            Filter::And { nodes } | Filter::Or { nodes } => {
                if nodes.is_empty() {
                    return Err(ConnectorError::validation(
                        "boolean combinator requires at least one child",
                    ));
                }
                if nodes.len() > MAX_COMBINATOR_CHILDREN {
                    return Err(ConnectorError::validation(format!(
                        "boolean combinator has {} children, at most {MAX_COMBINATOR_CHILDREN} allowed",
                        nodes.len()
                    )));
                }
                for node in nodes {
                    node.validate_node(depth + 1, nodes_seen)?;
                }
                Ok(())
            }
            Filter::Not { node } => node.validate_node(depth + 1, nodes_seen),
        }
    }

    fn validate_cmp(op: CmpOp, path: &[String], value: Option<&FilterValue>) -> ConnectorResult<()> {
        if path.is_empty() || path.len() > MAX_PATH_SEGMENTS {
            return Err(ConnectorError::validation(format!(
                "filter path must have 1..={MAX_PATH_SEGMENTS} segments, got {}",
                path.len()
            )));
        }
        for segment in path {
            if segment.is_empty() {
                return Err(ConnectorError::validation("filter path segment must not be empty"));
            }
            if segment.len() > MAX_SEGMENT_LEN {
                return Err(ConnectorError::validation(format!(
                    "filter path segment exceeds {MAX_SEGMENT_LEN} characters"
                )));
            }
        }

        match op {
            CmpOp::Exists => {
                if value.is_some() {
                    return Err(ConnectorError::validation("EXISTS must not carry a value"));
                }
            }
            CmpOp::In => match value {
                Some(FilterValue::List(values)) => {
                    if values.is_empty() || values.len() > MAX_IN_VALUES {
                        return Err(ConnectorError::validation(format!(
                            "IN requires 1..={MAX_IN_VALUES} values, got {}",
                            values.len()
                        )));
                    }
                }
                _ => {
                    return Err(ConnectorError::validation(
                        "IN requires an array of primitive values",
                    ));
                }
            },
            _ => match value {
                Some(FilterValue::Scalar(_)) => {}
                Some(FilterValue::List(_)) => {
                    return Err(ConnectorError::validation(format!(
                        "{} requires a single primitive value, not a list",
                        op.as_str()
                    )));
                }
                None => {
                    return Err(ConnectorError::validation(format!(
                        "{} requires a value",
                        op.as_str()
                    )));
                }
            },
        }

        Ok(())
    }

    /// The dotted rendering of a comparison path.
    #[must_use]
    pub fn dotted_path(path: &[String]) -> String {
        path.join(".")
    }
}
