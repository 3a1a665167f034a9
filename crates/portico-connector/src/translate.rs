//! Filter translation to backend query dialects
//!
//! Renders a validated [`Filter`] either as an OData-style query string or
//! as a parameterized SQL predicate. User-supplied data only ever appears
//! inside quoted literals (query strings) or bind parameters (SQL); field
//! names are restricted to a per-call allow-list.

use std::collections::{HashMap, HashSet};

use crate::error::{ConnectorError, ConnectorResult};
use crate::filter::{CmpOp, Filter, FilterValue};
use crate::operation::ScalarValue;

/// Translate a filter to an OData-style query expression.
///
/// `allowed_paths` is the per-call set of single-segment attribute names
/// the backend accepts. Nested paths and unlisted paths fail translation.
pub fn to_query_filter(filter: &Filter, allowed_paths: &HashSet<String>) -> ConnectorResult<String> {
    filter.validate()?;
    render_query_node(filter, allowed_paths)
}

fn render_query_node(filter: &Filter, allowed: &HashSet<String>) -> ConnectorResult<String> {
    match filter {
        Filter::Cmp { op, path, value } => render_query_cmp(*op, path, value.as_ref(), allowed),
        Filter::And { nodes } => render_query_join(nodes, "and", allowed),
        Filter::Or { nodes } => render_query_join(nodes, "or", allowed),
        Filter::Not { node } => Ok(format!("(not {})", render_query_node(node, allowed)?)),
    }
}

fn render_query_join(
    nodes: &[Filter],
    joiner: &str,
    allowed: &HashSet<String>,
) -> ConnectorResult<String> {
    let parts = nodes
        .iter()
        .map(|n| render_query_node(n, allowed))
        .collect::<ConnectorResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(&format!(" {joiner} "))))
}

fn render_query_cmp(
    op: CmpOp,
    path: &[String],
    value: Option<&FilterValue>,
    allowed: &HashSet<String>,
) -> ConnectorResult<String> {
    let field = query_field(path, allowed)?;

    match op {
        CmpOp::Eq => Ok(format!("{field} eq {}", query_scalar(scalar_of(value)?))),
        CmpOp::Gt => Ok(format!("{field} gt {}", query_scalar(scalar_of(value)?))),
        CmpOp::Gte => Ok(format!("{field} ge {}", query_scalar(scalar_of(value)?))),
        CmpOp::Lt => Ok(format!("{field} lt {}", query_scalar(scalar_of(value)?))),
        CmpOp::Lte => Ok(format!("{field} le {}", query_scalar(scalar_of(value)?))),
        CmpOp::Contains => Ok(format!(
            "contains({field}, {})",
            query_scalar(scalar_of(value)?)
        )),
        CmpOp::StartsWith => Ok(format!(
            "startswith({field}, {})",
            query_scalar(scalar_of(value)?)
        )),
        CmpOp::EndsWith => Ok(format!(
            "endswith({field}, {})",
            query_scalar(scalar_of(value)?)
        )),
        CmpOp::In => {
            let values = list_of(value)?;
            let rendered: Vec<String> = values.iter().map(query_scalar).collect();
            Ok(format!("{field} in ({})", rendered.join(", ")))
        }
        CmpOp::Exists => Ok(format!("{field} ne null")),
    }
}

fn query_field<'a>(path: &'a [String], allowed: &HashSet<String>) -> ConnectorResult<&'a str> {
    if path.len() != 1 {
        return Err(ConnectorError::translation(format!(
            "nested path '{}' is not supported by the query-string dialect",
            Filter::dotted_path(path)
        )));
    }
    let field = path[0].as_str();
    if !allowed.contains(field) {
        return Err(ConnectorError::translation(format!(
            "path '{field}' is not in the allowed set"
        )));
    }
    Ok(field)
}

/// Render a scalar as an OData literal. Strings are single-quoted with
/// embedded quotes doubled per the OData ABNF.
fn query_scalar(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Null => "null".to_string(),
        ScalarValue::Boolean(b) => b.to_string(),
        ScalarValue::Integer(i) => i.to_string(),
        ScalarValue::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// A translated SQL predicate fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// Predicate text containing only allow-listed identifiers, operators
    /// and `$N` placeholders.
    pub sql: String,
    /// Bind parameters, one per placeholder, in order.
    pub params: Vec<ScalarValue>,
    /// First placeholder index not used by this fragment.
    pub next_index: usize,
}

/// Translate a filter to a parameterized SQL predicate.
///
/// `columns` maps dotted attribute paths to already-quoted column
/// identifiers; identifiers must match `"[A-Za-z0-9_]+"` exactly.
/// Placeholders are numbered from `start_index`.
pub fn to_sql(
    filter: &Filter,
    columns: &HashMap<String, String>,
    start_index: usize,
) -> ConnectorResult<SqlFragment> {
    filter.validate()?;

    let mut params = Vec::new();
    let mut next_index = start_index;
    let sql = render_sql_node(filter, columns, &mut params, &mut next_index)?;

    Ok(SqlFragment {
        sql,
        params,
        next_index,
    })
}

fn render_sql_node(
    filter: &Filter,
    columns: &HashMap<String, String>,
    params: &mut Vec<ScalarValue>,
    next_index: &mut usize,
) -> ConnectorResult<String> {
    match filter {
        Filter::Cmp { op, path, value } => {
            render_sql_cmp(*op, path, value.as_ref(), columns, params, next_index)
        }
        Filter::And { nodes } => render_sql_join(nodes, "AND", columns, params, next_index),
        Filter::Or { nodes } => render_sql_join(nodes, "OR", columns, params, next_index),
        Filter::Not { node } => Ok(format!(
            "NOT ({})",
            render_sql_node(node, columns, params, next_index)?
        )),
    }
}

fn render_sql_join(
    nodes: &[Filter],
    joiner: &str,
    columns: &HashMap<String, String>,
    params: &mut Vec<ScalarValue>,
    next_index: &mut usize,
) -> ConnectorResult<String> {
    let parts = nodes
        .iter()
        .map(|n| render_sql_node(n, columns, params, next_index))
        .collect::<ConnectorResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(&format!(" {joiner} "))))
}

fn render_sql_cmp(
    op: CmpOp,
    path: &[String],
    value: Option<&FilterValue>,
    columns: &HashMap<String, String>,
    params: &mut Vec<ScalarValue>,
    next_index: &mut usize,
) -> ConnectorResult<String> {
    let dotted = Filter::dotted_path(path);
    let column = columns.get(&dotted).ok_or_else(|| {
        ConnectorError::translation(format!("path '{dotted}' has no column mapping"))
    })?;
    if !is_safe_column(column) {
        return Err(ConnectorError::translation(format!(
            "column identifier for '{dotted}' fails the safety check"
        )));
    }

    let mut bind = |params: &mut Vec<ScalarValue>, value: ScalarValue| {
        let placeholder = format!("${}", *next_index);
        *next_index += 1;
        params.push(value);
        placeholder
    };

    match op {
        CmpOp::Eq => match scalar_of(value)? {
            ScalarValue::Null => Ok(format!("{column} IS NULL")),
            scalar => {
                let p = bind(params, scalar.clone());
                Ok(format!("{column} = {p}"))
            }
        },
        CmpOp::Gt | CmpOp::Gte | CmpOp::Lt | CmpOp::Lte => {
            let symbol = match op {
                CmpOp::Gt => ">",
                CmpOp::Gte => ">=",
                CmpOp::Lt => "<",
                _ => "<=",
            };
            let p = bind(params, scalar_of(value)?.clone());
            Ok(format!("{column} {symbol} {p}"))
        }
        CmpOp::Contains | CmpOp::StartsWith | CmpOp::EndsWith => {
            let raw = match scalar_of(value)? {
                ScalarValue::String(s) => s.clone(),
                other => {
                    return Err(ConnectorError::translation(format!(
                        "{} requires a string value, got {other:?}",
                        op.as_str()
                    )));
                }
            };
            let pattern = match op {
                CmpOp::Contains => format!("%{raw}%"),
                CmpOp::StartsWith => format!("{raw}%"),
                _ => format!("%{raw}"),
            };
            let p = bind(params, ScalarValue::String(pattern));
            Ok(format!("{column} LIKE {p}"))
        }
        CmpOp::In => {
            let values = list_of(value)?;
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| bind(params, v.clone()))
                .collect();
            Ok(format!("{column} = ANY(array[{}])", placeholders.join(", ")))
        }
        CmpOp::Exists => Ok(format!("{column} IS NOT NULL")),
    }
}

/// A column identifier is safe when it is a double-quoted run of
/// `[A-Za-z0-9_]` with nothing else.
fn is_safe_column(column: &str) -> bool {
    let Some(inner) = column
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return false;
    };
    !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn scalar_of(value: Option<&FilterValue>) -> ConnectorResult<&ScalarValue> {
    match value {
        Some(FilterValue::Scalar(s)) => Ok(s),
        // Unreachable after Filter::validate; kept total.
        _ => Err(ConnectorError::translation("comparison requires a scalar value")),
    }
}

fn list_of(value: Option<&FilterValue>) -> ConnectorResult<&[ScalarValue]> {
    match value {
        Some(FilterValue::List(values)) => Ok(values),
        _ => Err(ConnectorError::translation("IN requires a value list")),
    }
}
