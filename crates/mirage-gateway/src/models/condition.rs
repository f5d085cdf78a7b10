//! Request-matching predicates.

use serde::{Deserialize, Serialize};

/// Where a condition reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionSource {
    /// Path parameter captured by the route pattern.
    Path,
    /// First value of a query parameter.
    Query,
    /// First value of a header, looked up case-insensitively.
    Header,
    /// JSON path extraction on the request body.
    Body,
}

/// How the extracted value is compared against the expected one.
///
/// The numeric operators coerce both sides to f64 and fall back to
/// lexicographic order when either side does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,
    Exists,
    NotExists,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A single predicate: source selector + key + operator + expected value.
///
/// A rule's conditions combine with AND; the empty list is vacuously true.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub source: ConditionSource,
    /// Parameter name for path/query/header, a JSON path for body.
    pub key: String,
    pub operator: ConditionOperator,
    /// Expected value. Ignored by `exists`/`notExists`.
    #[serde(default)]
    pub value: String,
}
