//! Captured request/response traces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A structured record of one dispatched request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub id: String,
    pub spec_id: String,
    pub spec_name: String,
    pub operation_id: String,
    pub operation_path: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ns: i64,
    pub request: TraceRequest,
    pub response: TraceResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<String>,
    /// Name of the matched rule, or the sentinel `"spec-example"` when the
    /// example fallback served the response.
    pub matched_rule_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    #[serde(default)]
    pub query: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// Lazily applied filter for reading traces back out of the ring.
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    pub spec_id: Option<String>,
    pub operation_id: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
