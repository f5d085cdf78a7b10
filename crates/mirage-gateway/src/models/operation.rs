//! Operations derived from a spec.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `(method, path)` endpoint inside a spec.
///
/// Regenerated from the stored spec document on every start or spec update.
/// The id is a pure function of `(specId, method, path)` so response rules
/// keep pointing at the same operation across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    pub spec_id: String,
    /// Uppercased HTTP method.
    pub method: String,
    /// Raw path pattern with `{param}` placeholders, e.g. `/users/{id}`.
    pub path: String,
    /// Base path + path.
    pub full_path: String,
    /// The `operationId` from the OpenAPI document, or a generated one.
    pub operation_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_response: Option<ExampleResponse>,
}

/// Example success response lifted out of the OpenAPI document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// Lightweight operation view for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub id: String,
    pub spec_id: String,
    pub method: String,
    pub path: String,
    pub full_path: String,
    pub operation_id: String,
    pub summary: String,
    pub response_count: usize,
    pub has_example_response: bool,
}
