//! Registered API surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded OpenAPI specification plus gateway-specific flags.
///
/// The raw document is kept in `content` so operations can be regenerated on
/// every load; operations themselves are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Raw OpenAPI document (YAML or JSON).
    #[serde(default)]
    pub content: String,
    /// Path prefix applied to every operation path. Either empty or starts
    /// with `/` and carries no trailing `/`.
    #[serde(default)]
    pub base_path: String,
    pub enabled: bool,
    /// Request tracing. Ephemeral: reset to false on process start.
    #[serde(default)]
    pub tracing: bool,
    /// Serve the OpenAPI example response when no rule matches.
    #[serde(default)]
    pub use_example_fallback: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upload payload for creating a spec.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecInput {
    #[serde(default)]
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update of spec settings. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecUpdate {
    pub name: Option<String>,
    pub base_path: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub tracing: Option<bool>,
    pub use_example_fallback: Option<bool>,
}
