//! Response rules attached to operations.

use super::Condition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An admin-configured synthesized response bound to an operation.
///
/// Rules are consulted in ascending priority order (lower wins); ties break
/// by creation time. Header values and the body may contain `{{...}}`
/// template tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRule {
    pub id: String,
    pub operation_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    /// Response delay in milliseconds.
    #[serde(default, rename = "delay")]
    pub delay_ms: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a response rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRuleInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, rename = "delay")]
    pub delay_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Partial update of a response rule. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub conditions: Option<Vec<Condition>>,
    pub status_code: Option<u16>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    #[serde(rename = "delay")]
    pub delay_ms: Option<u64>,
    pub enabled: Option<bool>,
}
