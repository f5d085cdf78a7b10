//! Statistics view types returned by the admin API.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_requests: i64,
    pub total_errors: i64,
    pub active_specs: usize,
    pub total_operations: usize,
    pub avg_response_time_ms: f64,
    pub requests_per_second: f64,
    pub start_time: DateTime<Utc>,
    pub uptime: String,
    pub top_operations: Vec<OperationStat>,
    pub recent_errors: Vec<ErrorStat>,
    pub requests_by_hour: Vec<HourlyStat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecStats {
    pub spec_id: String,
    pub spec_name: String,
    pub total_requests: i64,
    pub total_errors: i64,
    pub avg_response_time_ms: f64,
    pub operations: Vec<OperationStat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStat {
    pub operation_id: String,
    pub spec_id: String,
    pub method: String,
    pub path: String,
    pub total_requests: i64,
    pub total_errors: i64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_request_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStat {
    pub timestamp: DateTime<Utc>,
    pub spec_id: String,
    pub operation_id: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyStat {
    pub hour: String,
    pub requests: i64,
    pub errors: i64,
}
