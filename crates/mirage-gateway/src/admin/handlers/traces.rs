//! Trace read and clear handlers. The live stream lives in
//! `trace::websocket`.

use crate::admin::types::{json_response, message_response, not_found};
use crate::admin::AdminContext;
use crate::models::TraceFilter;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::collections::HashMap;

const DEFAULT_LIST_LIMIT: usize = 100;

/// `GET /_api/traces?specId=&operationId=&method=`.
pub fn list(query: &HashMap<String, Vec<String>>, ctx: &AdminContext) -> Response<Full<Bytes>> {
    let first = |key: &str| -> Option<String> {
        query
            .get(key)
            .and_then(|vals| vals.first())
            .filter(|v| !v.is_empty())
            .cloned()
    };

    let filter = TraceFilter {
        spec_id: first("specId"),
        operation_id: first("operationId"),
        method: first("method"),
        status_code: None,
        start_time: None,
        end_time: None,
        limit: Some(DEFAULT_LIST_LIMIT),
    };

    json_response(StatusCode::OK, &ctx.trace_bus.get_traces(&filter))
}

/// `GET /_api/traces/{id}`.
pub fn get(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.trace_bus.get_trace(id) {
        Some(trace) => json_response(StatusCode::OK, &trace),
        None => not_found("Trace not found"),
    }
}

/// `DELETE /_api/traces` with an optional `specId` scope.
pub fn clear(query: &HashMap<String, Vec<String>>, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match query
        .get("specId")
        .and_then(|vals| vals.first())
        .filter(|v| !v.is_empty())
    {
        Some(spec_id) => ctx.trace_bus.clear_by_spec(spec_id),
        None => ctx.trace_bus.clear(),
    }
    message_response("Traces cleared")
}
