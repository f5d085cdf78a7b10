//! Statistics handlers.

use crate::admin::types::{json_response, message_response, not_found};
use crate::admin::AdminContext;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// `GET /_api/stats`.
pub fn global(ctx: &AdminContext) -> Response<Full<Bytes>> {
    let active_specs = ctx.store.get_enabled_specs().map(|s| s.len()).unwrap_or(0);
    let total_operations = ctx.store.get_all_operations().map(|o| o.len()).unwrap_or(0);
    json_response(
        StatusCode::OK,
        &ctx.stats.global_stats(active_specs, total_operations),
    )
}

/// `GET /_api/stats/specs/{id}`.
pub fn spec(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.store.get_spec(id) {
        Ok(spec) => json_response(StatusCode::OK, &ctx.stats.spec_stats(id, &spec.name)),
        Err(_) => not_found("Spec not found"),
    }
}

/// `GET /_api/stats/operations/{id}`.
pub fn operation(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.stats.operation_stats(id) {
        Some(stats) => json_response(StatusCode::OK, &stats),
        None => json_response(
            StatusCode::OK,
            &serde_json::json!({ "message": "No statistics available" }),
        ),
    }
}

/// `POST /_api/stats/reset`.
pub fn reset(ctx: &AdminContext) -> Response<Full<Bytes>> {
    ctx.stats.reset();
    message_response("Statistics reset")
}
