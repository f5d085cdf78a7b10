//! Health and route inspection handlers.

use crate::admin::types::json_response;
use crate::admin::AdminContext;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// `GET /_api/health`.
pub fn health() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }),
    )
}

/// `GET /_api/routes` - method to full-path listing from the live table.
pub fn routes(ctx: &AdminContext) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &ctx.engine.registered_routes())
}
