//! Route dispatch for the `/_api` surface.

use super::handlers::{rules, specs, stats, system, traces};
use super::types::not_found;
use super::AdminContext;
use crate::engine::parse_query;
use crate::trace::handle_trace_stream;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Dispatch an admin request. The caller guarantees the path starts with
/// `/_api`.
pub async fn route_admin(
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());

    debug!("admin: {method} {path}");

    // Preflight for browser-based admin clients
    if method == Method::OPTIONS {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        return with_cors(response);
    }

    let stripped = path.strip_prefix("/_api").unwrap_or(&path);
    let segments: Vec<&str> = stripped
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    // The trace stream upgrades the connection and must see the raw
    // request before anything consumes it.
    if method == Method::GET && segments == ["traces", "stream"] {
        return handle_trace_stream(req, Arc::clone(&ctx.trace_bus));
    }

    let response = match (&method, segments.as_slice()) {
        // Specs
        (&Method::GET, ["specs"]) => specs::list(&ctx),
        (&Method::POST, ["specs"]) => specs::create(req, ctx).await,
        (&Method::GET, ["specs", id]) => specs::get(id, &ctx),
        (&Method::PUT, ["specs", id]) => {
            let id = id.to_string();
            specs::update(&id, req, ctx).await
        }
        (&Method::DELETE, ["specs", id]) => specs::delete(id, &ctx),
        (&Method::PUT, ["specs", id, "enable"]) => specs::set_enabled(id, true, &ctx),
        (&Method::PUT, ["specs", id, "disable"]) => specs::set_enabled(id, false, &ctx),
        (&Method::PUT, ["specs", id, "tracing"]) => {
            let id = id.to_string();
            specs::toggle_tracing(&id, req, ctx).await
        }
        (&Method::PUT, ["specs", id, "example-fallback"]) => {
            let id = id.to_string();
            specs::toggle_example_fallback(&id, req, ctx).await
        }
        (&Method::GET, ["specs", id, "operations"]) => specs::list_operations(id, &ctx),

        // Operations
        (&Method::GET, ["operations", id]) => specs::get_operation(id, &ctx),
        (&Method::GET, ["operations", id, "responses"]) => rules::list(id, &ctx),
        (&Method::POST, ["operations", id, "responses"]) => {
            let id = id.to_string();
            rules::create(&id, req, ctx).await
        }

        // Response rules
        (&Method::GET, ["responses", id]) => rules::get(id, &ctx),
        (&Method::PUT, ["responses", id]) => {
            let id = id.to_string();
            rules::update(&id, req, ctx).await
        }
        (&Method::DELETE, ["responses", id]) => rules::delete(id, &ctx),
        (&Method::PUT, ["responses", id, "priority"]) => {
            let id = id.to_string();
            rules::update_priority(&id, req, ctx).await
        }

        // Statistics
        (&Method::GET, ["stats"]) => stats::global(&ctx),
        (&Method::GET, ["stats", "specs", id]) => stats::spec(id, &ctx),
        (&Method::GET, ["stats", "operations", id]) => stats::operation(id, &ctx),
        (&Method::POST, ["stats", "reset"]) => stats::reset(&ctx),

        // Traces
        (&Method::GET, ["traces"]) => traces::list(&query, &ctx),
        (&Method::GET, ["traces", id]) => traces::get(id, &ctx),
        (&Method::DELETE, ["traces"]) => traces::clear(&query, &ctx),

        // System
        (&Method::GET, ["routes"]) => system::routes(&ctx),
        (&Method::GET, ["health"]) => system::health(),

        _ => not_found("Not Found"),
    };

    with_cors(response)
}

/// The admin UI is a browser client; every response carries CORS headers.
fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        hyper::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        hyper::header::HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS, PATCH"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        hyper::header::HeaderValue::from_static("Origin, Content-Type, Accept, Authorization"),
    );
    headers.insert(
        "Access-Control-Max-Age",
        hyper::header::HeaderValue::from_static("86400"),
    );
    response
}
