//! HTTP listener and top-level request routing.
//!
//! One listener serves three surfaces: `/_api/*` goes to the admin router,
//! `/_ui/*` is reserved for the (separately deployed) console, and every
//! other path is dispatched against the virtualized API surface.

mod io;
mod tls;

pub use io::TimeoutIo;
pub use tls::{create_tls_acceptor, load_or_generate};

use crate::admin::{route_admin, AdminContext};
use crate::config::Config;
use crate::engine::{Engine, GatewayRequest};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Run the gateway until ctrl-c. Owns the accept loop and the graceful
/// teardown of the trace bus and store.
pub async fn run(config: Config, ctx: Arc<AdminContext>) -> Result<(), anyhow::Error> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;

    let tls_acceptor = if config.server.tls.enabled {
        Some(load_or_generate(&config.server.tls, &config.tls_store_path())?)
    } else {
        None
    };

    let scheme = if tls_acceptor.is_some() { "https" } else { "http" };
    info!("mirage gateway listening on {scheme}://{addr}");
    info!("admin API available at {scheme}://{addr}/_api/");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                debug!("connection from {peer}");

                // Deadlines wrap the raw stream so the TLS handshake and
                // everything above it are bounded too.
                let stream = TimeoutIo::new(stream, READ_TIMEOUT, WRITE_TIMEOUT, IDLE_TIMEOUT);
                let ctx = Arc::clone(&ctx);
                match tls_acceptor.clone() {
                    Some(acceptor) => {
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => serve_connection(TokioIo::new(tls_stream), ctx).await,
                                Err(e) => debug!("TLS handshake failed from {peer}: {e}"),
                            }
                        });
                    }
                    None => {
                        tokio::spawn(serve_connection(TokioIo::new(stream), ctx));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // Release the singletons deliberately rather than relying on process
    // exit: close subscriber channels, then the store.
    ctx.trace_bus.close();
    if let Err(e) = ctx.store.close() {
        error!("store close failed: {e}");
    }
    info!("server stopped");
    Ok(())
}

async fn serve_connection<I>(io: I, ctx: Arc<AdminContext>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let ctx = Arc::clone(&ctx);
        async move { handle(req, ctx).await }
    });

    if let Err(e) = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(READ_TIMEOUT)
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        debug!("connection error: {e}");
    }
}

/// Top-level per-request entry point. The handler future runs in its own
/// task so a panic anywhere in the pipeline degrades to a 500 instead of
/// tearing the connection down.
async fn handle(
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let handle = tokio::spawn(async move { route(req, ctx).await });
    match handle.await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("request handler panicked: {e}");
            Ok(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ))
        }
    }
}

async fn route(req: Request<Incoming>, ctx: Arc<AdminContext>) -> Response<Full<Bytes>> {
    let path = req.uri().path();

    if path == "/_api" || path.starts_with("/_api/") {
        return route_admin(req, ctx).await;
    }

    if path == "/_ui" || path.starts_with("/_ui/") {
        // The console ships separately; the prefix stays reserved.
        return plain_response(StatusCode::SERVICE_UNAVAILABLE, "UI not bundled");
    }

    dispatch_proxied(req, ctx).await
}

/// Buffer the request and hand it to the dispatch pipeline.
async fn dispatch_proxied(req: Request<Incoming>, ctx: Arc<AdminContext>) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    // Condition matching needs the whole body, so buffer it up front.
    let body = match req.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(e) => {
            debug!("failed to read request body: {e}");
            String::new()
        }
    };

    let gateway_req = GatewayRequest::new(&method, &path, query.as_deref(), headers, body);
    let result = ctx.engine.dispatch(gateway_req).await;

    let mut builder = Response::builder().status(result.status);
    for (name, value) in &result.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Full::new(Bytes::from(result.body)))
        .unwrap_or_else(|e| {
            error!("failed to build response: {e}");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        })
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Convenience used by the CLI to assemble the shared context.
pub fn build_context(
    store: Arc<dyn crate::store::Store>,
    engine: Arc<Engine>,
    stats: Arc<crate::stats::StatsCollector>,
    trace_bus: Arc<crate::trace::TraceBus>,
) -> Arc<AdminContext> {
    Arc::new(AdminContext {
        store,
        engine,
        stats,
        trace_bus,
    })
}
