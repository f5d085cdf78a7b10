//! The request dispatch pipeline.
//!
//! Per request: route match -> request data extraction -> rule selection ->
//! template rendering -> response synthesis -> stats and trace emission.
//! Route tables are rebuilt wholesale by [`Engine::reload_routes`] and
//! swapped atomically; lookups only ever observe a complete table.

mod route;
mod selector;

pub use route::Route;
pub use selector::select_rule;

use crate::condition::RequestData;
use crate::models::{Spec, Trace, TraceRequest, TraceResponse};
use crate::stats::StatsCollector;
use crate::store::Store;
use crate::template::TemplateEngine;
use crate::trace::TraceBus;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The fixed body served when no rule matches and the spec carries no
/// usable example.
pub const NO_MATCH_BODY: &str =
    r#"{"error":"No matching response configuration and no example in spec"}"#;

/// A fully buffered incoming request, decoupled from the HTTP server so the
/// pipeline can be driven directly in tests.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub method: String,
    /// Full request URL as received, for traces.
    pub url: String,
    pub path: String,
    pub query: HashMap<String, Vec<String>>,
    pub headers: HashMap<String, Vec<String>>,
    pub body: String,
}

impl GatewayRequest {
    pub fn new(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: HashMap<String, Vec<String>>,
        body: String,
    ) -> Self {
        let url = match query_string {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        };
        Self {
            method: method.to_uppercase(),
            url,
            path: path.to_string(),
            query: parse_query(query_string),
            headers,
            body,
        }
    }
}

/// The synthesized response handed back to the server glue.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl GatewayResponse {
    fn not_found_plain() -> Self {
        Self {
            status: 404,
            headers: vec![(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: "404 page not found".to_string(),
        }
    }
}

/// Parse a raw query string into a multi-value map, percent-decoding keys
/// and values.
pub fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let key = urlencoding::decode(key).map(|s| s.into_owned()).unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| value.to_string());
        params.entry(key).or_default().push(value);
    }
    params
}

/// Per-request orchestrator plus the live route table.
pub struct Engine {
    store: Arc<dyn Store>,
    stats: Arc<StatsCollector>,
    trace_bus: Arc<TraceBus>,
    template: TemplateEngine,
    /// method -> routes ordered by specificity
    routes: RwLock<HashMap<String, Vec<Arc<Route>>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, stats: Arc<StatsCollector>, trace_bus: Arc<TraceBus>) -> Self {
        let engine = Self {
            store,
            stats,
            trace_bus,
            template: TemplateEngine::new(),
            routes: RwLock::new(HashMap::new()),
        };
        if let Err(e) = engine.reload_routes() {
            warn!("initial route load failed: {e}");
        }
        engine
    }

    /// Rebuild the route table from the enabled specs and swap it in
    /// atomically. Must be called after every mutation that affects
    /// routing; the admin layer owns that contract.
    pub fn reload_routes(&self) -> Result<(), crate::store::StoreError> {
        let mut table: HashMap<String, Vec<Arc<Route>>> = HashMap::new();

        for spec in self.store.get_enabled_specs()? {
            let ops = match self.store.get_operations_by_spec(&spec.id) {
                Ok(ops) => ops,
                Err(e) => {
                    warn!(spec = %spec.id, "skipping spec during reload: {e}");
                    continue;
                }
            };
            for op in ops {
                let method = op.method.clone();
                match Route::compile(spec.clone(), op) {
                    Some(route) => table.entry(method).or_default().push(Arc::new(route)),
                    None => warn!("dropping route with uncompilable pattern"),
                }
            }
        }

        for routes in table.values_mut() {
            route::sort_routes(routes);
        }

        let route_count: usize = table.values().map(Vec::len).sum();
        *self.routes.write() = table;
        debug!(routes = route_count, "route table reloaded");
        Ok(())
    }

    /// First-match lookup over the method's ordered route list.
    pub fn match_route(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(Arc<Route>, HashMap<String, String>)> {
        let routes = self.routes.read();
        let candidates = routes.get(method)?;
        for route in candidates {
            if let Some(params) = route.matches(path) {
                return Some((Arc::clone(route), params));
            }
        }
        None
    }

    /// method -> full paths, for the admin routes listing.
    pub fn registered_routes(&self) -> HashMap<String, Vec<String>> {
        let routes = self.routes.read();
        routes
            .iter()
            .map(|(method, list)| {
                (
                    method.clone(),
                    list.iter()
                        .map(|route| route.operation.full_path.clone())
                        .collect(),
                )
            })
            .collect()
    }

    /// Dispatch one proxied request through the full pipeline.
    pub async fn dispatch(&self, req: GatewayRequest) -> GatewayResponse {
        let start = Instant::now();

        let Some((route, path_params)) = self.match_route(&req.method, &req.path) else {
            return GatewayResponse::not_found_plain();
        };

        let data = RequestData {
            path_params,
            query: req.query.clone(),
            headers: req.headers.clone(),
            body: req.body.clone(),
        };

        // Flags like tracing toggle without a route reload, so read the
        // spec fresh; a stale snapshot is an acceptable fallback.
        let spec = self
            .store
            .get_spec(&route.spec.id)
            .unwrap_or_else(|_| route.spec.clone());

        // A failing rule lookup degrades to "no rules"; the example
        // fallback still gets its chance.
        let rules = self
            .store
            .get_rules_by_operation(&route.operation.id)
            .unwrap_or_default();

        let selected = select_rule(&rules, &data).cloned();

        let response = match selected {
            Some(rule) => {
                if rule.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(rule.delay_ms)).await;
                }

                let mut headers: Vec<(String, String)> = self
                    .template
                    .process_headers(&rule.headers, &data)
                    .into_iter()
                    .collect();
                ensure_content_type(&mut headers);

                let body = self.template.process(&rule.body, &data);

                let response = GatewayResponse {
                    status: rule.status_code,
                    headers,
                    body,
                };
                self.finish(&req, &route, &spec, &response, start, Some(&rule.id), &rule.name);
                response
            }
            None => {
                if let (true, Some(example)) =
                    (spec.use_example_fallback, route.operation.example_response.as_ref())
                {
                    // Example bodies are emitted verbatim, no templating.
                    let mut headers: Vec<(String, String)> = example
                        .headers
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    ensure_content_type(&mut headers);

                    let response = GatewayResponse {
                        status: example.status_code,
                        headers,
                        body: example.body.clone(),
                    };
                    self.finish(&req, &route, &spec, &response, start, None, "spec-example");
                    response
                } else {
                    let response = GatewayResponse {
                        status: 404,
                        headers: vec![(
                            "Content-Type".to_string(),
                            "application/json".to_string(),
                        )],
                        body: NO_MATCH_BODY.to_string(),
                    };
                    self.finish(&req, &route, &spec, &response, start, None, "");
                    response
                }
            }
        };

        response
    }

    /// Stats emission plus trace publication for every dispatched request
    /// that resolved to an operation.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        req: &GatewayRequest,
        route: &Route,
        spec: &Spec,
        response: &GatewayResponse,
        start: Instant,
        matched_rule_id: Option<&str>,
        matched_rule_name: &str,
    ) {
        let elapsed = start.elapsed();

        self.stats.record_request(
            &spec.id,
            &route.operation.id,
            &route.operation.method,
            &route.operation.path,
            elapsed,
            response.status,
        );

        if !spec.tracing {
            return;
        }

        let trace = Trace {
            id: String::new(),
            spec_id: spec.id.clone(),
            spec_name: spec.name.clone(),
            operation_id: route.operation.id.clone(),
            operation_path: route.operation.path.clone(),
            timestamp: chrono::Utc::now(),
            duration_ns: elapsed.as_nanos() as i64,
            request: TraceRequest {
                method: req.method.clone(),
                url: req.url.clone(),
                path: req.path.clone(),
                query: req.query.clone(),
                headers: req.headers.clone(),
                body: req.body.clone(),
            },
            response: TraceResponse {
                status_code: response.status,
                headers: response.headers.iter().cloned().collect(),
                body: response.body.clone(),
            },
            matched_rule_id: matched_rule_id.map(str::to_string),
            matched_rule_name: matched_rule_name.to_string(),
        };
        self.trace_bus.record(trace);
    }
}

fn ensure_content_type(headers: &mut Vec<(String, String)>) {
    let has_content_type = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !has_content_type {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_multi_values_and_decoding() {
        let query = parse_query(Some("a=1&a=2&city=New%20York&flag"));
        assert_eq!(query.get("a").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert_eq!(query.get("city").unwrap(), &vec!["New York".to_string()]);
        assert_eq!(query.get("flag").unwrap(), &vec![String::new()]);
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_gateway_request_url_includes_query() {
        let req = GatewayRequest::new("get", "/users/1", Some("debug=1"), HashMap::new(), String::new());
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "/users/1?debug=1");
        let req = GatewayRequest::new("GET", "/users/1", None, HashMap::new(), String::new());
        assert_eq!(req.url, "/users/1");
    }

    #[test]
    fn test_ensure_content_type_case_insensitive() {
        let mut headers = vec![("content-type".to_string(), "text/xml".to_string())];
        ensure_content_type(&mut headers);
        assert_eq!(headers.len(), 1);

        let mut headers = vec![("X-Other".to_string(), "1".to_string())];
        ensure_content_type(&mut headers);
        assert!(headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }
}
