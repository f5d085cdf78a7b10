//! Compiled route table entries.

use crate::models::{Operation, Spec};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// One compiled entry in the route table: an operation plus the anchored
/// pattern that recognizes its full path.
pub struct Route {
    pub spec: Spec,
    pub operation: Operation,
    pattern: Regex,
    param_keys: Vec<String>,
}

impl Route {
    /// Compile a route for an operation. Returns `None` when the resulting
    /// pattern does not compile; the admin surface should have rejected
    /// such paths, so dropping the route here is purely defensive.
    pub fn compile(spec: Spec, operation: Operation) -> Option<Self> {
        let (pattern, param_keys) =
            build_path_pattern(&spec.base_path, &operation.path)?;
        Some(Self {
            spec,
            operation,
            pattern,
            param_keys,
        })
    }

    /// Test a request path, extracting path parameters in capture order.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(path)?;
        let mut params = HashMap::with_capacity(self.param_keys.len());
        for (i, key) in self.param_keys.iter().enumerate() {
            if let Some(value) = captures.get(i + 1) {
                params.insert(key.clone(), value.as_str().to_string());
            }
        }
        Some(params)
    }

    pub fn param_count(&self) -> usize {
        self.param_keys.len()
    }
}

static PARAM_PATTERN: OnceLock<Regex> = OnceLock::new();

fn param_pattern() -> &'static Regex {
    // Matches an escaped `\{name\}` inside a regex-escaped path
    PARAM_PATTERN.get_or_init(|| Regex::new(r"\\\{([^}]+)\\\}").unwrap())
}

/// Turn `basePath + path` into an anchored regex, replacing each `{name}`
/// placeholder with a `([^/]+)` capture group.
fn build_path_pattern(base_path: &str, path: &str) -> Option<(Regex, Vec<String>)> {
    let full_path = format!("{base_path}{path}");
    let escaped = regex::escape(&full_path);

    let mut param_keys = Vec::new();
    let replaced = param_pattern().replace_all(&escaped, |caps: &regex::Captures| {
        // The name was regex-escaped along with the rest of the path;
        // undo that so `{pet-id}` captures as `pet-id`.
        param_keys.push(caps[1].replace('\\', ""));
        "([^/]+)".to_string()
    });

    let anchored = format!("^{replaced}$");
    match Regex::new(&anchored) {
        Ok(pattern) => Some((pattern, param_keys)),
        Err(_) => None,
    }
}

/// Order routes within a method so matching is deterministic and prefers
/// specificity: fewer captured parameters first, ties broken by longer raw
/// path. This keeps `/users/me` ahead of `/users/{id}`.
pub fn sort_routes(routes: &mut [std::sync::Arc<Route>]) {
    routes.sort_by(|a, b| {
        a.param_count()
            .cmp(&b.param_count())
            .then_with(|| b.operation.path.len().cmp(&a.operation.path.len()))
    });
}
