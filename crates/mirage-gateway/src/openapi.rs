//! OpenAPI 3 parsing: uploaded documents become a spec plus a neutral
//! operation list.
//!
//! Operation ids are a deterministic hash of `(specId, method, path)` so
//! regenerating operations from a stored document yields the same ids and
//! existing response rules keep resolving.

use crate::models::{ExampleResponse, Operation, Spec};
use chrono::Utc;
use oas3::spec::{MediaTypeExamples, ObjectOrReference};
use oas3::OpenApiV3Spec;
use sha2::{Digest, Sha256};

/// Result of parsing an uploaded document.
pub struct ParseResult {
    pub spec: Spec,
    pub operations: Vec<Operation>,
}

/// Parse and validate an OpenAPI 3 document, producing a new spec and its
/// operations. `base_path` is normalized before use.
pub fn parse(content: &str, base_path: &str) -> Result<ParseResult, anyhow::Error> {
    let doc = load_document(content)?;

    let base_path = normalize_base_path(base_path);
    let spec_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();

    let spec = Spec {
        id: spec_id.clone(),
        name: doc.info.title.clone(),
        version: doc.info.version.clone(),
        description: doc.info.description.clone().unwrap_or_default(),
        content: content.to_string(),
        base_path: base_path.clone(),
        enabled: true,
        tracing: false,
        use_example_fallback: true,
        created_at: now,
        updated_at: now,
    };

    let operations = extract_operations(&doc, &spec_id, &base_path);

    Ok(ParseResult { spec, operations })
}

/// Regenerate operations for an already-stored spec. Used on every load and
/// after spec updates; operations are never persisted.
pub fn parse_operations(
    content: &str,
    spec_id: &str,
    base_path: &str,
) -> Result<Vec<Operation>, anyhow::Error> {
    let doc = load_document(content)?;
    Ok(extract_operations(&doc, spec_id, &normalize_base_path(base_path)))
}

fn load_document(content: &str) -> Result<OpenApiV3Spec, anyhow::Error> {
    // Accept both YAML and JSON; go through serde_json::Value so unknown
    // vendor keys under path items cannot fail deserialization.
    let mut value: serde_json::Value = if content.trim_start().starts_with('{') {
        serde_json::from_str(content).map_err(|e| anyhow::anyhow!("invalid JSON: {e}"))?
    } else {
        serde_yaml::from_str(content).map_err(|e| anyhow::anyhow!("invalid YAML: {e}"))?
    };

    strip_unknown_verbs(&mut value);

    let doc: OpenApiV3Spec = serde_json::from_value(value)
        .map_err(|e| anyhow::anyhow!("not a valid OpenAPI 3 document: {e}"))?;
    if doc.paths.as_ref().map_or(true, |p| p.is_empty()) {
        anyhow::bail!("OpenAPI document declares no paths");
    }
    Ok(doc)
}

/// Drop non-method keys from path items that are not part of the OpenAPI
/// vocabulary (tooling extensions without the x- prefix are common).
fn strip_unknown_verbs(value: &mut serde_json::Value) {
    const METHODS: [&str; 8] = [
        "get", "post", "put", "delete", "patch", "options", "head", "trace",
    ];

    if let Some(serde_json::Value::Object(paths)) = value.get_mut("paths") {
        for item in paths.values_mut() {
            if let serde_json::Value::Object(obj) = item {
                let keys: Vec<String> = obj.keys().cloned().collect();
                for key in keys {
                    let lower = key.to_ascii_lowercase();
                    let keep = matches!(
                        lower.as_str(),
                        "summary" | "description" | "servers" | "parameters" | "$ref"
                    ) || METHODS.contains(&lower.as_str())
                        || key.starts_with("x-");
                    if !keep {
                        obj.remove(&key);
                    }
                }
            }
        }
    }
}

fn extract_operations(doc: &OpenApiV3Spec, spec_id: &str, base_path: &str) -> Vec<Operation> {
    let mut operations = Vec::new();

    let Some(paths) = doc.paths.as_ref() else {
        return operations;
    };

    for (path_pattern, item) in paths {
        for (method, op) in item.methods() {
            let method = method.to_string().to_uppercase();

            let operation_id = op
                .operation_id
                .clone()
                .unwrap_or_else(|| default_operation_id(&method, path_pattern));

            operations.push(Operation {
                id: operation_hash(spec_id, &method, path_pattern),
                spec_id: spec_id.to_string(),
                method,
                path: path_pattern.clone(),
                full_path: format!("{base_path}{path_pattern}"),
                operation_id,
                summary: op.summary.clone().unwrap_or_default(),
                description: op.description.clone().unwrap_or_default(),
                tags: op.tags.clone(),
                example_response: extract_example_response(op),
            });
        }
    }

    operations
}

/// Deterministic operation id: hex of the first 16 bytes of
/// sha256("{specId}:{METHOD}:{path}").
pub fn operation_hash(spec_id: &str, method: &str, path: &str) -> String {
    let digest = Sha256::digest(format!("{spec_id}:{method}:{path}").as_bytes());
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

fn default_operation_id(method: &str, path: &str) -> String {
    let sanitized = path
        .replace(['{', '}'], "")
        .replace('/', "_")
        .trim_matches('_')
        .to_string();
    format!("{}_{}", method.to_lowercase(), sanitized)
}

/// Pull an example success response out of an operation, preferring 200,
/// then 201, 202 and 204. Only JSON media types are considered for bodies.
fn extract_example_response(op: &oas3::spec::Operation) -> Option<ExampleResponse> {
    let responses = op.responses.as_ref()?;

    for status in [200u16, 201, 202, 204] {
        let Some(ObjectOrReference::Object(resp)) = responses.get(&status.to_string()) else {
            continue;
        };

        let mut example = ExampleResponse {
            status_code: status,
            headers: Default::default(),
            body: String::new(),
        };

        for (media_type, media) in &resp.content {
            if !media_type.contains("json") {
                continue;
            }
            example
                .headers
                .insert("Content-Type".to_string(), media_type.clone());

            let body_value = match &media.examples {
                Some(MediaTypeExamples::Example { example }) => Some(example.clone()),
                Some(MediaTypeExamples::Examples { examples }) => {
                    examples.values().find_map(|ex| match ex {
                        ObjectOrReference::Object(obj) => obj.value.clone(),
                        _ => None,
                    })
                }
                None => None,
            };

            example.body = match body_value {
                Some(value) => render_example(&value),
                None => media
                    .schema
                    .as_ref()
                    .and_then(|schema| match schema {
                        ObjectOrReference::Object(obj) => serde_json::to_value(obj).ok(),
                        _ => None,
                    })
                    .map(|schema| example_from_schema(&schema))
                    .unwrap_or_default(),
            };

            if !example.body.is_empty() {
                return Some(example);
            }
            break;
        }

        // 204 No Content is a valid example even without a body.
        if status == 204 {
            return Some(example);
        }
    }

    None
}

/// Render an example value to a body string. Strings are emitted bare;
/// everything else serializes as JSON.
fn render_example(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Fabricate a minimal example from a schema when the document carries no
/// explicit one.
fn example_from_schema(schema: &serde_json::Value) -> String {
    if let Some(example) = schema.get("example") {
        return render_example(example);
    }
    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => "{}".to_string(),
        Some("array") => "[]".to_string(),
        Some("string") => "\"string\"".to_string(),
        Some("integer") => "0".to_string(),
        Some("number") => "0.0".to_string(),
        Some("boolean") => "false".to_string(),
        _ => "null".to_string(),
    }
}

/// Normalize a base path: ensure a leading `/`, strip any trailing `/`.
/// The bare `"/"` maps to the empty string.
pub fn normalize_base_path(base_path: &str) -> String {
    if base_path.is_empty() {
        return String::new();
    }
    let mut normalized = if base_path.starts_with('/') {
        base_path.to_string()
    } else {
        format!("/{base_path}")
    };
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}
