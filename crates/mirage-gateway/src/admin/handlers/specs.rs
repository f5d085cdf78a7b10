//! Spec and operation management handlers.

use crate::admin::types::{
    bad_request, internal_error, json_response, message_response, not_found, read_json,
};
use crate::admin::AdminContext;
use crate::models::{Operation, OperationSummary, ResponseRule, SpecInput, SpecUpdate};
use crate::openapi;
use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// `GET /_api/specs` - all specs without their document contents.
pub fn list(ctx: &AdminContext) -> Response<Full<Bytes>> {
    let specs = match ctx.store.get_all_specs() {
        Ok(specs) => specs,
        Err(e) => return internal_error(&e.to_string()),
    };

    let result: Vec<serde_json::Value> = specs
        .iter()
        .map(|spec| {
            let operation_count = ctx
                .store
                .get_operations_by_spec(&spec.id)
                .map(|ops| ops.len())
                .unwrap_or(0);
            serde_json::json!({
                "id": spec.id,
                "name": spec.name,
                "version": spec.version,
                "description": spec.description,
                "basePath": spec.base_path,
                "enabled": spec.enabled,
                "tracing": spec.tracing,
                "useExampleFallback": spec.use_example_fallback,
                "createdAt": spec.created_at,
                "updatedAt": spec.updated_at,
                "operationCount": operation_count,
            })
        })
        .collect();

    json_response(StatusCode::OK, &result)
}

/// `POST /_api/specs` - upload and parse an OpenAPI document.
pub async fn create(req: Request<Incoming>, ctx: Arc<AdminContext>) -> Response<Full<Bytes>> {
    let input: SpecInput = match read_json(req).await {
        Ok(input) => input,
        Err(e) => return bad_request(&e),
    };

    let mut result = match openapi::parse(&input.content, &input.base_path) {
        Ok(result) => result,
        Err(e) => return bad_request(&format!("Invalid OpenAPI spec: {e}")),
    };

    if !input.name.is_empty() {
        result.spec.name = input.name;
    }
    if !input.description.is_empty() {
        result.spec.description = input.description;
    }

    if let Err(e) = ctx.store.create_spec(result.spec.clone()) {
        return internal_error(&e.to_string());
    }

    for op in &result.operations {
        if let Err(e) = ctx.store.create_operation(op.clone()) {
            // Roll the spec back so a half-registered surface never serves.
            let _ = ctx.store.delete_spec(&result.spec.id);
            return internal_error(&e.to_string());
        }
    }

    let _ = ctx.engine.reload_routes();
    info!(spec = %result.spec.id, name = %result.spec.name, "spec uploaded");

    json_response(
        StatusCode::CREATED,
        &serde_json::json!({
            "id": result.spec.id,
            "name": result.spec.name,
            "version": result.spec.version,
            "operationCount": result.operations.len(),
        }),
    )
}

/// `GET /_api/specs/{id}`.
pub fn get(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.store.get_spec(id) {
        Ok(spec) => json_response(StatusCode::OK, &spec),
        Err(_) => not_found("Spec not found"),
    }
}

/// `PUT /_api/specs/{id}` - partial settings update.
pub async fn update(
    id: &str,
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    let mut spec = match ctx.store.get_spec(id) {
        Ok(spec) => spec,
        Err(_) => return not_found("Spec not found"),
    };

    let update: SpecUpdate = match read_json(req).await {
        Ok(update) => update,
        Err(e) => return bad_request(&e),
    };

    if let Some(name) = update.name {
        spec.name = name;
    }
    if let Some(base_path) = update.base_path {
        spec.base_path = openapi::normalize_base_path(&base_path);
        // Operation full paths carry the prefix; rewrite them in place.
        if let Ok(ops) = ctx.store.get_operations_by_spec(id) {
            for mut op in ops {
                op.full_path = format!("{}{}", spec.base_path, op.path);
                let _ = ctx.store.update_operation(op);
            }
        }
    }
    if let Some(description) = update.description {
        spec.description = description;
    }
    if let Some(enabled) = update.enabled {
        spec.enabled = enabled;
    }
    if let Some(tracing) = update.tracing {
        spec.tracing = tracing;
    }
    if let Some(fallback) = update.use_example_fallback {
        spec.use_example_fallback = fallback;
    }
    spec.updated_at = Utc::now();

    if let Err(e) = ctx.store.update_spec(spec.clone()) {
        return internal_error(&e.to_string());
    }

    let _ = ctx.engine.reload_routes();
    json_response(StatusCode::OK, &spec)
}

/// `DELETE /_api/specs/{id}` - cascades to operations, rules and traces.
pub fn delete(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    if let Ok(ops) = ctx.store.get_operations_by_spec(id) {
        for op in ops {
            let _ = ctx.store.delete_rules_by_operation(&op.id);
        }
    }
    let _ = ctx.store.delete_operations_by_spec(id);

    if ctx.store.delete_spec(id).is_err() {
        return not_found("Spec not found");
    }

    ctx.trace_bus.clear_by_spec(id);
    let _ = ctx.engine.reload_routes();
    info!(spec = %id, "spec deleted");

    message_response("Spec deleted")
}

/// `PUT /_api/specs/{id}/enable` and `/disable`.
pub fn set_enabled(id: &str, enabled: bool, ctx: &AdminContext) -> Response<Full<Bytes>> {
    let mut spec = match ctx.store.get_spec(id) {
        Ok(spec) => spec,
        Err(_) => return not_found("Spec not found"),
    };

    spec.enabled = enabled;
    spec.updated_at = Utc::now();

    if let Err(e) = ctx.store.update_spec(spec) {
        return internal_error(&e.to_string());
    }
    let _ = ctx.engine.reload_routes();

    message_response(if enabled { "Spec enabled" } else { "Spec disabled" })
}

#[derive(Debug, Deserialize)]
struct FlagInput {
    enabled: bool,
}

/// `PUT /_api/specs/{id}/tracing` - body `{"enabled":bool}`, or toggle
/// when the body is absent or malformed.
pub async fn toggle_tracing(
    id: &str,
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    let mut spec = match ctx.store.get_spec(id) {
        Ok(spec) => spec,
        Err(_) => return not_found("Spec not found"),
    };

    spec.tracing = match read_json::<FlagInput>(req).await {
        Ok(input) => input.enabled,
        Err(_) => !spec.tracing,
    };
    spec.updated_at = Utc::now();

    let tracing_on = spec.tracing;
    if let Err(e) = ctx.store.update_spec(spec) {
        return internal_error(&e.to_string());
    }

    json_response(StatusCode::OK, &serde_json::json!({ "tracing": tracing_on }))
}

/// `PUT /_api/specs/{id}/example-fallback` - same body contract as
/// tracing.
pub async fn toggle_example_fallback(
    id: &str,
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    let mut spec = match ctx.store.get_spec(id) {
        Ok(spec) => spec,
        Err(_) => return not_found("Spec not found"),
    };

    spec.use_example_fallback = match read_json::<FlagInput>(req).await {
        Ok(input) => input.enabled,
        Err(_) => !spec.use_example_fallback,
    };
    spec.updated_at = Utc::now();

    let fallback = spec.use_example_fallback;
    if let Err(e) = ctx.store.update_spec(spec) {
        return internal_error(&e.to_string());
    }

    json_response(
        StatusCode::OK,
        &serde_json::json!({ "useExampleFallback": fallback }),
    )
}

/// `GET /_api/specs/{id}/operations`.
pub fn list_operations(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    let ops = match ctx.store.get_operations_by_spec(id) {
        Ok(ops) => ops,
        Err(e) => return internal_error(&e.to_string()),
    };

    let summaries: Vec<OperationSummary> = ops
        .iter()
        .map(|op| OperationSummary {
            id: op.id.clone(),
            spec_id: op.spec_id.clone(),
            method: op.method.clone(),
            path: op.path.clone(),
            full_path: op.full_path.clone(),
            operation_id: op.operation_id.clone(),
            summary: op.summary.clone(),
            response_count: ctx
                .store
                .get_rules_by_operation(&op.id)
                .map(|rules| rules.len())
                .unwrap_or(0),
            has_example_response: op.example_response.is_some(),
        })
        .collect();

    json_response(StatusCode::OK, &summaries)
}

#[derive(Serialize)]
struct OperationDetail {
    #[serde(flatten)]
    operation: Operation,
    responses: Vec<ResponseRule>,
}

/// `GET /_api/operations/{id}` - operation plus its rules.
pub fn get_operation(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    let operation = match ctx.store.get_operation(id) {
        Ok(op) => op,
        Err(_) => return not_found("Operation not found"),
    };

    let responses = ctx.store.get_rules_by_operation(id).unwrap_or_default();
    json_response(StatusCode::OK, &OperationDetail { operation, responses })
}
