//! Response rule management handlers.

use crate::admin::types::{
    bad_request, internal_error, json_response, message_response, not_found, read_json,
};
use crate::admin::AdminContext;
use crate::models::{ResponseRule, ResponseRuleInput, ResponseRuleUpdate};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

/// `GET /_api/operations/{id}/responses` - rules sorted by priority.
pub fn list(operation_id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.store.get_rules_by_operation(operation_id) {
        Ok(rules) => json_response(StatusCode::OK, &rules),
        Err(e) => internal_error(&e.to_string()),
    }
}

/// `POST /_api/operations/{id}/responses`.
pub async fn create(
    operation_id: &str,
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    if ctx.store.get_operation(operation_id).is_err() {
        return not_found("Operation not found");
    }

    let input: ResponseRuleInput = match read_json(req).await {
        Ok(input) => input,
        Err(e) => return bad_request(&e),
    };

    if input.status_code != 0 && !(100..=599).contains(&input.status_code) {
        return bad_request("statusCode must be between 100 and 599");
    }

    let rule = ResponseRule {
        id: uuid::Uuid::new_v4().to_string(),
        operation_id: operation_id.to_string(),
        name: input.name,
        description: input.description,
        priority: input.priority,
        conditions: input.conditions,
        status_code: if input.status_code == 0 {
            200
        } else {
            input.status_code
        },
        headers: input.headers,
        body: input.body,
        delay_ms: input.delay_ms,
        enabled: input.enabled,
        created_at: Utc::now(),
    };

    if let Err(e) = ctx.store.create_rule(rule.clone()) {
        return internal_error(&e.to_string());
    }

    json_response(StatusCode::CREATED, &rule)
}

/// `GET /_api/responses/{id}`.
pub fn get(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.store.get_rule(id) {
        Ok(rule) => json_response(StatusCode::OK, &rule),
        Err(_) => not_found("Response rule not found"),
    }
}

/// `PUT /_api/responses/{id}` - partial update.
pub async fn update(
    id: &str,
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    let mut rule = match ctx.store.get_rule(id) {
        Ok(rule) => rule,
        Err(_) => return not_found("Response rule not found"),
    };

    let update: ResponseRuleUpdate = match read_json(req).await {
        Ok(update) => update,
        Err(e) => return bad_request(&e),
    };

    if let Some(status_code) = update.status_code {
        if !(100..=599).contains(&status_code) {
            return bad_request("statusCode must be between 100 and 599");
        }
        rule.status_code = status_code;
    }
    if let Some(name) = update.name {
        rule.name = name;
    }
    if let Some(description) = update.description {
        rule.description = description;
    }
    if let Some(priority) = update.priority {
        rule.priority = priority;
    }
    if let Some(conditions) = update.conditions {
        rule.conditions = conditions;
    }
    if let Some(headers) = update.headers {
        rule.headers = headers;
    }
    if let Some(body) = update.body {
        rule.body = body;
    }
    if let Some(delay_ms) = update.delay_ms {
        rule.delay_ms = delay_ms;
    }
    if let Some(enabled) = update.enabled {
        rule.enabled = enabled;
    }

    if let Err(e) = ctx.store.update_rule(rule.clone()) {
        return internal_error(&e.to_string());
    }

    json_response(StatusCode::OK, &rule)
}

/// `DELETE /_api/responses/{id}`.
pub fn delete(id: &str, ctx: &AdminContext) -> Response<Full<Bytes>> {
    match ctx.store.delete_rule(id) {
        Ok(()) => message_response("Response rule deleted"),
        Err(_) => not_found("Response rule not found"),
    }
}

#[derive(Debug, Deserialize)]
struct PriorityInput {
    priority: i32,
}

/// `PUT /_api/responses/{id}/priority`.
pub async fn update_priority(
    id: &str,
    req: Request<Incoming>,
    ctx: Arc<AdminContext>,
) -> Response<Full<Bytes>> {
    let mut rule = match ctx.store.get_rule(id) {
        Ok(rule) => rule,
        Err(_) => return not_found("Response rule not found"),
    };

    let input: PriorityInput = match read_json(req).await {
        Ok(input) => input,
        Err(e) => return bad_request(&e),
    };

    rule.priority = input.priority;
    if let Err(e) = ctx.store.update_rule(rule.clone()) {
        return internal_error(&e.to_string());
    }

    json_response(StatusCode::OK, &rule)
}
