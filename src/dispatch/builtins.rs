//! Handlers and filters every host registers.
//!
//! Handlers: `system.health`, `system.echo`, `system.describe`.
//! Filters: `request_timing`, `no_store`, `validate_model`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::descriptor::registry::HandlerRegistry;
use crate::descriptor::types::RouteKeyHandling;
use crate::pipeline::action::{ActionFuture, ActionInvocation, ActionMethod, ActionReturn};
use crate::pipeline::context::{ActionExecutingContext, ResultExecutingContext};
use crate::pipeline::filters::{ActionFilter, AsyncActionFilter, Filter, ResultFilter};
use crate::pipeline::invoker::ActionNext;
use crate::pipeline::result::ObjectResult;
use crate::pipeline::types::InvokeResult;

/// Response header carrying the action stage duration.
pub const ELAPSED_HEADER: &str = "x-action-elapsed-ms";

pub fn register_builtins(registry: &mut HandlerRegistry) {
    registry
        .register_handler("system.health", ActionMethod::sync(|_| Ok(ActionReturn::Value(json!({ "status": "ok" })))))
        .register_handler("system.echo", ActionMethod::from_async(echo))
        .register_handler("system.describe", ActionMethod::sync(describe))
        .register_filter(Filter::new("request_timing").async_action(Arc::new(RequestTiming)))
        .register_filter(Filter::new("no_store").result(Arc::new(NoStore)))
        .register_filter(Filter::new("validate_model").action(Arc::new(ValidateModel)));
}

fn echo(invocation: ActionInvocation) -> ActionFuture {
    Box::pin(async move {
        let request = invocation.context.request();
        let route_values: serde_json::Map<String, Value> = invocation
            .context
            .route_values()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        Ok(ActionReturn::Value(json!({
            "method": request.method.as_str(),
            "path": request.path,
            "route_values": route_values,
            "arguments": invocation.arguments,
            "trace_id": invocation.context.trace_identifier(),
        })))
    })
}

fn describe(invocation: ActionInvocation) -> InvokeResult<ActionReturn> {
    let descriptor = invocation.context.descriptor();
    let constraints: Vec<Value> = descriptor
        .route_constraints
        .iter()
        .map(|c| {
            let handling = match &c.handling {
                RouteKeyHandling::Require(value) => json!({ "require": value }),
                RouteKeyHandling::Deny => json!("deny"),
                RouteKeyHandling::CatchAll => json!("catch_all"),
            };
            json!({ "key": c.key, "handling": handling })
        })
        .collect();
    let methods: Vec<&str> = descriptor
        .method_constraints
        .iter()
        .flat_map(|c| c.methods().iter().map(String::as_str))
        .collect();

    Ok(ActionReturn::Value(json!({
        "id": descriptor.id.to_string(),
        "display_name": descriptor.display_name,
        "controller": descriptor.controller_name,
        "route_constraints": constraints,
        "methods": methods,
        "filters": descriptor.filters.len(),
        "parameters": descriptor.parameters,
        "returns": descriptor.returns,
    })))
}

/// Records how long the action stage took.
struct RequestTiming;

#[async_trait]
impl AsyncActionFilter for RequestTiming {
    async fn on_action_execution(&self, context: &mut ActionExecutingContext, next: ActionNext<'_>) -> InvokeResult<()> {
        let start = Instant::now();
        let executed = next.run(context).await?;
        let elapsed = start.elapsed();

        tracing::debug!(
            action = %executed.action.descriptor().display_name,
            elapsed_ms = elapsed.as_millis() as u64,
            faulted = executed.exception.is_some(),
            "Action stage finished"
        );
        if let Ok(value) = HeaderValue::from_str(&elapsed.as_millis().to_string()) {
            executed
                .action
                .response()
                .set_header(HeaderName::from_static(ELAPSED_HEADER), value);
        }
        Ok(())
    }
}

/// Marks responses as not cacheable.
struct NoStore;

impl ResultFilter for NoStore {
    fn on_result_executing(&self, context: &mut ResultExecutingContext) -> InvokeResult<()> {
        context
            .action
            .response()
            .set_header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        Ok(())
    }
}

/// Answers 400 with the model state errors instead of running the action.
struct ValidateModel;

impl ActionFilter for ValidateModel {
    fn on_action_executing(&self, context: &mut ActionExecutingContext) -> InvokeResult<()> {
        let errors: Vec<Value> = {
            let state = context.action.model_state();
            if state.is_valid() {
                return Ok(());
            }
            state
                .errors()
                .iter()
                .map(|e| json!({ "key": e.key, "message": e.message }))
                .collect()
        };
        context.result = Some(Arc::new(
            ObjectResult::new(json!({ "errors": errors })).with_status(StatusCode::BAD_REQUEST),
        ));
        Ok(())
    }
}
