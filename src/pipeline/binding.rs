//! Argument binding.
//!
//! # Responsibilities
//! - Value providers over route values and the query string
//! - Input formatters for request bodies
//! - Bind every declared parameter, recording failures in model state
//!
//! # Design Decisions
//! - Binding failures never abort the invocation; they land in model state
//!   and the action decides what to do with an invalid model
//! - A body parameter with no formatter for the content type is a model
//!   error keyed by the parameter name

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::types::{BindingSource, ParameterDescriptor};
use crate::pipeline::context::{ActionContext, Arguments};
use crate::pipeline::types::InvokeResult;
use crate::routing::values::RouteValues;

/// Looks up raw values by key.
pub trait ValueProvider: Send + Sync {
    fn source(&self) -> BindingSource;
    fn get_value(&self, key: &str) -> Option<String>;
}

/// Reads values from the matched route.
#[derive(Debug, Clone)]
pub struct RouteValueProvider {
    values: RouteValues,
}

impl RouteValueProvider {
    pub fn new(values: RouteValues) -> Self {
        Self { values }
    }
}

impl ValueProvider for RouteValueProvider {
    fn source(&self) -> BindingSource {
        BindingSource::Route
    }

    fn get_value(&self, key: &str) -> Option<String> {
        self.values.get(key).map(str::to_string)
    }
}

/// Reads values from the query string; keys are case-insensitive.
#[derive(Debug, Clone)]
pub struct QueryValueProvider {
    values: BTreeMap<String, String>,
}

impl QueryValueProvider {
    pub fn new(query: &BTreeMap<String, String>) -> Self {
        Self {
            values: query.iter().map(|(k, v)| (k.to_lowercase(), v.clone())).collect(),
        }
    }
}

impl ValueProvider for QueryValueProvider {
    fn source(&self) -> BindingSource {
        BindingSource::Query
    }

    fn get_value(&self, key: &str) -> Option<String> {
        self.values.get(&key.to_lowercase()).cloned()
    }
}

/// Deserializes a request body.
pub trait InputFormatter: Send + Sync {
    fn can_read(&self, content_type: &str) -> bool;
    fn read(&self, body: &[u8]) -> Result<Value, String>;
}

/// Reads `application/json` and `+json` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInputFormatter;

impl InputFormatter for JsonInputFormatter {
    fn can_read(&self, content_type: &str) -> bool {
        content_type == "application/json" || content_type.ends_with("+json")
    }

    fn read(&self, body: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    }
}

/// Providers and formatters available to one invocation.
#[derive(Clone, Default)]
pub struct ActionBindingContext {
    pub value_providers: Vec<Arc<dyn ValueProvider>>,
    pub input_formatters: Vec<Arc<dyn InputFormatter>>,
}

/// Builds the binding context for an invocation.
#[async_trait]
pub trait ActionBindingContextProvider: Send + Sync {
    async fn binding_context(&self, context: &ActionContext) -> InvokeResult<ActionBindingContext>;
}

/// Route values, then the query string, plus a JSON body formatter.
#[derive(Clone)]
pub struct DefaultBindingContextProvider {
    input_formatters: Vec<Arc<dyn InputFormatter>>,
}

impl DefaultBindingContextProvider {
    pub fn new(input_formatters: Vec<Arc<dyn InputFormatter>>) -> Self {
        Self { input_formatters }
    }
}

impl Default for DefaultBindingContextProvider {
    fn default() -> Self {
        Self::new(vec![Arc::new(JsonInputFormatter)])
    }
}

#[async_trait]
impl ActionBindingContextProvider for DefaultBindingContextProvider {
    async fn binding_context(&self, context: &ActionContext) -> InvokeResult<ActionBindingContext> {
        Ok(ActionBindingContext {
            value_providers: vec![
                Arc::new(RouteValueProvider::new(context.route_values())),
                Arc::new(QueryValueProvider::new(&context.request().query)),
            ],
            input_formatters: self.input_formatters.clone(),
        })
    }
}

/// Binds every declared parameter of the action.
pub(crate) fn bind_arguments(context: &ActionContext, binding: &ActionBindingContext) -> Arguments {
    let mut arguments = Arguments::new();
    for parameter in &context.descriptor().parameters {
        match bind_parameter(context, binding, parameter) {
            Ok(Some(value)) => {
                arguments.insert(parameter.name.clone(), value);
            }
            Ok(None) => {}
            Err(message) => {
                tracing::debug!(
                    parameter = %parameter.name,
                    error = %message,
                    "Parameter binding failed"
                );
                context.model_state().add_error(parameter.name.clone(), message);
            }
        }
    }
    arguments
}

fn bind_parameter(
    context: &ActionContext,
    binding: &ActionBindingContext,
    parameter: &ParameterDescriptor,
) -> Result<Option<Value>, String> {
    if parameter.source == BindingSource::Body {
        return bind_body(context, binding, parameter);
    }

    let found = binding
        .value_providers
        .iter()
        .filter(|p| parameter.source == BindingSource::Any || p.source() == parameter.source)
        .find_map(|p| p.get_value(&parameter.name));

    match found {
        Some(value) => Ok(Some(Value::String(value))),
        None if parameter.optional => Ok(None),
        None => Err(format!(
            "A value for the '{}' parameter was not provided.",
            parameter.name
        )),
    }
}

fn bind_body(
    context: &ActionContext,
    binding: &ActionBindingContext,
    parameter: &ParameterDescriptor,
) -> Result<Option<Value>, String> {
    let request = context.request();
    if request.body.is_empty() && parameter.optional {
        return Ok(None);
    }

    let content_type = request.content_type().unwrap_or_default();
    let formatter = binding
        .input_formatters
        .iter()
        .find(|f| f.can_read(&content_type))
        .ok_or_else(|| format!("Unsupported content type '{}'.", content_type))?;

    formatter.read(&request.body).map(Some)
}
