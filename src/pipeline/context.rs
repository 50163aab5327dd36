//! Action and filter-stage contexts.
//!
//! # Responsibilities
//! - `ActionContext`: per-invocation state shared by every filter stage
//! - `ModelState`: bounded binding/validation error collection
//! - `ResponseSink`: the response an action or result writes
//! - One owned context per filter stage, carrying result/exception slots
//!
//! # Design Decisions
//! - `ActionContext` is a cheap `Arc` handle; mutable parts sit behind
//!   `parking_lot` mutexes that are never held across an await
//! - Stage contexts own their data so async filters can hold them across
//!   `next` without borrowing the invoker

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::descriptor::types::ActionDescriptor;
use crate::pipeline::result::ActionResult;
use crate::pipeline::types::InvokeError;
use crate::routing::values::{RequestAborted, RequestData, RouteData, RouteValues};

/// Default cap on model state errors.
pub const DEFAULT_MAX_MODEL_ERRORS: usize = 200;

/// Header carrying the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Result produced by an action or filter.
pub type SharedResult = Arc<dyn ActionResult>;

/// Controller instance created for one invocation.
pub type ControllerInstance = Arc<dyn Any + Send + Sync>;

/// Bound action arguments keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// Response written by results.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

impl ResponseSink {
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One model-state entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelError {
    pub key: String,
    pub message: String,
}

/// Binding and validation errors for one invocation.
#[derive(Debug, Clone)]
pub struct ModelState {
    errors: Vec<ModelError>,
    pub max_allowed_errors: usize,
    max_reached: bool,
}

impl Default for ModelState {
    fn default() -> Self {
        Self {
            errors: Vec::new(),
            max_allowed_errors: DEFAULT_MAX_MODEL_ERRORS,
            max_reached: false,
        }
    }
}

impl ModelState {
    /// Records an error. Returns false once the cap is reached; at that
    /// point a single "too many errors" entry keyed by `""` is recorded.
    pub fn add_error(&mut self, key: impl Into<String>, message: impl Into<String>) -> bool {
        if self.max_reached {
            return false;
        }
        if self.errors.len() + 1 >= self.max_allowed_errors {
            self.max_reached = true;
            self.errors.push(ModelError {
                key: String::new(),
                message: format!(
                    "The maximum number of allowed model errors ({}) has been reached.",
                    self.max_allowed_errors
                ),
            });
            return false;
        }
        self.errors.push(ModelError {
            key: key.into(),
            message: message.into(),
        });
        true
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_reached_max_errors(&self) -> bool {
        self.max_reached
    }

    pub fn errors(&self) -> &[ModelError] {
        &self.errors
    }

    pub fn errors_for(&self, key: &str) -> impl Iterator<Item = &ModelError> {
        let key = key.to_string();
        self.errors.iter().filter(move |e| e.key == key)
    }
}

struct ActionContextInner {
    descriptor: Arc<ActionDescriptor>,
    request: Arc<RequestData>,
    route_data: Mutex<RouteData>,
    model_state: Mutex<ModelState>,
    response: Mutex<ResponseSink>,
    trace_identifier: String,
    aborted: RequestAborted,
}

/// Per-invocation state shared by every filter stage.
#[derive(Clone)]
pub struct ActionContext {
    inner: Arc<ActionContextInner>,
}

impl ActionContext {
    pub fn new(
        descriptor: Arc<ActionDescriptor>,
        request: Arc<RequestData>,
        route_data: RouteData,
        aborted: RequestAborted,
    ) -> Self {
        let trace_identifier = request
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            inner: Arc::new(ActionContextInner {
                descriptor,
                request,
                route_data: Mutex::new(route_data),
                model_state: Mutex::new(ModelState::default()),
                response: Mutex::new(ResponseSink::default()),
                trace_identifier,
                aborted,
            }),
        }
    }

    pub fn descriptor(&self) -> &Arc<ActionDescriptor> {
        &self.inner.descriptor
    }

    pub fn request(&self) -> &RequestData {
        &self.inner.request
    }

    pub fn route_value(&self, key: &str) -> Option<String> {
        self.inner.route_data.lock().values.get(key).map(str::to_string)
    }

    pub fn set_route_value(&self, key: &str, value: impl Into<String>) {
        self.inner.route_data.lock().values.insert(key, value);
    }

    pub fn route_values(&self) -> RouteValues {
        self.inner.route_data.lock().values.clone()
    }

    /// Snapshot of the invocation's route data.
    pub fn route_data(&self) -> RouteData {
        self.inner.route_data.lock().clone()
    }

    pub fn model_state(&self) -> MutexGuard<'_, ModelState> {
        self.inner.model_state.lock()
    }

    pub fn response(&self) -> MutexGuard<'_, ResponseSink> {
        self.inner.response.lock()
    }

    /// Moves the written response out, leaving a default one behind.
    pub fn take_response(&self) -> ResponseSink {
        std::mem::take(&mut *self.inner.response.lock())
    }

    pub fn trace_identifier(&self) -> &str {
        &self.inner.trace_identifier
    }

    pub fn aborted(&self) -> &RequestAborted {
        &self.inner.aborted
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.inner.descriptor.display_name)
            .field("trace_identifier", &self.inner.trace_identifier)
            .finish()
    }
}

/// Context for authorization filters.
#[derive(Debug)]
pub struct AuthorizationContext {
    pub action: ActionContext,
    /// Setting a result short-circuits the pipeline.
    pub result: Option<SharedResult>,
}

impl AuthorizationContext {
    pub fn new(action: ActionContext) -> Self {
        Self { action, result: None }
    }
}

/// Context passed to action filters before the action runs.
#[derive(Debug)]
pub struct ActionExecutingContext {
    pub action: ActionContext,
    pub arguments: Arguments,
    pub controller: Option<ControllerInstance>,
    /// Setting a result short-circuits the action.
    pub result: Option<SharedResult>,
}

impl ActionExecutingContext {
    pub fn new(action: ActionContext, arguments: Arguments, controller: Option<ControllerInstance>) -> Self {
        Self {
            action,
            arguments,
            controller,
            result: None,
        }
    }
}

/// Context passed to action filters after the action ran.
#[derive(Debug)]
pub struct ActionExecutedContext {
    pub action: ActionContext,
    pub controller: Option<ControllerInstance>,
    /// True when a filter short-circuited instead of running the action.
    pub canceled: bool,
    pub result: Option<SharedResult>,
    pub exception: Option<InvokeError>,
    pub exception_handled: bool,
}

impl ActionExecutedContext {
    pub(crate) fn completed(executing: &ActionExecutingContext, result: SharedResult) -> Self {
        Self {
            action: executing.action.clone(),
            controller: executing.controller.clone(),
            canceled: false,
            result: Some(result),
            exception: None,
            exception_handled: false,
        }
    }

    pub(crate) fn canceled(executing: &ActionExecutingContext) -> Self {
        Self {
            action: executing.action.clone(),
            controller: executing.controller.clone(),
            canceled: true,
            result: executing.result.clone(),
            exception: None,
            exception_handled: false,
        }
    }

    pub(crate) fn faulted(executing: &ActionExecutingContext, error: InvokeError) -> Self {
        Self {
            action: executing.action.clone(),
            controller: executing.controller.clone(),
            canceled: false,
            result: None,
            exception: Some(error),
            exception_handled: false,
        }
    }

    /// The exception still propagating, if any.
    pub fn unhandled_exception(&self) -> Option<&InvokeError> {
        if self.exception_handled {
            None
        } else {
            self.exception.as_ref()
        }
    }
}

/// Context for exception filters.
#[derive(Debug)]
pub struct ExceptionContext {
    pub action: ActionContext,
    /// Clearing the exception marks it handled.
    pub exception: Option<InvokeError>,
    /// A result here is executed directly, without result filters.
    pub result: Option<SharedResult>,
}

impl ExceptionContext {
    pub fn new(action: ActionContext, exception: InvokeError) -> Self {
        Self {
            action,
            exception: Some(exception),
            result: None,
        }
    }

    pub fn is_handled(&self) -> bool {
        self.result.is_some() || self.exception.is_none()
    }
}

/// Context passed to result filters before the result executes.
#[derive(Debug)]
pub struct ResultExecutingContext {
    pub action: ActionContext,
    pub controller: Option<ControllerInstance>,
    pub result: SharedResult,
    /// Setting this short-circuits result execution.
    pub cancel: bool,
}

impl ResultExecutingContext {
    pub fn new(action: ActionContext, controller: Option<ControllerInstance>, result: SharedResult) -> Self {
        Self {
            action,
            controller,
            result,
            cancel: false,
        }
    }
}

/// Context passed to result filters after the result executed.
#[derive(Debug)]
pub struct ResultExecutedContext {
    pub action: ActionContext,
    pub controller: Option<ControllerInstance>,
    pub result: SharedResult,
    pub canceled: bool,
    pub exception: Option<InvokeError>,
    pub exception_handled: bool,
}

impl ResultExecutedContext {
    pub(crate) fn completed(executing: &ResultExecutingContext) -> Self {
        Self::from_executing(executing, false, None)
    }

    pub(crate) fn canceled(executing: &ResultExecutingContext) -> Self {
        Self::from_executing(executing, true, None)
    }

    pub(crate) fn faulted(executing: &ResultExecutingContext, error: InvokeError) -> Self {
        Self::from_executing(executing, false, Some(error))
    }

    fn from_executing(executing: &ResultExecutingContext, canceled: bool, exception: Option<InvokeError>) -> Self {
        Self {
            action: executing.action.clone(),
            controller: executing.controller.clone(),
            result: Arc::clone(&executing.result),
            canceled,
            exception,
            exception_handled: false,
        }
    }

    pub fn unhandled_exception(&self) -> Option<&InvokeError> {
        if self.exception_handled {
            None
        } else {
            self.exception.as_ref()
        }
    }
}
