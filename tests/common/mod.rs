//! Shared fixtures: recording filters, recording results, and helpers to
//! build descriptors and run the pipeline.

#![allow(dead_code)]

use std::sync::Arc;

use action_dispatch::descriptor::builder::ActionDescriptorBuilder;
use action_dispatch::descriptor::store::ActionDescriptorStore;
use action_dispatch::descriptor::types::ActionDescriptor;
use action_dispatch::pipeline::action::{ActionMethod, ActionReturn, NoControllerFactory};
use action_dispatch::pipeline::binding::DefaultBindingContextProvider;
use action_dispatch::pipeline::context::{
    ActionContext, ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ExceptionContext,
    ResultExecutedContext, ResultExecutingContext, SharedResult,
};
use action_dispatch::pipeline::filters::{
    ActionFilter, AsyncActionFilter, AsyncResultFilter, AuthorizationFilter, ExceptionFilter, ResultFilter,
};
use action_dispatch::pipeline::invoker::{ActionInvoker, ActionNext, ControllerActionInvoker, ResultNext};
use action_dispatch::pipeline::result::ActionResult;
use action_dispatch::pipeline::types::{InvokeError, InvokeResult};
use action_dispatch::routing::{ActionSelector, RequestData, RouteContext, RouteData, RouteValues};
use async_trait::async_trait;
use axum::http::Method;
use parking_lot::Mutex;

/// Ordered record of filter and result callbacks.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

/// Result that records its execution and writes its name.
#[derive(Debug)]
pub struct RecordingResult {
    pub name: String,
    pub log: Log,
}

impl RecordingResult {
    pub fn shared(name: &str, log: &Log) -> SharedResult {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }
}

#[async_trait]
impl ActionResult for RecordingResult {
    async fn execute_result(&self, context: &ActionContext) -> InvokeResult<()> {
        self.log.push(format!("result:{}", self.name));
        context.response().write(self.name.as_bytes());
        Ok(())
    }
}

/// Result that always fails.
#[derive(Debug)]
pub struct FailingResult(pub InvokeError);

#[async_trait]
impl ActionResult for FailingResult {
    async fn execute_result(&self, _context: &ActionContext) -> InvokeResult<()> {
        Err(self.0.clone())
    }
}

pub struct RecordingAuthorization {
    pub name: &'static str,
    pub log: Log,
    pub challenge: Option<SharedResult>,
    pub error: Option<InvokeError>,
}

impl AuthorizationFilter for RecordingAuthorization {
    fn on_authorization(&self, context: &mut AuthorizationContext) -> InvokeResult<()> {
        self.log.push(format!("{}:authorization", self.name));
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Some(challenge) = &self.challenge {
            context.result = Some(Arc::clone(challenge));
        }
        Ok(())
    }
}

/// Sync action filter; optionally short-circuits or handles errors.
pub struct RecordingActionFilter {
    pub name: &'static str,
    pub log: Log,
    pub short_circuit: Option<SharedResult>,
    pub handle_exception: bool,
}

impl RecordingActionFilter {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            short_circuit: None,
            handle_exception: false,
        }
    }
}

impl ActionFilter for RecordingActionFilter {
    fn on_action_executing(&self, context: &mut ActionExecutingContext) -> InvokeResult<()> {
        self.log.push(format!("{}:executing", self.name));
        if let Some(result) = &self.short_circuit {
            context.result = Some(Arc::clone(result));
        }
        Ok(())
    }

    fn on_action_executed(&self, context: &mut ActionExecutedContext) -> InvokeResult<()> {
        self.log.push(format!("{}:executed", self.name));
        if self.handle_exception && context.exception.is_some() {
            context.exception_handled = true;
        }
        Ok(())
    }
}

/// How an async filter treats `next`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum NextMode {
    Call,
    Skip,
    /// Sets the short-circuit slot, then calls `next` anyway.
    Violate,
}

pub struct AsyncRecordingActionFilter {
    pub name: &'static str,
    pub log: Log,
    pub mode: NextMode,
    pub result: Option<SharedResult>,
}

#[async_trait]
impl AsyncActionFilter for AsyncRecordingActionFilter {
    async fn on_action_execution(&self, context: &mut ActionExecutingContext, next: ActionNext<'_>) -> InvokeResult<()> {
        self.log.push(format!("{}:before", self.name));
        match self.mode {
            NextMode::Call => {
                let executed = next.run(context).await?;
                self.log.push(format!(
                    "{}:after(canceled={}, faulted={})",
                    self.name,
                    executed.canceled,
                    executed.exception.is_some()
                ));
            }
            NextMode::Skip => {
                context.result = self.result.clone();
            }
            NextMode::Violate => {
                context.result = self.result.clone();
                next.run(context).await?;
            }
        }
        Ok(())
    }
}

/// How an exception filter reacts.
#[derive(Clone)]
pub enum ExceptionMode {
    Ignore,
    Clear,
    Handle(SharedResult),
}

pub struct RecordingExceptionFilter {
    pub name: &'static str,
    pub log: Log,
    pub mode: ExceptionMode,
}

impl ExceptionFilter for RecordingExceptionFilter {
    fn on_exception(&self, context: &mut ExceptionContext) -> InvokeResult<()> {
        self.log.push(format!("{}:exception", self.name));
        match &self.mode {
            ExceptionMode::Ignore => {}
            ExceptionMode::Clear => context.exception = None,
            ExceptionMode::Handle(result) => context.result = Some(Arc::clone(result)),
        }
        Ok(())
    }
}

pub struct RecordingResultFilter {
    pub name: &'static str,
    pub log: Log,
    pub cancel: bool,
    pub handle_exception: bool,
}

impl RecordingResultFilter {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            cancel: false,
            handle_exception: false,
        }
    }
}

impl ResultFilter for RecordingResultFilter {
    fn on_result_executing(&self, context: &mut ResultExecutingContext) -> InvokeResult<()> {
        self.log.push(format!("{}:result_executing", self.name));
        context.cancel = self.cancel;
        Ok(())
    }

    fn on_result_executed(&self, context: &mut ResultExecutedContext) -> InvokeResult<()> {
        self.log.push(format!("{}:result_executed", self.name));
        if self.handle_exception && context.exception.is_some() {
            context.exception_handled = true;
        }
        Ok(())
    }
}

pub struct AsyncRecordingResultFilter {
    pub name: &'static str,
    pub log: Log,
    pub mode: NextMode,
}

#[async_trait]
impl AsyncResultFilter for AsyncRecordingResultFilter {
    async fn on_result_execution(&self, context: &mut ResultExecutingContext, next: ResultNext<'_>) -> InvokeResult<()> {
        self.log.push(format!("{}:before", self.name));
        match self.mode {
            NextMode::Call => {
                let executed = next.run(context).await?;
                self.log.push(format!("{}:after(canceled={})", self.name, executed.canceled));
            }
            NextMode::Skip => {}
            NextMode::Violate => {
                context.cancel = true;
                next.run(context).await?;
            }
        }
        Ok(())
    }
}

/// Sync action method that records its call and returns a recording result.
pub fn recording_method(log: &Log) -> ActionMethod {
    let log = log.clone();
    ActionMethod::sync(move |_| {
        log.push("action");
        Ok(ActionReturn::result(RecordingResult {
            name: "action".to_string(),
            log: log.clone(),
        }))
    })
}

/// Sync action method that fails with `error`.
pub fn failing_method(log: &Log, error: InvokeError) -> ActionMethod {
    let log = log.clone();
    ActionMethod::sync(move |_| {
        log.push("action");
        Err(error.clone())
    })
}

pub fn builder(method: ActionMethod) -> ActionDescriptorBuilder {
    ActionDescriptorBuilder::new("Home", "Index", method)
}

pub fn action_context(descriptor: ActionDescriptor) -> ActionContext {
    ActionContext::new(
        Arc::new(descriptor),
        Arc::new(RequestData::new(Method::GET, "/")),
        RouteData::new(RouteValues::new().with("controller", "Home").with("action", "Index")),
        Default::default(),
    )
}

/// Runs the full pipeline for `descriptor` with default binding and no
/// controllers.
pub async fn invoke(descriptor: ActionDescriptor) -> (InvokeResult<()>, ActionContext) {
    let context = action_context(descriptor);
    let mut invoker = ControllerActionInvoker::new(
        context.clone(),
        Arc::new(DefaultBindingContextProvider::default()),
        Arc::new(NoControllerFactory),
    );
    let outcome = invoker.invoke().await;
    (outcome, context)
}

/// Sync method that returns no value.
pub fn void_method() -> ActionMethod {
    ActionMethod::sync(|_| Ok(ActionReturn::Void))
}

pub fn selector(descriptors: Vec<ActionDescriptor>) -> ActionSelector {
    ActionSelector::new(Arc::new(ActionDescriptorStore::new(descriptors)))
}

pub fn route_context(method: &str, values: RouteValues) -> RouteContext {
    let method = Method::from_bytes(method.as_bytes()).unwrap();
    RouteContext::new(RequestData::new(method, "/"), RouteData::new(values))
}
