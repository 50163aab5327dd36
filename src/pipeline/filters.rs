//! Filter contracts and filter metadata.
//!
//! # Responsibilities
//! - Sync and async filter traits for each pipeline stage
//! - `Filter`: a named set of stage capabilities
//! - `FilterDescriptor`: a filter (or factory) with scope and order
//!
//! # Design Decisions
//! - A filter may implement any combination of stages; each stage is
//!   either synchronous or asynchronous, never both
//! - Descriptors are sorted once at build time by `(order, scope)`,
//!   stably, so declaration order breaks remaining ties

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::context::{
    ActionContext, ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ExceptionContext,
    ResultExecutedContext, ResultExecutingContext,
};
use crate::pipeline::invoker::{ActionNext, ResultNext};
use crate::pipeline::types::InvokeResult;

/// Runs before everything else; setting a result short-circuits.
pub trait AuthorizationFilter: Send + Sync {
    fn on_authorization(&self, context: &mut AuthorizationContext) -> InvokeResult<()>;
}

#[async_trait]
pub trait AsyncAuthorizationFilter: Send + Sync {
    async fn on_authorization(&self, context: &mut AuthorizationContext) -> InvokeResult<()>;
}

/// Wraps the action method.
pub trait ActionFilter: Send + Sync {
    fn on_action_executing(&self, _context: &mut ActionExecutingContext) -> InvokeResult<()> {
        Ok(())
    }

    fn on_action_executed(&self, _context: &mut ActionExecutedContext) -> InvokeResult<()> {
        Ok(())
    }
}

/// Wraps the action method; `next` runs the rest of the stage.
///
/// A filter that sets `context.result` must not call `next` afterwards.
/// Returning without calling `next` short-circuits.
#[async_trait]
pub trait AsyncActionFilter: Send + Sync {
    async fn on_action_execution(&self, context: &mut ActionExecutingContext, next: ActionNext<'_>)
        -> InvokeResult<()>;
}

/// Sees errors raised by authorization, binding, action filters, or the action.
pub trait ExceptionFilter: Send + Sync {
    fn on_exception(&self, context: &mut ExceptionContext) -> InvokeResult<()>;
}

#[async_trait]
pub trait AsyncExceptionFilter: Send + Sync {
    async fn on_exception(&self, context: &mut ExceptionContext) -> InvokeResult<()>;
}

/// Wraps result execution.
pub trait ResultFilter: Send + Sync {
    fn on_result_executing(&self, _context: &mut ResultExecutingContext) -> InvokeResult<()> {
        Ok(())
    }

    fn on_result_executed(&self, _context: &mut ResultExecutedContext) -> InvokeResult<()> {
        Ok(())
    }
}

/// Wraps result execution; `next` runs the rest of the stage.
///
/// A filter that sets `context.cancel` must not call `next` afterwards.
#[async_trait]
pub trait AsyncResultFilter: Send + Sync {
    async fn on_result_execution(&self, context: &mut ResultExecutingContext, next: ResultNext<'_>)
        -> InvokeResult<()>;
}

/// Either the sync or the async form of one stage.
pub enum Stage<S: ?Sized, A: ?Sized> {
    Sync(Arc<S>),
    Async(Arc<A>),
}

impl<S: ?Sized, A: ?Sized> Clone for Stage<S, A> {
    fn clone(&self) -> Self {
        match self {
            Stage::Sync(s) => Stage::Sync(Arc::clone(s)),
            Stage::Async(a) => Stage::Async(Arc::clone(a)),
        }
    }
}

impl<S: ?Sized, A: ?Sized> fmt::Debug for Stage<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Sync(_) => f.write_str("Sync"),
            Stage::Async(_) => f.write_str("Async"),
        }
    }
}

pub type AuthorizationStage = Stage<dyn AuthorizationFilter, dyn AsyncAuthorizationFilter>;
pub type ActionStageFilter = Stage<dyn ActionFilter, dyn AsyncActionFilter>;
pub type ExceptionStage = Stage<dyn ExceptionFilter, dyn AsyncExceptionFilter>;
pub type ResultStageFilter = Stage<dyn ResultFilter, dyn AsyncResultFilter>;

/// A named filter and the stages it participates in.
#[derive(Clone)]
pub struct Filter {
    name: Arc<str>,
    pub(crate) authorization: Option<AuthorizationStage>,
    pub(crate) action: Option<ActionStageFilter>,
    pub(crate) exception: Option<ExceptionStage>,
    pub(crate) result: Option<ResultStageFilter>,
}

impl Filter {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            authorization: None,
            action: None,
            exception: None,
            result: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn authorization<F: AuthorizationFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn AuthorizationFilter> = filter;
        self.authorization = Some(Stage::Sync(filter));
        self
    }

    pub fn async_authorization<F: AsyncAuthorizationFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn AsyncAuthorizationFilter> = filter;
        self.authorization = Some(Stage::Async(filter));
        self
    }

    pub fn action<F: ActionFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn ActionFilter> = filter;
        self.action = Some(Stage::Sync(filter));
        self
    }

    pub fn async_action<F: AsyncActionFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn AsyncActionFilter> = filter;
        self.action = Some(Stage::Async(filter));
        self
    }

    pub fn exception<F: ExceptionFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn ExceptionFilter> = filter;
        self.exception = Some(Stage::Sync(filter));
        self
    }

    pub fn async_exception<F: AsyncExceptionFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn AsyncExceptionFilter> = filter;
        self.exception = Some(Stage::Async(filter));
        self
    }

    pub fn result<F: ResultFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn ResultFilter> = filter;
        self.result = Some(Stage::Sync(filter));
        self
    }

    pub fn async_result<F: AsyncResultFilter + 'static>(mut self, filter: Arc<F>) -> Self {
        let filter: Arc<dyn AsyncResultFilter> = filter;
        self.result = Some(Stage::Async(filter));
        self
    }

    /// True when the filter takes part in no stage at all.
    pub fn is_inert(&self) -> bool {
        self.authorization.is_none() && self.action.is_none() && self.exception.is_none() && self.result.is_none()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("authorization", &self.authorization)
            .field("action", &self.action)
            .field("exception", &self.exception)
            .field("result", &self.result)
            .finish()
    }
}

/// Creates a filter per invocation.
pub trait FilterFactory: Send + Sync {
    fn create_filter(&self, context: &ActionContext) -> InvokeResult<Filter>;
}

/// Where a filter was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterScope {
    Global,
    Controller,
    #[default]
    Action,
}

#[derive(Clone)]
pub enum FilterSource {
    Instance(Filter),
    Factory(Arc<dyn FilterFactory>),
}

impl FilterSource {
    /// Resolves the filter instance used for this invocation.
    pub fn resolve(&self, context: &ActionContext) -> InvokeResult<Filter> {
        match self {
            FilterSource::Instance(filter) => Ok(filter.clone()),
            FilterSource::Factory(factory) => factory.create_filter(context),
        }
    }
}

impl fmt::Debug for FilterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSource::Instance(filter) => f.debug_tuple("Instance").field(&filter.name).finish(),
            FilterSource::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// A filter attached to an action.
#[derive(Debug, Clone)]
pub struct FilterDescriptor {
    pub source: FilterSource,
    pub scope: FilterScope,
    pub order: i32,
}

impl FilterDescriptor {
    pub fn new(filter: Filter, scope: FilterScope) -> Self {
        Self {
            source: FilterSource::Instance(filter),
            scope,
            order: 0,
        }
    }

    pub fn factory(factory: Arc<dyn FilterFactory>, scope: FilterScope) -> Self {
        Self {
            source: FilterSource::Factory(factory),
            scope,
            order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// Sorts filters into pipeline order.
pub fn sort_filters(filters: &mut [FilterDescriptor]) {
    filters.sort_by_key(|f| (f.order, f.scope));
}
