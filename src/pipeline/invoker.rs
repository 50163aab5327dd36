//! Controller action invoker.
//!
//! # Responsibilities
//! - Run authorization, controller creation, binding, action filters and
//!   the action method inside the exception-filter boundary
//! - Route errors through exception filters, innermost first
//! - Run result filters around result execution
//! - Release the controller instance once the pipeline finishes
//!
//! # Design Decisions
//! - Each stage owns a cursor over its filters; `next` re-enters the same
//!   stage, so nested filters see the inner stage's executed context
//! - Results from authorization or exception filters execute directly,
//!   without result filters
//! - An error nobody handles comes out of `invoke` as the same value
//!
//! # Data Flow
//! ```text
//! exception filters (only when faulted)
//!   └─ authorization ─ controller ─ binding ─ action filters ─ action
//! result filters
//!   └─ result
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::observability::metrics;
use crate::pipeline::action::{invoke_action_method, ActionInvocation, ActionMethod, ControllerFactory};
use crate::pipeline::binding::{bind_arguments, ActionBindingContextProvider};
use crate::pipeline::context::{
    ActionContext, ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ControllerInstance,
    ExceptionContext, ResultExecutedContext, ResultExecutingContext, SharedResult,
};
use crate::pipeline::cursor::{FilterChain, FilterCursor, Named};
use crate::pipeline::filters::{ActionStageFilter, ResultStageFilter, Stage};
use crate::pipeline::result::EmptyResult;
use crate::pipeline::types::{InvokeError, InvokeResult};
use crate::routing::values::RequestAborted;

const ACTION_NEXT_AFTER_RESULT: &str = "An asynchronous action filter set ActionExecutingContext.result and then \
     called next. Setting a result short-circuits the action; next must not be called afterwards.";

const RESULT_NEXT_AFTER_CANCEL: &str = "An asynchronous result filter set ResultExecutingContext.cancel and then \
     called next. Canceling short-circuits the result; next must not be called afterwards.";

const MISSING_EXECUTED_CONTEXT: &str = "The filter stage completed without producing an executed context.";

/// Runs the pipeline for one selected action.
#[async_trait]
pub trait ActionInvoker: Send {
    async fn invoke(&mut self) -> InvokeResult<()>;
}

/// Invoker for controller actions.
pub struct ControllerActionInvoker {
    context: ActionContext,
    binding: Arc<dyn ActionBindingContextProvider>,
    controllers: Arc<dyn ControllerFactory>,
}

impl ControllerActionInvoker {
    pub fn new(
        context: ActionContext,
        binding: Arc<dyn ActionBindingContextProvider>,
        controllers: Arc<dyn ControllerFactory>,
    ) -> Self {
        Self {
            context,
            binding,
            controllers,
        }
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    async fn invoke_guarded(
        &self,
        chain: &FilterChain,
        controller: &mut Option<ControllerInstance>,
    ) -> InvokeResult<Guarded> {
        if let Some(challenge) = self.invoke_authorization_filters(chain).await? {
            return Ok(Guarded::Challenged(challenge));
        }

        let instance = self.controllers.create_controller(&self.context)?;
        *controller = instance.clone();

        let binding = self.binding.binding_context(&self.context).await?;
        let arguments = bind_arguments(&self.context, &binding);

        let descriptor = self.context.descriptor();
        let mut executing = ActionExecutingContext::new(self.context.clone(), arguments, instance);
        let mut stage = ActionStage {
            cursor: FilterCursor::new(Arc::clone(&chain.action)),
            method: descriptor.method.clone(),
            display_name: descriptor.display_name.clone(),
            aborted: self.context.aborted().clone(),
            executed: None,
        };
        stage.invoke_next(&mut executing).await?;

        let executed = stage
            .executed
            .take()
            .ok_or_else(|| InvokeError::invalid_operation(MISSING_EXECUTED_CONTEXT))?;
        Ok(Guarded::Executed(executed))
    }

    async fn invoke_authorization_filters(&self, chain: &FilterChain) -> InvokeResult<Option<SharedResult>> {
        let mut context = AuthorizationContext::new(self.context.clone());
        for item in &chain.authorization {
            match &item.stage {
                Stage::Sync(filter) => filter.on_authorization(&mut context)?,
                Stage::Async(filter) => filter.on_authorization(&mut context).await?,
            }
            if let Some(challenge) = context.result.take() {
                tracing::info!(
                    filter = %item.name,
                    action = %self.context.descriptor().display_name,
                    "Authorization failed for the request at filter"
                );
                metrics::record_short_circuit("authorization");
                return Ok(Some(challenge));
            }
        }
        Ok(None)
    }

    async fn handle_exceptions(&self, chain: &FilterChain, outcome: InvokeResult<Guarded>) -> InvokeResult<Flow> {
        let error = match outcome {
            Ok(Guarded::Challenged(result)) => return Ok(Flow::Direct(result)),
            Ok(Guarded::Executed(executed)) => match executed.unhandled_exception().cloned() {
                Some(error) => error,
                None => return Ok(Flow::Filtered(executed.result)),
            },
            Err(error) => error,
        };

        if chain.exception.is_empty() {
            return Err(error);
        }

        let mut context = ExceptionContext::new(self.context.clone(), error);
        for item in chain.exception.iter().rev() {
            match &item.stage {
                Stage::Sync(filter) => filter.on_exception(&mut context)?,
                Stage::Async(filter) => filter.on_exception(&mut context).await?,
            }
            if context.is_handled() {
                tracing::debug!(filter = %item.name, "Exception handled by filter");
                break;
            }
        }

        if let Some(result) = context.result.take() {
            metrics::record_short_circuit("exception");
            return Ok(Flow::Direct(result));
        }
        match context.exception {
            Some(error) => Err(error),
            None => Ok(Flow::Filtered(None)),
        }
    }

    async fn invoke_result_filters(
        &self,
        chain: &FilterChain,
        result: SharedResult,
        controller: Option<ControllerInstance>,
    ) -> InvokeResult<()> {
        let mut executing = ResultExecutingContext::new(self.context.clone(), controller, result);
        let mut stage = ResultStage {
            cursor: FilterCursor::new(Arc::clone(&chain.result)),
            aborted: self.context.aborted().clone(),
            executed: None,
        };
        stage.invoke_next(&mut executing).await?;

        let executed = stage
            .executed
            .take()
            .ok_or_else(|| InvokeError::invalid_operation(MISSING_EXECUTED_CONTEXT))?;
        match executed.unhandled_exception() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn execute_direct(&self, result: SharedResult) -> InvokeResult<()> {
        abortable(self.context.aborted(), result.execute_result(&self.context)).await
    }
}

#[async_trait]
impl ActionInvoker for ControllerActionInvoker {
    async fn invoke(&mut self) -> InvokeResult<()> {
        let chain = FilterChain::resolve(&self.context)?;
        let mut controller = None;

        let outcome = self.invoke_guarded(&chain, &mut controller).await;
        let flow = self.handle_exceptions(&chain, outcome).await;

        let completed = match flow {
            Ok(Flow::Direct(result)) => self.execute_direct(result).await,
            Ok(Flow::Filtered(result)) => {
                let result = result.unwrap_or_else(|| Arc::new(EmptyResult));
                self.invoke_result_filters(&chain, result, controller.clone()).await
            }
            Err(error) => Err(error),
        };

        if let Some(instance) = controller {
            self.controllers.release_controller(&self.context, instance);
        }
        completed
    }
}

enum Guarded {
    Challenged(SharedResult),
    Executed(ActionExecutedContext),
}

enum Flow {
    /// Executes without result filters.
    Direct(SharedResult),
    Filtered(Option<SharedResult>),
}

/// Races `work` against the request's abort signal.
async fn abortable<T>(aborted: &RequestAborted, work: impl Future<Output = InvokeResult<T>>) -> InvokeResult<T> {
    tokio::select! {
        biased;
        _ = aborted.aborted() => Err(InvokeError::Aborted),
        outcome = work => outcome,
    }
}

/// State of the action-filter stage for one invocation.
pub(crate) struct ActionStage {
    cursor: FilterCursor<ActionStageFilter>,
    method: ActionMethod,
    display_name: String,
    aborted: RequestAborted,
    executed: Option<ActionExecutedContext>,
}

impl ActionStage {
    fn invoke_next<'s>(&'s mut self, context: &'s mut ActionExecutingContext) -> BoxFuture<'s, InvokeResult<()>> {
        Box::pin(async move {
            if context.result.is_some() {
                return Err(InvokeError::invalid_operation(ACTION_NEXT_AFTER_RESULT));
            }
            if let Err(error) = self.step(context).await {
                self.executed = Some(ActionExecutedContext::faulted(context, error));
            }
            Ok(())
        })
    }

    async fn step(&mut self, context: &mut ActionExecutingContext) -> InvokeResult<()> {
        match self.cursor.next() {
            Some(Named {
                name,
                stage: Stage::Async(filter),
            }) => {
                filter
                    .on_action_execution(context, ActionNext { stage: &mut *self })
                    .await?;
                if self.executed.is_none() {
                    tracing::debug!(filter = %name, "Action execution short-circuited by filter");
                    metrics::record_short_circuit("action");
                    self.executed = Some(ActionExecutedContext::canceled(context));
                }
            }
            Some(Named {
                name,
                stage: Stage::Sync(filter),
            }) => {
                filter.on_action_executing(context)?;
                if context.result.is_some() {
                    tracing::debug!(filter = %name, "Action execution short-circuited by filter");
                    metrics::record_short_circuit("action");
                    let executed = self.executed.insert(ActionExecutedContext::canceled(context));
                    filter.on_action_executed(executed)?;
                } else {
                    self.invoke_next(context).await?;
                    let executed = self
                        .executed
                        .as_mut()
                        .ok_or_else(|| InvokeError::invalid_operation(MISSING_EXECUTED_CONTEXT))?;
                    filter.on_action_executed(executed)?;
                }
            }
            None => {
                let invocation = ActionInvocation {
                    context: context.action.clone(),
                    arguments: context.arguments.clone(),
                    controller: context.controller.clone(),
                };
                let result = abortable(
                    &self.aborted,
                    invoke_action_method(&self.display_name, &self.method, invocation),
                )
                .await?;
                self.executed = Some(ActionExecutedContext::completed(context, result));
            }
        }
        Ok(())
    }
}

/// Continuation handed to asynchronous action filters.
pub struct ActionNext<'a> {
    stage: &'a mut ActionStage,
}

impl<'a> ActionNext<'a> {
    /// Runs the remaining filters and the action, returning their outcome.
    pub async fn run(self, context: &mut ActionExecutingContext) -> InvokeResult<&'a mut ActionExecutedContext> {
        let stage = self.stage;
        stage.invoke_next(context).await?;
        stage
            .executed
            .as_mut()
            .ok_or_else(|| InvokeError::invalid_operation(MISSING_EXECUTED_CONTEXT))
    }
}

/// State of the result-filter stage for one invocation.
pub(crate) struct ResultStage {
    cursor: FilterCursor<ResultStageFilter>,
    aborted: RequestAborted,
    executed: Option<ResultExecutedContext>,
}

impl ResultStage {
    fn invoke_next<'s>(&'s mut self, context: &'s mut ResultExecutingContext) -> BoxFuture<'s, InvokeResult<()>> {
        Box::pin(async move {
            if context.cancel {
                return Err(InvokeError::invalid_operation(RESULT_NEXT_AFTER_CANCEL));
            }
            if let Err(error) = self.step(context).await {
                self.executed = Some(ResultExecutedContext::faulted(context, error));
            }
            Ok(())
        })
    }

    async fn step(&mut self, context: &mut ResultExecutingContext) -> InvokeResult<()> {
        match self.cursor.next() {
            Some(Named {
                name,
                stage: Stage::Async(filter),
            }) => {
                filter
                    .on_result_execution(context, ResultNext { stage: &mut *self })
                    .await?;
                if self.executed.is_none() || context.cancel {
                    tracing::debug!(filter = %name, "Result execution short-circuited by filter");
                    metrics::record_short_circuit("result");
                    self.executed = Some(ResultExecutedContext::canceled(context));
                }
            }
            Some(Named {
                name,
                stage: Stage::Sync(filter),
            }) => {
                filter.on_result_executing(context)?;
                if context.cancel {
                    tracing::debug!(filter = %name, "Result execution short-circuited by filter");
                    metrics::record_short_circuit("result");
                    let executed = self.executed.insert(ResultExecutedContext::canceled(context));
                    filter.on_result_executed(executed)?;
                } else {
                    self.invoke_next(context).await?;
                    let executed = self
                        .executed
                        .as_mut()
                        .ok_or_else(|| InvokeError::invalid_operation(MISSING_EXECUTED_CONTEXT))?;
                    filter.on_result_executed(executed)?;
                }
            }
            None => {
                let result = Arc::clone(&context.result);
                abortable(&self.aborted, result.execute_result(&context.action)).await?;
                self.executed = Some(ResultExecutedContext::completed(context));
            }
        }
        Ok(())
    }
}

/// Continuation handed to asynchronous result filters.
pub struct ResultNext<'a> {
    stage: &'a mut ResultStage,
}

impl<'a> ResultNext<'a> {
    /// Runs the remaining filters and the result, returning their outcome.
    pub async fn run(self, context: &mut ResultExecutingContext) -> InvokeResult<&'a mut ResultExecutedContext> {
        let stage = self.stage;
        stage.invoke_next(context).await?;
        stage
            .executed
            .as_mut()
            .ok_or_else(|| InvokeError::invalid_operation(MISSING_EXECUTED_CONTEXT))
    }
}
