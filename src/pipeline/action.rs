//! Action methods, their return contract, and controller activation.
//!
//! # Responsibilities
//! - Represent sync and async action methods uniformly
//! - Convert return values into results (`Void`, plain values, results)
//! - Create and release controller instances around an invocation
//!
//! # Design Decisions
//! - A sync method may not return a pending future, and an async method
//!   may not resolve to another pending future; both are invalid operations

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::context::{ActionContext, Arguments, ControllerInstance, SharedResult};
use crate::pipeline::result::{EmptyResult, ObjectResult};
use crate::pipeline::types::{InvokeError, InvokeResult};

/// Future returned by asynchronous action methods.
pub type ActionFuture = BoxFuture<'static, InvokeResult<ActionReturn>>;

type SyncHandler = dyn Fn(ActionInvocation) -> InvokeResult<ActionReturn> + Send + Sync;
type AsyncHandler = dyn Fn(ActionInvocation) -> ActionFuture + Send + Sync;

/// What an action method handed back.
pub enum ActionReturn {
    /// No value; becomes an empty result.
    Void,
    /// A plain value; becomes a JSON object result.
    Value(Value),
    /// A ready-made result, used as-is.
    Result(SharedResult),
    /// A future that was not awaited by the method itself.
    Pending(ActionFuture),
}

impl ActionReturn {
    pub fn result<R: crate::pipeline::result::ActionResult + 'static>(result: R) -> Self {
        ActionReturn::Result(Arc::new(result))
    }
}

impl fmt::Debug for ActionReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionReturn::Void => f.write_str("Void"),
            ActionReturn::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ActionReturn::Result(r) => f.debug_tuple("Result").field(r).finish(),
            ActionReturn::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Declared return kind of an action, checked against its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Void,
    Value,
    Future,
}

/// Inputs handed to an action method.
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    pub context: ActionContext,
    pub arguments: Arguments,
    pub controller: Option<ControllerInstance>,
}

impl ActionInvocation {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Downcasts the controller instance.
    pub fn controller<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.controller.clone().and_then(|c| c.downcast::<T>().ok())
    }
}

/// An invocable action method.
#[derive(Clone)]
pub enum ActionMethod {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

impl ActionMethod {
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(ActionInvocation) -> InvokeResult<ActionReturn> + Send + Sync + 'static,
    {
        ActionMethod::Sync(Arc::new(handler))
    }

    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InvokeResult<ActionReturn>> + Send + 'static,
    {
        ActionMethod::Async(Arc::new(move |invocation| -> ActionFuture { Box::pin(handler(invocation)) }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, ActionMethod::Async(_))
    }

    /// Return kind assumed when none is declared.
    pub fn default_return_kind(&self) -> ReturnKind {
        match self {
            ActionMethod::Sync(_) => ReturnKind::Value,
            ActionMethod::Async(_) => ReturnKind::Future,
        }
    }
}

impl fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionMethod::Sync(_) => f.write_str("ActionMethod::Sync"),
            ActionMethod::Async(_) => f.write_str("ActionMethod::Async"),
        }
    }
}

/// Runs an action method and converts its return value into a result.
pub(crate) async fn invoke_action_method(
    display_name: &str,
    method: &ActionMethod,
    invocation: ActionInvocation,
) -> InvokeResult<SharedResult> {
    let returned = match method {
        ActionMethod::Sync(handler) => match handler(invocation)? {
            ActionReturn::Pending(_) => {
                return Err(InvokeError::invalid_operation(format!(
                    "The action '{}' is registered as synchronous but returned a pending future. \
                     Register it as an asynchronous action instead.",
                    display_name
                )))
            }
            other => other,
        },
        ActionMethod::Async(handler) => match handler(invocation).await? {
            ActionReturn::Pending(_) => {
                return Err(InvokeError::invalid_operation(format!(
                    "The action '{}' resolved to another pending future. \
                     Asynchronous actions must await their work before returning.",
                    display_name
                )))
            }
            other => other,
        },
    };
    into_result(returned)
}

/// Converts a completed return value into a result.
pub fn into_result(returned: ActionReturn) -> InvokeResult<SharedResult> {
    match returned {
        ActionReturn::Void => Ok(Arc::new(EmptyResult)),
        ActionReturn::Value(value) => Ok(Arc::new(ObjectResult::new(value))),
        ActionReturn::Result(result) => Ok(result),
        ActionReturn::Pending(_) => Err(InvokeError::invalid_operation(
            "A pending future cannot be used as an action result.",
        )),
    }
}

/// Creates and releases controller instances.
pub trait ControllerFactory: Send + Sync {
    /// `Ok(None)` means the action needs no controller.
    fn create_controller(&self, context: &ActionContext) -> InvokeResult<Option<ControllerInstance>>;

    /// Called once per created instance after the pipeline finishes.
    fn release_controller(&self, context: &ActionContext, controller: ControllerInstance);
}

/// Factory for actions that need no controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoControllerFactory;

impl ControllerFactory for NoControllerFactory {
    fn create_controller(&self, _context: &ActionContext) -> InvokeResult<Option<ControllerInstance>> {
        Ok(None)
    }

    fn release_controller(&self, _context: &ActionContext, _controller: ControllerInstance) {}
}
