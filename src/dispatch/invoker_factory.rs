//! Invoker creation for selected actions.

use std::sync::Arc;

use crate::pipeline::action::{ControllerFactory, NoControllerFactory};
use crate::pipeline::binding::{ActionBindingContextProvider, DefaultBindingContextProvider};
use crate::pipeline::context::ActionContext;
use crate::pipeline::invoker::{ActionInvoker, ControllerActionInvoker};

/// Creates the invoker that runs one selected action.
pub trait ActionInvokerFactory: Send + Sync {
    /// `None` when no invoker can run this action.
    fn create_invoker(&self, context: ActionContext) -> Option<Box<dyn ActionInvoker>>;
}

/// Builds [`ControllerActionInvoker`]s sharing one binding provider and
/// controller factory.
#[derive(Clone)]
pub struct ControllerInvokerFactory {
    binding: Arc<dyn ActionBindingContextProvider>,
    controllers: Arc<dyn ControllerFactory>,
}

impl ControllerInvokerFactory {
    pub fn new(binding: Arc<dyn ActionBindingContextProvider>, controllers: Arc<dyn ControllerFactory>) -> Self {
        Self { binding, controllers }
    }
}

impl Default for ControllerInvokerFactory {
    fn default() -> Self {
        Self::new(Arc::new(DefaultBindingContextProvider::default()), Arc::new(NoControllerFactory))
    }
}

impl ActionInvokerFactory for ControllerInvokerFactory {
    fn create_invoker(&self, context: ActionContext) -> Option<Box<dyn ActionInvoker>> {
        Some(Box::new(ControllerActionInvoker::new(
            context,
            Arc::clone(&self.binding),
            Arc::clone(&self.controllers),
        )))
    }
}
