//! Route handler.
//!
//! # Responsibilities
//! - Select the action for a route context
//! - Hand the invocation a private copy of the route data
//! - Publish the copy and the response on success, keep the original on failure

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::config::schema::PipelineConfig;
use crate::descriptor::store::ActionDescriptorProvider;
use crate::dispatch::invoker_factory::ActionInvokerFactory;
use crate::dispatch::DispatchError;
use crate::observability::metrics;
use crate::pipeline::context::ActionContext;
use crate::routing::selector::ActionSelector;
use crate::routing::values::{RouteContext, RouteData, UrlGenerationContext};

/// Selects and invokes actions for route contexts.
pub struct RouteHandler {
    selector: ActionSelector,
    invokers: Arc<dyn ActionInvokerFactory>,
    options: PipelineConfig,
}

impl RouteHandler {
    pub fn new(
        descriptors: Arc<dyn ActionDescriptorProvider>,
        invokers: Arc<dyn ActionInvokerFactory>,
        options: PipelineConfig,
    ) -> Self {
        Self {
            selector: ActionSelector::new(descriptors),
            invokers,
            options,
        }
    }

    pub fn selector(&self) -> &ActionSelector {
        &self.selector
    }

    /// Delegates to the selector's URL generation probe.
    pub fn has_valid_action(&self, context: &UrlGenerationContext) -> bool {
        self.selector.has_valid_action(context)
    }

    /// Handles the route context. Leaves `is_handled` false when no action
    /// matches.
    pub async fn route_async(&self, context: &mut RouteContext) -> Result<(), DispatchError> {
        let Some(descriptor) = self.selector.select(context)? else {
            tracing::debug!(path = %context.request.path, "No actions matched the current request");
            return Ok(());
        };

        let route_data = RouteData::clone(&context.route_data);
        let action_context = ActionContext::new(
            Arc::clone(&descriptor),
            Arc::clone(&context.request),
            route_data,
            context.aborted.clone(),
        );

        let Some(mut invoker) = self.invokers.create_invoker(action_context.clone()) else {
            return Err(DispatchError::InvalidOperation(format!(
                "An action invoker could not be created for action '{}'.",
                descriptor.display_name
            )));
        };

        action_context.model_state().max_allowed_errors = self.options.max_model_validation_errors;

        let span = tracing::info_span!(
            "action",
            action = %descriptor.display_name,
            trace_id = %action_context.trace_identifier()
        );
        let start = Instant::now();
        let outcome = invoker.invoke().instrument(span).await;

        match outcome {
            Ok(()) => {
                metrics::record_invocation("completed", start);
                context.route_data = Arc::new(action_context.route_data());
                context.response = Some(action_context.take_response());
                context.is_handled = true;
                tracing::debug!(action = %descriptor.display_name, "Executed action");
                Ok(())
            }
            Err(error) => {
                metrics::record_invocation("failed", start);
                tracing::warn!(action = %descriptor.display_name, error = %error, "Action invocation failed");
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::builder::ActionDescriptorBuilder;
    use crate::descriptor::store::ActionDescriptorStore;
    use crate::dispatch::invoker_factory::ControllerInvokerFactory;
    use crate::pipeline::action::{ActionMethod, ActionReturn};
    use crate::pipeline::invoker::ActionInvoker;
    use crate::routing::values::{RequestData, RouteValues};
    use axum::http::Method;

    struct NoInvokers;

    impl ActionInvokerFactory for NoInvokers {
        fn create_invoker(&self, _context: ActionContext) -> Option<Box<dyn ActionInvoker>> {
            None
        }
    }

    fn store() -> Arc<ActionDescriptorStore> {
        Arc::new(ActionDescriptorStore::new(vec![ActionDescriptorBuilder::new(
            "Home",
            "Index",
            ActionMethod::sync(|_| Ok(ActionReturn::Void)),
        )
        .build()]))
    }

    fn context(values: RouteValues) -> RouteContext {
        RouteContext::new(RequestData::new(Method::GET, "/"), RouteData::new(values))
    }

    #[tokio::test]
    async fn test_no_match_leaves_context_unhandled() {
        let handler = RouteHandler::new(
            store(),
            Arc::new(ControllerInvokerFactory::default()),
            PipelineConfig::default(),
        );
        let mut ctx = context(RouteValues::new().with("controller", "Missing"));
        handler.route_async(&mut ctx).await.unwrap();
        assert!(!ctx.is_handled);
        assert!(ctx.response.is_none());
    }

    #[tokio::test]
    async fn test_missing_invoker_is_invalid_operation() {
        let handler = RouteHandler::new(store(), Arc::new(NoInvokers), PipelineConfig::default());
        let mut ctx = context(RouteValues::new().with("controller", "Home").with("action", "Index"));
        let original = Arc::clone(&ctx.route_data);

        let err = handler.route_async(&mut ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidOperation(_)));
        assert!(Arc::ptr_eq(&original, &ctx.route_data));
    }
}
