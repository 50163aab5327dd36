//! Route handling: selection glued to invocation.
//!
//! # Data Flow
//! ```text
//! RouteContext
//!     → ActionSelector (one action or none)
//!     → ActionInvokerFactory (invoker per request)
//!     → ActionInvoker (filters + action + result)
//!     → RouteContext { is_handled, response, route_data }
//! ```

pub mod builtins;
pub mod invoker_factory;
pub mod route_handler;

use thiserror::Error;

use crate::pipeline::types::InvokeError;
use crate::routing::selector::SelectionError;

pub use invoker_factory::{ActionInvokerFactory, ControllerInvokerFactory};
pub use route_handler::RouteHandler;

/// Errors surfaced by [`RouteHandler::route_async`].
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// The invoker factory could not run the selected action.
    #[error("{0}")]
    InvalidOperation(String),
}
