//! Filter pipeline.
//!
//! # Data Flow
//! ```text
//! ActionContext
//!     → cursor.rs (per-request filter chain from the descriptor's filters)
//!     → invoker.rs
//!         exception filters (only when faulted)
//!             authorization filters
//!             controller + binding.rs (arguments, model state)
//!             action filters → action.rs (method call, return contract)
//!         result filters → result.rs (writes the ResponseSink)
//! ```
//!
//! # Design Decisions
//! - Filters are shared `Arc`s; a request clones handles, never filters
//! - One error value travels through every executed context unchanged
//! - Contract violations fail with `InvokeError::InvalidOperation`

pub mod action;
pub mod binding;
pub mod context;
pub(crate) mod cursor;
pub mod filters;
pub mod invoker;
pub mod result;
pub mod types;

pub use action::{ActionInvocation, ActionMethod, ActionReturn, ControllerFactory, NoControllerFactory, ReturnKind};
pub use binding::{ActionBindingContext, ActionBindingContextProvider, DefaultBindingContextProvider};
pub use context::{
    ActionContext, ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ExceptionContext, ModelState,
    ResponseSink, ResultExecutedContext, ResultExecutingContext,
};
pub use filters::{Filter, FilterDescriptor, FilterFactory, FilterScope};
pub use invoker::{ActionInvoker, ActionNext, ControllerActionInvoker, ResultNext};
pub use result::{ActionResult, ContentResult, EmptyResult, ObjectResult, StatusCodeResult};
pub use types::{InvokeError, InvokeResult};
