//! Pipeline error definitions.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while running the filter pipeline.
///
/// The type is `Clone` so one error value can travel through the executed
/// contexts of several filters and still come out of `invoke` unchanged.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// A programming or configuration error detected by the pipeline itself.
    #[error("{0}")]
    InvalidOperation(String),

    /// An error raised by an action method, filter, or result.
    #[error(transparent)]
    Handler(Arc<dyn StdError + Send + Sync + 'static>),

    /// The client abandoned the request.
    #[error("The request was aborted.")]
    Aborted,
}

impl InvokeError {
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        InvokeError::InvalidOperation(message.into())
    }

    /// Wraps any error raised by user code.
    pub fn handler<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        InvokeError::Handler(Arc::new(error))
    }

    /// Wraps a plain message as a handler error.
    pub fn message(message: impl Into<String>) -> Self {
        InvokeError::Handler(Arc::new(HandlerMessage(message.into())))
    }

    /// Returns true when both values carry the very same underlying error.
    pub fn same_error(&self, other: &InvokeError) -> bool {
        match (self, other) {
            (InvokeError::Handler(a), InvokeError::Handler(b)) => Arc::ptr_eq(a, b),
            (InvokeError::InvalidOperation(a), InvokeError::InvalidOperation(b)) => a == b,
            (InvokeError::Aborted, InvokeError::Aborted) => true,
            _ => false,
        }
    }

    /// Downcasts a handler error to its concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            InvokeError::Handler(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Error carrying only a message.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerMessage(pub String);

/// Result type for pipeline operations.
pub type InvokeResult<T> = Result<T, InvokeError>;
