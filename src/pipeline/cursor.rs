//! Per-invocation filter chain.
//!
//! Filters are resolved once per invocation (instances cloned, factories
//! invoked) and split into one ordered list per stage. Each stage walks its
//! list with a cursor; nested `next` calls advance the same cursor.

use std::sync::Arc;

use crate::pipeline::context::ActionContext;
use crate::pipeline::filters::{ActionStageFilter, AuthorizationStage, ExceptionStage, ResultStageFilter};
use crate::pipeline::types::InvokeResult;

/// A stage entry tagged with the owning filter's name.
#[derive(Debug)]
pub(crate) struct Named<T> {
    pub name: Arc<str>,
    pub stage: T,
}

impl<T: Clone> Clone for Named<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            stage: self.stage.clone(),
        }
    }
}

/// Filters split by stage, in pipeline order.
#[derive(Debug)]
pub(crate) struct FilterChain {
    pub authorization: Vec<Named<AuthorizationStage>>,
    pub action: Arc<[Named<ActionStageFilter>]>,
    pub exception: Vec<Named<ExceptionStage>>,
    pub result: Arc<[Named<ResultStageFilter>]>,
}

impl FilterChain {
    /// Resolves the descriptor's filters for one invocation.
    pub fn resolve(context: &ActionContext) -> InvokeResult<Self> {
        let mut authorization = Vec::new();
        let mut action = Vec::new();
        let mut exception = Vec::new();
        let mut result = Vec::new();

        for descriptor in &context.descriptor().filters {
            let filter = descriptor.source.resolve(context)?;
            let name = filter.shared_name();
            if let Some(stage) = filter.authorization {
                authorization.push(Named { name: Arc::clone(&name), stage });
            }
            if let Some(stage) = filter.action {
                action.push(Named { name: Arc::clone(&name), stage });
            }
            if let Some(stage) = filter.exception {
                exception.push(Named { name: Arc::clone(&name), stage });
            }
            if let Some(stage) = filter.result {
                result.push(Named { name, stage });
            }
        }

        Ok(Self {
            authorization,
            action: action.into(),
            exception,
            result: result.into(),
        })
    }
}

/// Walks one stage's filter list.
pub(crate) struct FilterCursor<T> {
    items: Arc<[Named<T>]>,
    index: usize,
}

impl<T: Clone> FilterCursor<T> {
    pub fn new(items: Arc<[Named<T>]>) -> Self {
        Self { items, index: 0 }
    }

    /// Returns the next filter, or `None` when the stage reached its core.
    pub fn next(&mut self) -> Option<Named<T>> {
        let item = self.items.get(self.index)?.clone();
        self.index += 1;
        Some(item)
    }
}
