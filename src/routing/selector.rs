//! Action selection.
//!
//! # Responsibilities
//! - Narrow the descriptor snapshot to one action for a request
//! - Report ambiguity as an error and a miss as `None`
//! - Probe whether route values could reach any action (URL generation)
//!
//! # Data Flow
//! ```text
//! RouteContext
//!     → decision tree (route constraints + catch-all precedence)
//!     → HTTP method match
//!     → action constraints by ascending order group
//!     → 0 → None | 1 → Some | n → SelectionError::Ambiguous
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::descriptor::store::ActionDescriptorProvider;
use crate::descriptor::types::ActionDescriptor;
use crate::observability::metrics;
use crate::routing::constraints::{ActionConstraint, ActionConstraintContext};
use crate::routing::decision_tree::DecisionTreeProvider;
use crate::routing::matcher::match_http_method;
use crate::routing::values::{RouteContext, UrlGenerationContext};

/// Per-request selection failures.
#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    /// More than one action survived every selection stage.
    #[error(
        "Multiple actions matched. The following actions matched route data and had all constraints satisfied:\n\n{}",
        .display_names.join("\n")
    )]
    Ambiguous { display_names: Vec<String> },
}

/// Selects the action for a request.
pub struct ActionSelector {
    trees: DecisionTreeProvider,
}

struct Candidate {
    descriptor: Arc<ActionDescriptor>,
    constraints: Vec<Arc<dyn ActionConstraint>>,
}

impl ActionSelector {
    pub fn new(descriptors: Arc<dyn ActionDescriptorProvider>) -> Self {
        Self {
            trees: DecisionTreeProvider::new(descriptors),
        }
    }

    /// Selects exactly one action, none, or fails on ambiguity.
    pub fn select(&self, context: &RouteContext) -> Result<Option<Arc<ActionDescriptor>>, SelectionError> {
        let span = tracing::debug_span!(
            "action_selector.select",
            method = %context.method(),
            path = %context.request.path
        );
        let _guard = span.enter();

        let tree = self.trees.tree();
        let route_matched = tree.select(context.values());
        let route_count = route_matched.len();

        let method_matched = match_http_method(route_matched, context.method().as_str());
        let method_count = method_matched.len();

        let mut selected = self.select_best(context, method_matched);
        tracing::debug!(
            version = tree.version(),
            route_matches = route_count,
            method_matches = method_count,
            constraint_matches = selected.len(),
            "Action selection stages completed"
        );

        match selected.len() {
            0 => {
                metrics::record_selection("miss");
                Ok(None)
            }
            1 => {
                let action = selected.remove(0);
                tracing::debug!(action = %action.display_name, "Selected action");
                metrics::record_selection("matched");
                Ok(Some(action))
            }
            _ => {
                let display_names: Vec<String> = selected.iter().map(|d| d.display_name.clone()).collect();
                tracing::warn!(candidates = ?display_names, "Ambiguous action match");
                metrics::record_selection("ambiguous");
                Err(SelectionError::Ambiguous { display_names })
            }
        }
    }

    /// True when route constraints alone could reach some action.
    pub fn has_valid_action(&self, context: &UrlGenerationContext) -> bool {
        let values = context.effective_values();
        !self.trees.tree().select(&values).is_empty()
    }

    fn select_best(&self, context: &RouteContext, candidates: Vec<Arc<ActionDescriptor>>) -> Vec<Arc<ActionDescriptor>> {
        if candidates.is_empty() {
            return candidates;
        }

        let resolved: Vec<Candidate> = candidates
            .iter()
            .map(|descriptor| Candidate {
                descriptor: Arc::clone(descriptor),
                constraints: descriptor
                    .action_constraints
                    .iter()
                    .filter_map(|m| m.resolve())
                    .collect(),
            })
            .collect();

        if resolved.iter().all(|c| c.constraints.is_empty()) {
            return candidates;
        }

        evaluate_constraints(context, &candidates, resolved, None)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.descriptor)
            .collect()
    }
}

/// Evaluates the lowest order group above `after`, preferring candidates
/// that had a constraint in the group and accepted. Falls back to the
/// candidates without a constraint in the group when the preferred branch
/// ends up empty.
fn evaluate_constraints(
    context: &RouteContext,
    all: &[Arc<ActionDescriptor>],
    candidates: Vec<Candidate>,
    after: Option<i32>,
) -> Option<Vec<Candidate>> {
    let order = candidates
        .iter()
        .flat_map(|c| c.constraints.iter().map(|k| k.order()))
        .filter(|order| after.map_or(true, |after| *order > after))
        .min();

    let Some(order) = order else {
        return Some(candidates);
    };

    let mut accepted = Vec::new();
    let mut unconstrained = Vec::new();

    for candidate in candidates {
        let constraint_context = ActionConstraintContext {
            route_context: context,
            candidates: all,
            current: &candidate.descriptor,
        };
        let mut in_group = false;
        let mut is_match = true;
        for constraint in candidate.constraints.iter().filter(|k| k.order() == order) {
            in_group = true;
            if !constraint.accept(&constraint_context) {
                is_match = false;
                break;
            }
        }

        if is_match && in_group {
            accepted.push(candidate);
        } else if is_match {
            unconstrained.push(candidate);
        }
    }

    if !accepted.is_empty() {
        if let Some(matches) = evaluate_constraints(context, all, accepted, Some(order)) {
            if !matches.is_empty() {
                return Some(matches);
            }
        }
    }

    if unconstrained.is_empty() {
        None
    } else {
        evaluate_constraints(context, all, unconstrained, Some(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguity_message_lists_names() {
        let err = SelectionError::Ambiguous {
            display_names: vec!["Home.Index".into(), "Home.Index2".into()],
        };
        assert_eq!(
            err.to_string(),
            "Multiple actions matched. The following actions matched route data and had all constraints \
             satisfied:\n\nHome.Index\nHome.Index2"
        );
    }
}
