//! Route value and HTTP method matching.
//!
//! # Responsibilities
//! - Evaluate route constraints (Require, Deny, CatchAll)
//! - Combine a descriptor's constraints with AND semantics
//! - Apply catch-all precedence and strict HTTP method matching
//!
//! # Design Decisions
//! - Values compare case-insensitively; empty values count as absent
//! - A `Require` on a key beats a `CatchAll` on the same key
//! - Method-constrained candidates that accept the method win over
//!   unconstrained ones; constrained candidates that reject it are dropped

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::types::{ActionDescriptor, RouteConstraint, RouteKeyHandling};
use crate::routing::values::{values_equal, RouteValues};

/// Trait for matching route values against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the values satisfy this condition.
    fn matches(&self, values: &RouteValues) -> bool;
}

impl Matcher for RouteConstraint {
    fn matches(&self, values: &RouteValues) -> bool {
        let current = values.get(&self.key);
        match &self.handling {
            RouteKeyHandling::Require(expected) => current.is_some_and(|actual| values_equal(actual, expected)),
            RouteKeyHandling::Deny => current.is_none(),
            RouteKeyHandling::CatchAll => current.is_some(),
        }
    }
}

/// All of a descriptor's route constraints must pass.
impl Matcher for ActionDescriptor {
    fn matches(&self, values: &RouteValues) -> bool {
        self.route_constraints.iter().all(|c| c.matches(values))
    }
}

/// Scans every descriptor, keeping those whose route constraints pass.
pub fn match_route_constraints(descriptors: &[Arc<ActionDescriptor>], values: &RouteValues) -> Vec<Arc<ActionDescriptor>> {
    let matched = descriptors
        .iter()
        .filter(|d| d.matches(values))
        .cloned()
        .collect();
    apply_catch_all_precedence(matched)
}

/// Drops catch-all candidates on keys where another candidate requires an
/// exact value.
pub fn apply_catch_all_precedence(candidates: Vec<Arc<ActionDescriptor>>) -> Vec<Arc<ActionDescriptor>> {
    let exact_keys: HashSet<&str> = candidates
        .iter()
        .flat_map(|d| d.route_constraints.iter())
        .filter(|c| c.is_require())
        .map(|c| c.key.as_str())
        .collect();

    if exact_keys.is_empty() {
        return candidates;
    }

    let keep: Vec<bool> = candidates
        .iter()
        .map(|d| {
            !d.route_constraints
                .iter()
                .any(|c| c.is_catch_all() && exact_keys.contains(c.key.as_str()))
        })
        .collect();
    drop(exact_keys);

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(d, keep)| keep.then_some(d))
        .collect()
}

/// Applies HTTP method constraints to route-matched candidates.
pub fn match_http_method(candidates: Vec<Arc<ActionDescriptor>>, method: &str) -> Vec<Arc<ActionDescriptor>> {
    let mut constrained = Vec::new();
    let mut unconstrained = Vec::new();

    for candidate in candidates {
        if candidate.method_constraints.is_empty() {
            unconstrained.push(candidate);
        } else if candidate.method_constraints.iter().any(|c| c.accepts(method)) {
            constrained.push(candidate);
        }
    }

    if constrained.is_empty() {
        unconstrained
    } else {
        constrained
    }
}
