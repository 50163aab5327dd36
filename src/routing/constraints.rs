//! Action constraints evaluated after route matching.
//!
//! # Responsibilities
//! - HTTP method constraints (OR-ed method sets)
//! - General ordered constraints and per-request constraint factories
//! - Content-type constraint for body-consuming actions
//!
//! # Design Decisions
//! - Method names are stored upper-case and compared case-insensitively
//! - A factory that yields no constraint contributes nothing

use std::fmt;
use std::sync::Arc;

use crate::descriptor::types::ActionDescriptor;
use crate::routing::values::RouteContext;

/// Order used by [`ConsumesConstraint`].
pub const CONSUMES_CONSTRAINT_ORDER: i32 = 200;

/// Accepts requests whose method is in a non-empty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMethodConstraint {
    methods: Vec<String>,
}

impl HttpMethodConstraint {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for method in methods {
            let method = method.as_ref().trim().to_ascii_uppercase();
            if !method.is_empty() && !normalized.contains(&method) {
                normalized.push(method);
            }
        }
        Self { methods: normalized }
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn accepts(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Inputs available to a constraint while it decides.
#[derive(Debug, Clone, Copy)]
pub struct ActionConstraintContext<'a> {
    pub route_context: &'a RouteContext,
    /// Every candidate still in play for this request.
    pub candidates: &'a [Arc<ActionDescriptor>],
    pub current: &'a Arc<ActionDescriptor>,
}

/// A general predicate participating in action selection.
pub trait ActionConstraint: Send + Sync + fmt::Debug {
    /// Constraints are evaluated in ascending order groups.
    fn order(&self) -> i32 {
        0
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool;
}

/// Produces a constraint per request.
pub trait ActionConstraintFactory: Send + Sync + fmt::Debug {
    fn create_instance(&self) -> Option<Arc<dyn ActionConstraint>>;
}

/// Constraint metadata stored on a descriptor.
#[derive(Debug, Clone)]
pub enum ActionConstraintMetadata {
    Constraint(Arc<dyn ActionConstraint>),
    Factory(Arc<dyn ActionConstraintFactory>),
}

impl ActionConstraintMetadata {
    /// Resolves the constraint to evaluate for this request.
    pub fn resolve(&self) -> Option<Arc<dyn ActionConstraint>> {
        match self {
            ActionConstraintMetadata::Constraint(c) => Some(Arc::clone(c)),
            ActionConstraintMetadata::Factory(f) => f.create_instance(),
        }
    }
}

/// Accepts requests whose body content type is one of a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumesConstraint {
    content_types: Vec<String>,
}

impl ConsumesConstraint {
    pub fn new<I, S>(content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            content_types: content_types
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

impl ActionConstraint for ConsumesConstraint {
    fn order(&self) -> i32 {
        CONSUMES_CONSTRAINT_ORDER
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool {
        match context.route_context.request.content_type() {
            Some(content_type) => self.content_types.iter().any(|c| *c == content_type),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_constraint_normalizes() {
        let constraint = HttpMethodConstraint::new(["PUT", "post", "GET", "delete", "pATcH", "get"]);
        assert_eq!(constraint.methods(), ["PUT", "POST", "GET", "DELETE", "PATCH"]);
        assert!(constraint.accepts("patch"));
        assert!(!constraint.accepts("HEAD"));
    }

    #[test]
    fn test_empty_method_constraint() {
        let constraint = HttpMethodConstraint::new(Vec::<String>::new());
        assert!(constraint.is_empty());
        assert!(!constraint.accepts("GET"));
    }

    #[derive(Debug)]
    struct NoConstraint;

    impl ActionConstraintFactory for NoConstraint {
        fn create_instance(&self) -> Option<Arc<dyn ActionConstraint>> {
            None
        }
    }

    #[test]
    fn test_factory_without_instance_resolves_to_none() {
        let metadata = ActionConstraintMetadata::Factory(Arc::new(NoConstraint));
        assert!(metadata.resolve().is_none());
    }
}
