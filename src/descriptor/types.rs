//! Action descriptor types and configuration-time error definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::action::{ActionMethod, ReturnKind};
use crate::pipeline::filters::FilterDescriptor;
use crate::routing::constraints::{ActionConstraintMetadata, HttpMethodConstraint};

/// Virtual route key carried by attribute-routed actions.
pub const ROUTE_GROUP_KEY: &str = "!__route_group";

/// How a route constraint treats its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKeyHandling {
    /// The route value must equal this value (case-insensitive).
    Require(String),
    /// The key must be absent or empty.
    Deny,
    /// Any non-empty value; loses to a `Require` on the same key.
    CatchAll,
}

/// One `(key, handling)` predicate over route values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConstraint {
    /// Lower-cased route key.
    pub key: String,
    pub handling: RouteKeyHandling,
}

impl RouteConstraint {
    /// Requires `key == value`. An empty value denies the key instead.
    pub fn require(key: impl AsRef<str>, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            return Self::deny(key);
        }
        Self {
            key: key.as_ref().to_lowercase(),
            handling: RouteKeyHandling::Require(value),
        }
    }

    pub fn deny(key: impl AsRef<str>) -> Self {
        Self {
            key: key.as_ref().to_lowercase(),
            handling: RouteKeyHandling::Deny,
        }
    }

    pub fn catch_all(key: impl AsRef<str>) -> Self {
        Self {
            key: key.as_ref().to_lowercase(),
            handling: RouteKeyHandling::CatchAll,
        }
    }

    /// `Some(value)` requires the value, `None` denies the key.
    pub fn from_optional(key: impl AsRef<str>, value: Option<&str>) -> Self {
        match value {
            Some(v) => Self::require(key, v),
            None => Self::deny(key),
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.handling == RouteKeyHandling::CatchAll
    }

    pub fn is_require(&self) -> bool {
        matches!(self.handling, RouteKeyHandling::Require(_))
    }
}

/// Where a parameter's value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    Route,
    Query,
    Body,
    /// Route values first, then the query string.
    #[default]
    Any,
}

/// Describes one action parameter for the binding step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub source: BindingSource,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, source: BindingSource) -> Self {
        Self {
            name: name.into(),
            optional: false,
            source,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Attribute route declared on an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRouteInfo {
    /// Route template; `[controller]` and `[action]` tokens are replaced.
    pub template: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: i32,
}

impl AttributeRouteInfo {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            name: None,
            order: 0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Immutable metadata for one invocable action.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub id: Uuid,
    pub name: Option<String>,
    pub controller_name: String,
    pub display_name: String,
    /// Registry key of the method, if registered by name.
    pub handler: Option<String>,
    pub route_constraints: Vec<RouteConstraint>,
    pub method_constraints: Vec<HttpMethodConstraint>,
    pub action_constraints: Vec<ActionConstraintMetadata>,
    /// Sorted by `(order, scope)`.
    pub filters: Vec<FilterDescriptor>,
    pub parameters: Vec<ParameterDescriptor>,
    pub attribute_route: Option<AttributeRouteInfo>,
    pub method: ActionMethod,
    pub returns: ReturnKind,
}

impl ActionDescriptor {
    /// Route constraint for `key`, if any.
    pub fn route_constraint(&self, key: &str) -> Option<&RouteConstraint> {
        let key = key.to_lowercase();
        self.route_constraints.iter().find(|c| c.key == key)
    }

    /// Token-replaced attribute route template, which identifies the route group.
    pub fn route_group(&self) -> Option<&str> {
        self.route_constraint(ROUTE_GROUP_KEY)
            .and_then(|c| match &c.handling {
                RouteKeyHandling::Require(v) => Some(v.as_str()),
                _ => None,
            })
    }

    pub fn is_attribute_routed(&self) -> bool {
        self.attribute_route.is_some()
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Errors raised while building an action table.
#[derive(Debug, Clone, Error)]
pub enum DescriptorError {
    /// One entry per conflicting action or unresolved reference.
    #[error("{}", format_error_list(.0))]
    Invalid(Vec<String>),
}

impl DescriptorError {
    pub fn errors(&self) -> &[String] {
        match self {
            DescriptorError::Invalid(errors) => errors,
        }
    }
}

fn format_error_list(errors: &[String]) -> String {
    let mut message = String::from("The following errors occurred while building the action table:");
    for (i, error) in errors.iter().enumerate() {
        message.push_str(&format!("\n\nError {}:\n{}", i + 1, error));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::matcher::Matcher;
    use crate::routing::values::RouteValues;

    #[test]
    fn test_require_with_empty_value_denies() {
        let constraint = RouteConstraint::require("Area", "");
        assert_eq!(constraint.key, "area");
        assert_eq!(constraint.handling, RouteKeyHandling::Deny);
    }

    #[test]
    fn test_constraint_matching() {
        let values = RouteValues::new().with("controller", "Store").with("country", "de");

        assert!(RouteConstraint::require("controller", "store").matches(&values));
        assert!(!RouteConstraint::require("controller", "Home").matches(&values));
        assert!(RouteConstraint::deny("area").matches(&values));
        assert!(!RouteConstraint::deny("country").matches(&values));
        assert!(RouteConstraint::catch_all("country").matches(&values));
        assert!(!RouteConstraint::catch_all("region").matches(&values));
    }

    #[test]
    fn test_error_list_is_enumerated() {
        let err = DescriptorError::Invalid(vec!["first".into(), "second".into()]);
        let text = err.to_string();
        assert!(text.contains("Error 1:\nfirst"));
        assert!(text.contains("Error 2:\nsecond"));
        assert_eq!(err.errors().len(), 2);
    }
}
