//! Descriptor construction and action-table validation.
//!
//! # Responsibilities
//! - Build descriptors with the conventional route constraints
//!   (`controller`, `action`, `area`) or an attribute route group
//! - Validate a whole table, collecting every error before failing
//! - Keep conventional actions unreachable through attribute route groups
//!
//! # Design Decisions
//! - Building never fails; problems surface from `validate_descriptors`
//!   so one pass can report all of them
//! - Template checks are structural only (braces, tokens, segments)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::descriptor::types::{
    ActionDescriptor, AttributeRouteInfo, DescriptorError, ParameterDescriptor, RouteConstraint, ROUTE_GROUP_KEY,
};
use crate::pipeline::action::{ActionMethod, ReturnKind};
use crate::pipeline::filters::{sort_filters, FilterDescriptor};
use crate::routing::constraints::{
    ActionConstraint, ActionConstraintFactory, ActionConstraintMetadata, ConsumesConstraint, HttpMethodConstraint,
};

/// Fluent builder for [`ActionDescriptor`].
pub struct ActionDescriptorBuilder {
    controller: String,
    action: String,
    action_route_value: bool,
    area: Option<String>,
    display_name: Option<String>,
    handler: Option<String>,
    route_values: Vec<RouteConstraint>,
    methods: Vec<HttpMethodConstraint>,
    constraints: Vec<ActionConstraintMetadata>,
    filters: Vec<FilterDescriptor>,
    parameters: Vec<ParameterDescriptor>,
    attribute_route: Option<AttributeRouteInfo>,
    method: ActionMethod,
    returns: Option<ReturnKind>,
}

impl ActionDescriptorBuilder {
    pub fn new(controller: impl Into<String>, action: impl Into<String>, method: ActionMethod) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            action_route_value: true,
            area: None,
            display_name: None,
            handler: None,
            route_values: Vec::new(),
            methods: Vec::new(),
            constraints: Vec::new(),
            filters: Vec::new(),
            parameters: Vec::new(),
            attribute_route: None,
            method,
            returns: None,
        }
    }

    pub fn area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    /// Reachable only when the request carries no `action` value.
    pub fn no_action_value(mut self) -> Self {
        self.action_route_value = false;
        self
    }

    pub fn route_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.route_values.push(RouteConstraint::require(key, value));
        self
    }

    pub fn deny_route_value(mut self, key: &str) -> Self {
        self.route_values.push(RouteConstraint::deny(key));
        self
    }

    pub fn catch_all(mut self, key: &str) -> Self {
        self.route_values.push(RouteConstraint::catch_all(key));
        self
    }

    pub fn http_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods.push(HttpMethodConstraint::new(methods));
        self
    }

    pub fn constraint(mut self, constraint: Arc<dyn ActionConstraint>) -> Self {
        self.constraints.push(ActionConstraintMetadata::Constraint(constraint));
        self
    }

    pub fn constraint_factory(mut self, factory: Arc<dyn ActionConstraintFactory>) -> Self {
        self.constraints.push(ActionConstraintMetadata::Factory(factory));
        self
    }

    pub fn constraint_metadata(mut self, metadata: ActionConstraintMetadata) -> Self {
        self.constraints.push(metadata);
        self
    }

    /// Accepts only requests whose content type is one of `content_types`.
    pub fn consumes<I, S>(self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.constraint(Arc::new(ConsumesConstraint::new(content_types)))
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn attribute_route(mut self, route: AttributeRouteInfo) -> Self {
        self.attribute_route = Some(route);
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn returns(mut self, kind: ReturnKind) -> Self {
        self.returns = Some(kind);
        self
    }

    pub fn build(self) -> ActionDescriptor {
        let mut route_constraints = Vec::new();
        match &self.attribute_route {
            Some(route) => {
                let group = replace_tokens(&route.template, &self.controller, &self.action)
                    .unwrap_or_else(|_| route.template.clone());
                route_constraints.push(RouteConstraint::require(ROUTE_GROUP_KEY, group));
            }
            None => {
                route_constraints.push(RouteConstraint::require("controller", self.controller.clone()));
                if self.action_route_value {
                    route_constraints.push(RouteConstraint::require("action", self.action.clone()));
                } else {
                    route_constraints.push(RouteConstraint::deny("action"));
                }
                route_constraints.push(RouteConstraint::from_optional("area", self.area.as_deref()));
            }
        }
        route_constraints.extend(self.route_values);

        let mut filters = self.filters;
        sort_filters(&mut filters);

        let returns = self.returns.unwrap_or_else(|| self.method.default_return_kind());
        let display_name = self
            .display_name
            .unwrap_or_else(|| format!("{}.{}", self.controller, self.action));

        ActionDescriptor {
            id: Uuid::new_v4(),
            name: Some(self.action),
            controller_name: self.controller,
            display_name,
            handler: self.handler,
            route_constraints,
            method_constraints: self.methods,
            action_constraints: self.constraints,
            filters,
            parameters: self.parameters,
            attribute_route: self.attribute_route,
            method: self.method,
            returns,
        }
    }
}

/// Replaces `[controller]` and `[action]` tokens in an attribute route.
pub fn replace_tokens(template: &str, controller: &str, action: &str) -> Result<String, String> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let mut token = String::new();
                let mut closed = false;
                for t in chars.by_ref() {
                    if t == ']' {
                        closed = true;
                        break;
                    }
                    token.push(t);
                }
                if !closed {
                    return Err("a '[' token is not closed".to_string());
                }
                match token.to_ascii_lowercase().as_str() {
                    "controller" => output.push_str(controller),
                    "action" => output.push_str(action),
                    "" => return Err("a token name is empty".to_string()),
                    other => return Err(format!("the token '[{}]' is unknown", other)),
                }
            }
            ']' => return Err("a ']' has no matching '['".to_string()),
            other => output.push(other),
        }
    }
    Ok(output)
}

/// Structural checks on an attribute route template.
pub fn validate_template(template: &str) -> Result<(), String> {
    if template.trim().is_empty() {
        return Err("the template is empty".to_string());
    }

    let trimmed = template.trim_start_matches('/').trim_end_matches('/');
    if !trimmed.is_empty() && trimmed.split('/').any(str::is_empty) {
        return Err("the template contains an empty segment".to_string());
    }

    let mut open: Option<String> = None;
    for c in template.chars() {
        match (c, open.as_mut()) {
            ('{', None) => open = Some(String::new()),
            ('{', Some(_)) => return Err("the template has unbalanced braces".to_string()),
            ('}', Some(name)) => {
                let name = name
                    .trim_start_matches('*')
                    .split(|c| c == ':' || c == '=' || c == '?')
                    .next()
                    .unwrap_or_default()
                    .trim();
                if name.is_empty() {
                    return Err("a route parameter name is empty".to_string());
                }
                open = None;
            }
            ('}', None) => return Err("the template has unbalanced braces".to_string()),
            (c, Some(name)) => name.push(c),
            (_, None) => {}
        }
    }
    if open.is_some() {
        return Err("the template has unbalanced braces".to_string());
    }

    replace_tokens(template, "controller", "action").map(|_| ())
}

/// Checks a whole table and returns every problem found.
pub fn validate_descriptors(items: &[ActionDescriptor]) -> Result<(), DescriptorError> {
    let mut errors = Vec::new();

    for descriptor in items {
        let mut seen: Vec<&str> = Vec::new();
        for constraint in &descriptor.route_constraints {
            if seen.contains(&constraint.key.as_str()) {
                errors.push(format!(
                    "The action '{}' defines more than one route constraint for the key '{}'.",
                    descriptor.display_name, constraint.key
                ));
            } else {
                seen.push(&constraint.key);
            }
        }

        if descriptor.method_constraints.iter().any(HttpMethodConstraint::is_empty) {
            errors.push(format!(
                "The action '{}' has an HTTP method constraint without any methods.",
                descriptor.display_name
            ));
        }

        match (descriptor.method.is_async(), descriptor.returns) {
            (false, ReturnKind::Future) => errors.push(format!(
                "The action '{}' declares an asynchronous return type but is registered as a synchronous method.",
                descriptor.display_name
            )),
            (true, ReturnKind::Void | ReturnKind::Value) => errors.push(format!(
                "The action '{}' declares a synchronous return type but is registered as an asynchronous method.",
                descriptor.display_name
            )),
            _ => {}
        }

        if let Some(route) = &descriptor.attribute_route {
            if let Err(reason) = validate_template(&route.template) {
                errors.push(format!(
                    "The attribute route '{}' on action '{}' is invalid: {}.",
                    route.template, descriptor.display_name, reason
                ));
            }
        }
    }

    errors.extend(route_name_conflicts(items));
    errors.extend(mixed_routing_conflicts(items));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DescriptorError::Invalid(errors))
    }
}

fn route_name_conflicts(items: &[ActionDescriptor]) -> Vec<String> {
    let mut by_name: BTreeMap<&str, Vec<&ActionDescriptor>> = BTreeMap::new();
    for descriptor in items {
        if let Some(name) = descriptor.attribute_route.as_ref().and_then(|r| r.name.as_deref()) {
            by_name.entry(name).or_default().push(descriptor);
        }
    }

    by_name
        .into_iter()
        .filter_map(|(name, actions)| {
            let first = actions[0].route_group();
            if actions.iter().all(|a| a.route_group() == first) {
                return None;
            }
            let mut message = format!("Attribute routes with the same name '{}' must have the same template:", name);
            for action in actions {
                message.push_str(&format!(
                    "\nAction: '{}' - Template: '{}'",
                    action.display_name,
                    action.route_group().unwrap_or_default()
                ));
            }
            Some(message)
        })
        .collect()
}

fn mixed_routing_conflicts(items: &[ActionDescriptor]) -> Vec<String> {
    let mut by_handler: BTreeMap<&str, Vec<&ActionDescriptor>> = BTreeMap::new();
    for descriptor in items {
        if let Some(handler) = descriptor.handler.as_deref() {
            by_handler.entry(handler).or_default().push(descriptor);
        }
    }

    by_handler
        .into_iter()
        .filter_map(|(handler, actions)| {
            let attributed = actions.iter().filter(|a| a.is_attribute_routed()).count();
            if attributed == 0 || attributed == actions.len() {
                return None;
            }
            let mut message = format!(
                "The handler '{}' is used by attribute routed and conventionally routed actions at the same time:",
                handler
            );
            for action in actions {
                let template = action.attribute_route.as_ref().map_or("(none)", |r| r.template.as_str());
                message.push_str(&format!("\nAction: '{}' - Template: '{}'", action.display_name, template));
            }
            Some(message)
        })
        .collect()
}

/// Validates a table and keeps conventional actions out of attribute route
/// groups.
pub fn finalize(mut items: Vec<ActionDescriptor>) -> Result<Vec<ActionDescriptor>, DescriptorError> {
    validate_descriptors(&items)?;

    if items.iter().any(ActionDescriptor::is_attribute_routed) {
        for descriptor in items.iter_mut().filter(|d| !d.is_attribute_routed()) {
            if descriptor.route_constraint(ROUTE_GROUP_KEY).is_none() {
                descriptor.route_constraints.push(RouteConstraint::deny(ROUTE_GROUP_KEY));
            }
        }
    }

    let mut groups: HashMap<&str, usize> = HashMap::new();
    for descriptor in &items {
        if let Some(group) = descriptor.route_group() {
            *groups.entry(group).or_default() += 1;
        }
    }
    tracing::debug!(
        actions = items.len(),
        route_groups = groups.len(),
        "Action table validated"
    );

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::types::RouteKeyHandling;
    use crate::pipeline::action::ActionReturn;

    fn sync() -> ActionMethod {
        ActionMethod::sync(|_| Ok(ActionReturn::Void))
    }

    fn action(controller: &str, action: &str) -> ActionDescriptorBuilder {
        ActionDescriptorBuilder::new(controller, action, sync())
    }

    #[test]
    fn test_conventional_constraints() {
        let descriptor = action("Home", "Index").build();
        assert_eq!(descriptor.display_name, "Home.Index");
        assert_eq!(
            descriptor.route_constraint("controller").unwrap().handling,
            RouteKeyHandling::Require("Home".into())
        );
        assert_eq!(descriptor.route_constraint("area").unwrap().handling, RouteKeyHandling::Deny);
        assert!(descriptor.route_constraint(ROUTE_GROUP_KEY).is_none());
    }

    #[test]
    fn test_no_action_value_denies_action() {
        let descriptor = action("RpcOnly", "Index").no_action_value().build();
        assert_eq!(descriptor.route_constraint("action").unwrap().handling, RouteKeyHandling::Deny);
    }

    #[test]
    fn test_attribute_route_uses_route_group() {
        let descriptor = action("Products", "List")
            .attribute_route(AttributeRouteInfo::new("api/[controller]/[action]"))
            .build();
        assert_eq!(descriptor.route_group(), Some("api/Products/List"));
        assert!(descriptor.route_constraint("controller").is_none());
    }

    #[test]
    fn test_template_validation() {
        assert!(validate_template("api/products/{id}").is_ok());
        assert!(validate_template("api/{*path}").is_ok());
        assert!(validate_template("").is_err());
        assert!(validate_template("api//products").is_err());
        assert!(validate_template("api/{id").is_err());
        assert!(validate_template("api/{}").is_err());
        assert!(validate_template("api/[widget]").is_err());
    }

    #[test]
    fn test_route_name_conflict_is_reported() {
        let items = vec![
            action("Products", "List")
                .attribute_route(AttributeRouteInfo::new("api/products").named("products"))
                .build(),
            action("Products", "Get")
                .attribute_route(AttributeRouteInfo::new("api/products/{id}").named("products"))
                .build(),
        ];
        let err = validate_descriptors(&items).unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert!(err.errors()[0].contains("same name 'products'"));
        assert!(err.to_string().contains("Error 1:"));
    }

    #[test]
    fn test_all_errors_are_collected() {
        let items = vec![
            action("Home", "Index").http_methods(Vec::<String>::new()).build(),
            action("Home", "About").route_value("controller", "Other").build(),
            action("Home", "Async").returns(ReturnKind::Future).build(),
            action("Home", "Mixed").handler("home.mixed").build(),
            action("Home", "Mixed2")
                .handler("home.mixed")
                .attribute_route(AttributeRouteInfo::new("home/mixed"))
                .build(),
        ];
        let err = validate_descriptors(&items).unwrap_err();
        assert_eq!(err.errors().len(), 4);
    }

    #[test]
    fn test_finalize_denies_route_group_on_conventional_actions() {
        let items = finalize(vec![
            action("Home", "Index").build(),
            action("Products", "List")
                .attribute_route(AttributeRouteInfo::new("api/products"))
                .build(),
        ])
        .unwrap();
        assert_eq!(
            items[0].route_constraint(ROUTE_GROUP_KEY).unwrap().handling,
            RouteKeyHandling::Deny
        );
    }
}
