//! Name-to-code registry for TOML action tables.
//!
//! # Responsibilities
//! - Map handler, filter, constraint and controller names to code
//! - Turn an `ActionTableConfig` into validated descriptors
//! - Report every unknown name in one `DescriptorError`

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::config::schema::{ActionEntryConfig, ActionTableConfig, FilterRefConfig};
use crate::descriptor::builder::{finalize, validate_descriptors, ActionDescriptorBuilder};
use crate::descriptor::types::{ActionDescriptor, DescriptorError};
use crate::pipeline::action::{ActionFuture, ActionMethod, ActionReturn, ControllerFactory, ReturnKind};
use crate::pipeline::context::{ActionContext, ControllerInstance};
use crate::pipeline::filters::{Filter, FilterDescriptor, FilterFactory, FilterSource};
use crate::pipeline::types::InvokeResult;
use crate::routing::constraints::{ActionConstraint, ActionConstraintFactory, ActionConstraintMetadata};

/// Methods reached through the conventional default action.
const DEFAULT_ACTION_METHODS: [&str; 2] = ["GET", "POST"];

/// Registered code, looked up by name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ActionMethod>,
    filters: HashMap<String, FilterSource>,
    constraints: HashMap<String, ActionConstraintMetadata>,
    controllers: HashMap<String, Arc<dyn ControllerFactory>>,
    permissive: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves unknown names to placeholders instead of failing.
    ///
    /// Used for offline table inspection where handler code is not linked in.
    pub fn permissive(mut self) -> Self {
        self.permissive = true;
        self
    }

    pub fn register_handler(&mut self, name: impl Into<String>, method: ActionMethod) -> &mut Self {
        self.handlers.insert(name.into(), method);
        self
    }

    /// Registers a shared filter under its own name.
    pub fn register_filter(&mut self, filter: Filter) -> &mut Self {
        self.filters
            .insert(filter.name().to_string(), FilterSource::Instance(filter));
        self
    }

    pub fn register_filter_factory(&mut self, name: impl Into<String>, factory: Arc<dyn FilterFactory>) -> &mut Self {
        self.filters.insert(name.into(), FilterSource::Factory(factory));
        self
    }

    pub fn register_constraint(&mut self, name: impl Into<String>, constraint: Arc<dyn ActionConstraint>) -> &mut Self {
        self.constraints
            .insert(name.into(), ActionConstraintMetadata::Constraint(constraint));
        self
    }

    pub fn register_constraint_factory(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn ActionConstraintFactory>,
    ) -> &mut Self {
        self.constraints
            .insert(name.into(), ActionConstraintMetadata::Factory(factory));
        self
    }

    /// Registers the controller factory used for actions of `controller`.
    pub fn register_controller(&mut self, controller: impl Into<String>, factory: Arc<dyn ControllerFactory>) -> &mut Self {
        self.controllers
            .insert(controller.into().to_lowercase(), factory);
        self
    }

    pub fn handler(&self, name: &str) -> Option<&ActionMethod> {
        self.handlers.get(name)
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Controller factory dispatching on the action's controller name.
    pub fn controller_factory(&self) -> Arc<dyn ControllerFactory> {
        Arc::new(ControllerMap {
            factories: self.controllers.clone(),
        })
    }

    /// Builds and validates descriptors for a whole table.
    pub fn build(&self, table: &ActionTableConfig) -> Result<Vec<ActionDescriptor>, DescriptorError> {
        let mut errors = Vec::new();
        let mut descriptors = Vec::new();

        let global_filters = self.resolve_filters(&table.global_filters, "the global filter list", &mut errors);

        for entry in &table.actions {
            let display_name = entry
                .display_name
                .clone()
                .unwrap_or_else(|| format!("{}.{}", entry.controller, entry.action));

            let Some(method) = self.resolve_handler(entry, &display_name, &mut errors) else {
                continue;
            };
            let mut filters = global_filters.clone();
            filters.extend(self.resolve_filters(&entry.filters, &format!("action '{}'", display_name), &mut errors));
            let constraints = self.resolve_constraints(entry, &display_name, &mut errors);

            let builder = || {
                let mut builder = ActionDescriptorBuilder::new(&entry.controller, &entry.action, method.clone())
                    .handler(&entry.handler)
                    .display_name(display_name.clone());
                if let Some(area) = &entry.area {
                    builder = builder.area(area);
                }
                for (key, value) in &entry.route_values {
                    builder = match value.as_str() {
                        "*" => builder.catch_all(key),
                        "" => builder.deny_route_value(key),
                        _ => builder.route_value(key, value),
                    };
                }
                for constraint in &constraints {
                    builder = builder.constraint_metadata(constraint.clone());
                }
                if !entry.consumes.is_empty() {
                    builder = builder.consumes(&entry.consumes);
                }
                for filter in &filters {
                    builder = builder.filter(filter.clone());
                }
                for parameter in &entry.parameters {
                    builder = builder.parameter(parameter.clone());
                }
                if let Some(kind) = entry.returns {
                    builder = builder.returns(kind);
                }
                builder
            };

            let mut primary = builder();
            if !entry.methods.is_empty() {
                primary = primary.http_methods(&entry.methods);
            }
            if let Some(route) = &entry.attribute_route {
                primary = primary.attribute_route(route.clone());
            }
            descriptors.push(primary.build());

            if entry.default_action {
                if entry.attribute_route.is_some() {
                    errors.push(format!(
                        "The action '{}' cannot be both attribute routed and the default action.",
                        display_name
                    ));
                    continue;
                }
                descriptors.push(
                    builder()
                        .no_action_value()
                        .http_methods(DEFAULT_ACTION_METHODS)
                        .display_name(format!("{} (default)", display_name))
                        .build(),
                );
            }
        }

        if !errors.is_empty() {
            if let Err(DescriptorError::Invalid(more)) = validate_descriptors(&descriptors) {
                errors.extend(more);
            }
            return Err(DescriptorError::Invalid(errors));
        }

        let descriptors = finalize(descriptors)?;
        tracing::info!(
            entries = table.actions.len(),
            actions = descriptors.len(),
            "Built action table"
        );
        Ok(descriptors)
    }

    fn resolve_handler(&self, entry: &ActionEntryConfig, display_name: &str, errors: &mut Vec<String>) -> Option<ActionMethod> {
        if let Some(method) = self.handlers.get(&entry.handler) {
            return Some(method.clone());
        }
        if self.permissive {
            return Some(placeholder_handler(&entry.handler, entry.returns));
        }
        errors.push(format!(
            "The action '{}' references the unknown handler '{}'.",
            display_name, entry.handler
        ));
        None
    }

    fn resolve_filters(&self, refs: &[FilterRefConfig], owner: &str, errors: &mut Vec<String>) -> Vec<FilterDescriptor> {
        refs.iter()
            .filter_map(|r| {
                let source = match self.filters.get(&r.name) {
                    Some(source) => source.clone(),
                    None if self.permissive => FilterSource::Instance(Filter::new(r.name.as_str())),
                    None => {
                        errors.push(format!("The filter '{}' used by {} is not registered.", r.name, owner));
                        return None;
                    }
                };
                Some(FilterDescriptor {
                    source,
                    scope: r.scope,
                    order: r.order,
                })
            })
            .collect()
    }

    fn resolve_constraints(
        &self,
        entry: &ActionEntryConfig,
        display_name: &str,
        errors: &mut Vec<String>,
    ) -> Vec<ActionConstraintMetadata> {
        entry
            .constraints
            .iter()
            .filter_map(|name| match self.constraints.get(name) {
                Some(constraint) => Some(constraint.clone()),
                None if self.permissive => {
                    tracing::warn!(constraint = %name, action = %display_name, "Ignoring unregistered constraint");
                    None
                }
                None => {
                    errors.push(format!(
                        "The constraint '{}' used by action '{}' is not registered.",
                        name, display_name
                    ));
                    None
                }
            })
            .collect()
    }
}

fn placeholder_handler(name: &str, returns: Option<ReturnKind>) -> ActionMethod {
    let body = json!({ "handler": name });
    match returns {
        Some(ReturnKind::Future) => ActionMethod::from_async(move |_| -> ActionFuture {
            let body = body.clone();
            Box::pin(async move { Ok(ActionReturn::Value(body)) })
        }),
        _ => ActionMethod::sync(move |_| Ok(ActionReturn::Value(body.clone()))),
    }
}

/// Routes controller creation to the factory registered for the action's
/// controller; actions of other controllers get none.
struct ControllerMap {
    factories: HashMap<String, Arc<dyn ControllerFactory>>,
}

impl ControllerMap {
    fn factory_for(&self, context: &ActionContext) -> Option<&Arc<dyn ControllerFactory>> {
        self.factories
            .get(&context.descriptor().controller_name.to_lowercase())
    }
}

impl ControllerFactory for ControllerMap {
    fn create_controller(&self, context: &ActionContext) -> InvokeResult<Option<ControllerInstance>> {
        match self.factory_for(context) {
            Some(factory) => factory.create_controller(context),
            None => Ok(None),
        }
    }

    fn release_controller(&self, context: &ActionContext, controller: ControllerInstance) {
        if let Some(factory) = self.factory_for(context) {
            factory.release_controller(context, controller);
        }
    }
}
