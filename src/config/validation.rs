//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check action table entries before handler resolution
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the parsed config

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{ActionTableConfig, DispatchConfig};

/// One semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.pipeline.max_model_validation_errors == 0 {
        errors.push(ValidationError::new(
            "pipeline.max_model_validation_errors",
            "must be greater than 0",
        ));
    }
    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate route name '{}'", route.name)));
        }
        if route.keys.is_empty() {
            errors.push(ValidationError::new(&field, "must map at least one route key"));
        }
        let mut keys = HashSet::new();
        for key in &route.keys {
            if key.trim().is_empty() {
                errors.push(ValidationError::new(&field, "route keys must not be empty"));
            } else if !keys.insert(key.to_lowercase()) {
                errors.push(ValidationError::new(&field, format!("duplicate route key '{}'", key)));
            }
        }
        if route.prefix.as_deref().is_some_and(|p| p.trim_matches('/').is_empty()) {
            errors.push(ValidationError::new(&field, "prefix must not be empty when set"));
        }
    }

    if config.actions.watch && config.actions.table_path.is_none() {
        errors.push(ValidationError::new("actions.watch", "requires actions.table_path"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_action_table(table: &ActionTableConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, entry) in table.actions.iter().enumerate() {
        let field = format!("actions[{}]", i);
        if entry.controller.trim().is_empty() {
            errors.push(ValidationError::new(&field, "controller must not be empty"));
        }
        if entry.action.trim().is_empty() {
            errors.push(ValidationError::new(&field, "action must not be empty"));
        }
        if entry.handler.trim().is_empty() {
            errors.push(ValidationError::new(&field, "handler must not be empty"));
        }
        if entry.methods.iter().any(|m| m.trim().is_empty()) {
            errors.push(ValidationError::new(&field, "HTTP methods must not be empty"));
        }
        let mut parameters = HashSet::new();
        for parameter in &entry.parameters {
            if !parameters.insert(parameter.name.as_str()) {
                errors.push(ValidationError::new(
                    &field,
                    format!("duplicate parameter '{}'", parameter.name),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
