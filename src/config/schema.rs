//! Configuration schema definitions.
//!
//! This module defines the host configuration and the action table format.
//! All types derive Serde traits for deserialization from TOML files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::types::{AttributeRouteInfo, ParameterDescriptor};
use crate::pipeline::action::ReturnKind;
use crate::pipeline::context::DEFAULT_MAX_MODEL_ERRORS;
use crate::pipeline::filters::FilterScope;

/// Root configuration for the dispatch host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Filter pipeline options.
    pub pipeline: PipelineConfig,

    /// Conventional routes, tried in order.
    pub routes: Vec<ConventionalRouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Where the action table comes from.
    pub actions: ActionSourceConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            pipeline: PipelineConfig::default(),
            routes: vec![ConventionalRouteConfig::default_route()],
            observability: ObservabilityConfig::default(),
            actions: ActionSourceConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body read into memory.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,

    /// Time allowed for in-flight requests after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Options applied to every action invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model-state errors recorded before the "too many errors" entry.
    pub max_model_validation_errors: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_model_validation_errors: DEFAULT_MAX_MODEL_ERRORS,
        }
    }
}

/// A conventional route: path segments map positionally onto `keys`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConventionalRouteConfig {
    /// Router name recorded in the route data.
    pub name: String,

    /// Literal path prefix (e.g., "api") stripped before mapping.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Route keys in segment order.
    pub keys: Vec<String>,

    /// Values used when a segment is missing.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl ConventionalRouteConfig {
    /// `{controller=Home}/{action=Index}/{id?}`.
    pub fn default_route() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert("controller".to_string(), "Home".to_string());
        defaults.insert("action".to_string(), "Index".to_string());
        Self {
            name: "default".to_string(),
            prefix: None,
            keys: vec!["controller".to_string(), "action".to_string(), "id".to_string()],
            defaults,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter (e.g., "info", "action_dispatch=debug").
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Prometheus listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Action table location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionSourceConfig {
    /// Path to the action table TOML; built-in actions only when unset.
    pub table_path: Option<String>,

    /// Reload the table when the file changes.
    pub watch: bool,
}

/// An action table file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionTableConfig {
    pub actions: Vec<ActionEntryConfig>,

    /// Filters applied to every action at global scope.
    pub global_filters: Vec<FilterRefConfig>,
}

/// One action in the table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionEntryConfig {
    pub controller: String,
    pub action: String,

    /// Registered handler name.
    pub handler: String,

    #[serde(default)]
    pub area: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Accepted HTTP methods; empty accepts any.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Extra route constraints: `"*"` is a catch-all, `""` denies the key.
    #[serde(default)]
    pub route_values: BTreeMap<String, String>,

    /// Registered action constraint names.
    #[serde(default)]
    pub constraints: Vec<String>,

    /// Accepted request content types.
    #[serde(default)]
    pub consumes: Vec<String>,

    #[serde(default)]
    pub filters: Vec<FilterRefConfig>,

    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,

    #[serde(default)]
    pub attribute_route: Option<AttributeRouteInfo>,

    /// Declared return shape; inferred from the handler when unset.
    #[serde(default)]
    pub returns: Option<ReturnKind>,

    /// Also register the action reached without an `action` route value.
    #[serde(default)]
    pub default_action: bool,
}

/// Reference to a registered filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterRefConfig {
    pub name: String,

    #[serde(default)]
    pub scope: FilterScope,

    #[serde(default)]
    pub order: i32,
}
