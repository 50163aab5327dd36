//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the action table (file or built-in) into a descriptor store
//! - Wire the route handler with binding, controllers and pipeline options
//! - Start background tasks (metrics, table watcher, reload on SIGHUP)
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - In-flight requests get `shutdown_grace_secs` before a forced exit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::loader::{load_descriptors, ConfigError};
use crate::config::schema::{ActionEntryConfig, ActionTableConfig, DispatchConfig, FilterRefConfig};
use crate::config::watcher::{publish_updates, reload_table, ActionTableWatcher};
use crate::descriptor::registry::HandlerRegistry;
use crate::descriptor::store::ActionDescriptorStore;
use crate::dispatch::{ControllerInvokerFactory, RouteHandler};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::metrics;
use crate::pipeline::binding::DefaultBindingContextProvider;
use crate::pipeline::filters::FilterScope;

/// A fully wired host, ready to serve.
pub struct Application {
    pub config: DispatchConfig,
    pub registry: Arc<HandlerRegistry>,
    pub store: Arc<ActionDescriptorStore>,
    pub handler: Arc<RouteHandler>,
}

/// Table served when no `actions.table_path` is configured.
pub fn builtin_table() -> ActionTableConfig {
    let entry = |controller: &str, action: &str, handler: &str| ActionEntryConfig {
        controller: controller.to_string(),
        action: action.to_string(),
        handler: handler.to_string(),
        area: None,
        display_name: None,
        methods: vec!["GET".to_string()],
        route_values: Default::default(),
        constraints: Vec::new(),
        consumes: Vec::new(),
        filters: Vec::new(),
        parameters: Vec::new(),
        attribute_route: None,
        returns: None,
        default_action: false,
    };

    let mut echo = entry("System", "Echo", "system.echo");
    echo.methods = vec!["GET".to_string(), "POST".to_string()];

    ActionTableConfig {
        actions: vec![
            entry("Home", "Index", "system.health"),
            echo,
            entry("System", "Describe", "system.describe"),
        ],
        global_filters: vec![
            FilterRefConfig {
                name: "request_timing".to_string(),
                scope: FilterScope::Global,
                order: 0,
            },
            FilterRefConfig {
                name: "no_store".to_string(),
                scope: FilterScope::Global,
                order: 0,
            },
        ],
    }
}

impl Application {
    /// Resolves the action table and wires the pipeline.
    pub fn build(config: DispatchConfig, registry: HandlerRegistry) -> Result<Self, ConfigError> {
        let descriptors = match &config.actions.table_path {
            Some(path) => load_descriptors(&PathBuf::from(path), &registry)?,
            None => registry.build(&builtin_table())?,
        };
        tracing::info!(
            actions = descriptors.len(),
            source = config.actions.table_path.as_deref().unwrap_or("built-in"),
            "Action table loaded"
        );

        let store = Arc::new(ActionDescriptorStore::new(descriptors));
        let invokers = ControllerInvokerFactory::new(
            Arc::new(DefaultBindingContextProvider::default()),
            registry.controller_factory(),
        );
        let handler = Arc::new(RouteHandler::new(
            store.clone(),
            Arc::new(invokers),
            config.pipeline.clone(),
        ));

        Ok(Self {
            config,
            registry: Arc::new(registry),
            store,
            handler,
        })
    }

    /// Serves until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let observability = &self.config.observability;
        if observability.metrics_enabled {
            match observability.metrics_address.parse() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(_) => tracing::error!(
                    metrics_address = %observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        let shutdown = Arc::new(Shutdown::new());
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        spawn_signal_handler(Arc::clone(&shutdown), reload_tx);

        // Kept alive for the lifetime of the server.
        let mut _watcher = None;
        if let Some(path) = &self.config.actions.table_path {
            let path = PathBuf::from(path);
            spawn_reload_on_signal(reload_rx, path.clone(), Arc::clone(&self.registry), Arc::clone(&self.store));

            if self.config.actions.watch {
                let (watcher, updates) = ActionTableWatcher::new(&path, Arc::clone(&self.registry));
                _watcher = Some(watcher.run()?);
                tokio::spawn(publish_updates(updates, Arc::clone(&self.store)));
            }
        }

        let listener = TcpListener::bind(&self.config.listener.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Listening for connections");

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let server = HttpServer::new(&self.config, Arc::clone(&self.handler));
        let serve = server.run(listener, shutdown.wait());

        let deadline = {
            let signalled = shutdown.wait();
            async move {
                signalled.await;
                tokio::time::sleep(grace).await;
            }
        };

        tokio::select! {
            outcome = serve => outcome?,
            _ = deadline => tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, forcing exit"),
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}

fn spawn_reload_on_signal(
    mut requests: mpsc::UnboundedReceiver<()>,
    path: PathBuf,
    registry: Arc<HandlerRegistry>,
    store: Arc<ActionDescriptorStore>,
) {
    tokio::spawn(async move {
        while requests.recv().await.is_some() {
            match reload_table(&path, &registry, &store) {
                Ok(version) => tracing::info!(version, "Action table reloaded"),
                Err(e) => tracing::error!("Failed to reload action table: {}. Keeping current table.", e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::store::ActionDescriptorProvider;
    use crate::dispatch::builtins::register_builtins;

    #[test]
    fn test_builtin_table_resolves() {
        let mut registry = HandlerRegistry::new();
        register_builtins(&mut registry);

        let app = Application::build(DispatchConfig::default(), registry).unwrap();
        let descriptors = app.store.action_descriptors();
        assert_eq!(descriptors.len(), 3);
        assert!(descriptors.items.iter().all(|d| d.filters.len() == 2));
    }

    #[test]
    fn test_unregistered_builtins_fail_fast() {
        let err = Application::build(DispatchConfig::default(), HandlerRegistry::new()).err().unwrap();
        assert!(matches!(err, ConfigError::Descriptor(_)));
    }
}
