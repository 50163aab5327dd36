//! Action table watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_descriptors, ConfigError};
use crate::descriptor::registry::HandlerRegistry;
use crate::descriptor::store::ActionDescriptorStore;
use crate::descriptor::types::ActionDescriptor;

/// Monitors the action table file and resolves it on every change.
pub struct ActionTableWatcher {
    path: PathBuf,
    registry: Arc<HandlerRegistry>,
    update_tx: mpsc::UnboundedSender<Vec<ActionDescriptor>>,
}

impl ActionTableWatcher {
    /// Returns the watcher and a receiver for rebuilt tables.
    pub fn new(path: &Path, registry: Arc<HandlerRegistry>) -> (Self, mpsc::UnboundedReceiver<Vec<ActionDescriptor>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                registry,
                update_tx,
            },
            update_rx,
        )
    }

    /// Starts watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let registry = Arc::clone(&self.registry);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Action table change detected, reloading");
                        match load_descriptors(&path, &registry) {
                            Ok(descriptors) => {
                                let _ = tx.send(descriptors);
                            }
                            Err(e) => {
                                tracing::error!("Failed to reload action table: {}. Keeping current table.", e);
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Action table watcher started");
        Ok(watcher)
    }
}

/// Reloads the table into the store. On failure the store is untouched.
pub fn reload_table(path: &Path, registry: &HandlerRegistry, store: &ActionDescriptorStore) -> Result<u64, ConfigError> {
    let descriptors = load_descriptors(path, registry)?;
    Ok(store.publish(descriptors))
}

/// Publishes every table received from a watcher until the channel closes.
pub async fn publish_updates(
    mut updates: mpsc::UnboundedReceiver<Vec<ActionDescriptor>>,
    store: Arc<ActionDescriptorStore>,
) {
    while let Some(descriptors) = updates.recv().await {
        store.publish(descriptors);
    }
    tracing::debug!("Action table update channel closed");
}
