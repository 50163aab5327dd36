//! Versioned descriptor snapshots.
//!
//! # Responsibilities
//! - Hold the current action table as an immutable snapshot
//! - Swap in a new table atomically, bumping the version
//!
//! # Design Decisions
//! - Readers load an `Arc` from `ArcSwap` and never lock
//! - Writers serialize on a mutex so versions only grow
//! - A reader keeps its snapshot for the whole request even if a newer one
//!   is published meanwhile

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::descriptor::builder::finalize;
use crate::descriptor::types::{ActionDescriptor, DescriptorError};
use crate::observability::metrics;

/// One immutable action table.
#[derive(Debug)]
pub struct ActionDescriptorCollection {
    pub items: Vec<Arc<ActionDescriptor>>,
    pub version: u64,
}

impl ActionDescriptorCollection {
    pub fn new(items: Vec<ActionDescriptor>, version: u64) -> Self {
        Self {
            items: items.into_iter().map(Arc::new).collect(),
            version,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Source of the current action table.
pub trait ActionDescriptorProvider: Send + Sync {
    fn action_descriptors(&self) -> Arc<ActionDescriptorCollection>;
}

/// Lock-free snapshot holder.
pub struct ActionDescriptorStore {
    current: ArcSwap<ActionDescriptorCollection>,
    publish_lock: Mutex<()>,
}

impl ActionDescriptorStore {
    /// Creates a store whose first snapshot has version 0.
    pub fn new(items: Vec<ActionDescriptor>) -> Self {
        let collection = ActionDescriptorCollection::new(items, 0);
        metrics::record_snapshot_published(collection.version, collection.len());
        Self {
            current: ArcSwap::from_pointee(collection),
            publish_lock: Mutex::new(()),
        }
    }

    /// Replaces the table and returns the new version.
    pub fn publish(&self, items: Vec<ActionDescriptor>) -> u64 {
        let _guard = self.publish_lock.lock();
        let version = self.current.load().version + 1;
        let collection = ActionDescriptorCollection::new(items, version);
        let count = collection.len();
        self.current.store(Arc::new(collection));

        tracing::info!(version, actions = count, "Published action descriptor snapshot");
        metrics::record_snapshot_published(version, count);
        version
    }

    /// Validates `items` first; the current snapshot stays on failure.
    pub fn try_publish(&self, items: Vec<ActionDescriptor>) -> Result<u64, DescriptorError> {
        let items = finalize(items)?;
        Ok(self.publish(items))
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }
}

impl ActionDescriptorProvider for ActionDescriptorStore {
    fn action_descriptors(&self) -> Arc<ActionDescriptorCollection> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::builder::ActionDescriptorBuilder;
    use crate::pipeline::action::{ActionMethod, ActionReturn};

    fn action(controller: &str, action: &str) -> ActionDescriptor {
        ActionDescriptorBuilder::new(controller, action, ActionMethod::sync(|_| Ok(ActionReturn::Void))).build()
    }

    #[test]
    fn test_publish_bumps_version() {
        let store = ActionDescriptorStore::new(vec![action("Home", "Index")]);
        assert_eq!(store.version(), 0);

        let held = store.action_descriptors();
        let version = store.publish(vec![action("Home", "Index"), action("Home", "About")]);

        assert_eq!(version, 1);
        assert_eq!(store.action_descriptors().len(), 2);
        // Earlier readers keep their snapshot.
        assert_eq!(held.len(), 1);
        assert_eq!(held.version, 0);
    }

    #[test]
    fn test_failed_publish_keeps_snapshot() {
        let store = ActionDescriptorStore::new(vec![action("Home", "Index")]);
        let invalid = ActionDescriptorBuilder::new("Home", "Index", ActionMethod::sync(|_| Ok(ActionReturn::Void)))
            .http_methods(Vec::<String>::new())
            .build();

        assert!(store.try_publish(vec![invalid]).is_err());
        assert_eq!(store.version(), 0);
        assert_eq!(store.action_descriptors().len(), 1);
    }

    #[test]
    fn test_concurrent_publishes_never_go_backwards() {
        let store = Arc::new(ActionDescriptorStore::new(Vec::new()));
        let writers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..50 {
                        let version = store.publish(vec![action("Home", "Index")]);
                        assert!(version > last);
                        assert!(store.version() >= version);
                        last = version;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(store.version(), 400);
    }
}
