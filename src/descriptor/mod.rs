//! Action descriptors and the versioned action table.
//!
//! # Data Flow
//! ```text
//! code (ActionDescriptorBuilder) or TOML table (registry.rs)
//!     → builder.rs (validate whole table, route groups)
//!     → store.rs (atomic snapshot swap, version bump)
//!     → routing (reads snapshots lock-free)
//! ```

pub mod builder;
pub mod registry;
pub mod store;
pub mod types;

pub use builder::{finalize, validate_descriptors, ActionDescriptorBuilder};
pub use registry::HandlerRegistry;
pub use store::{ActionDescriptorCollection, ActionDescriptorProvider, ActionDescriptorStore};
pub use types::{
    ActionDescriptor, AttributeRouteInfo, BindingSource, DescriptorError, ParameterDescriptor, RouteConstraint,
    RouteKeyHandling, ROUTE_GROUP_KEY,
};
