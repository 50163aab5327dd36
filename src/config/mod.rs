//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (validated, immutable)
//!
//! actions.toml
//!     → loader.rs + validation.rs
//!     → HandlerRegistry::build (names → code, table validation)
//!     → ActionDescriptorStore::publish
//!
//! On change:
//!     watcher.rs detects change
//!     → rebuilds the table
//!     → new snapshot, or the current one stays on failure
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{ActionTableConfig, DispatchConfig, ObservabilityConfig, PipelineConfig};
