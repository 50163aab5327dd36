//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RouteContext (route values, method, request)
//!     → decision_tree.rs (candidate index per snapshot version)
//!     → matcher.rs (route constraints, catch-all precedence, HTTP method)
//!     → constraints.rs (ordered action constraints)
//!     → selector.rs (one action, none, or ambiguity)
//! ```
//!
//! # Design Decisions
//! - Descriptor snapshots are immutable; the index is rebuilt, never patched
//! - The index returns exactly what a full scan would
//! - Deterministic: same snapshot and values always select the same action

pub mod constraints;
pub mod decision_tree;
pub mod matcher;
pub mod selector;
pub mod values;

pub use constraints::{ActionConstraint, ActionConstraintContext, ActionConstraintFactory, HttpMethodConstraint};
pub use selector::{ActionSelector, SelectionError};
pub use values::{RequestAborted, RequestData, RouteContext, RouteData, RouteValues, UrlGenerationContext};
