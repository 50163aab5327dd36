//! MVC-style action dispatch: action selection and the filter pipeline.

// Core subsystems
pub mod descriptor;
pub mod dispatch;
pub mod pipeline;
pub mod routing;

// Hosting
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::DispatchConfig;
pub use descriptor::{ActionDescriptor, ActionDescriptorBuilder, ActionDescriptorStore, HandlerRegistry};
pub use dispatch::{DispatchError, RouteHandler};
pub use http::HttpServer;
pub use lifecycle::{Application, Shutdown};
pub use routing::{ActionSelector, RouteContext, RouteData, RouteValues};
