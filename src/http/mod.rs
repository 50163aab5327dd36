//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → request.rs (conventional route values, request snapshot)
//!     → RouteHandler (selection + pipeline)
//!     → ResponseSink → HTTP response
//! ```

pub mod request;
pub mod server;

pub use request::ConventionalRoutes;
pub use server::HttpServer;
