//! action-dispatch host.
//!
//! ```text
//!     HTTP request
//!         → http (request id, trace, timeout, conventional route values)
//!         → dispatch::RouteHandler
//!             → routing (decision tree, HTTP method, action constraints)
//!             → pipeline (authorization, action, exception, result filters)
//!         → ResponseSink → HTTP response
//!
//!     config ─ observability ─ lifecycle (signals, reload, shutdown)
//! ```

use std::path::PathBuf;

use clap::Parser;

use action_dispatch::config::loader::load_config;
use action_dispatch::config::DispatchConfig;
use action_dispatch::descriptor::registry::HandlerRegistry;
use action_dispatch::dispatch::builtins::register_builtins;
use action_dispatch::lifecycle::Application;
use action_dispatch::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "action-dispatch")]
#[command(about = "MVC-style action dispatch host", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };
    init_logging(&config.observability);

    tracing::info!("action-dispatch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    let mut registry = HandlerRegistry::new();
    register_builtins(&mut registry);

    let app = Application::build(config, registry)?;
    app.run().await
}
