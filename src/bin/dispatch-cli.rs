use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use action_dispatch::config::loader::load_action_table;
use action_dispatch::descriptor::registry::HandlerRegistry;
use action_dispatch::descriptor::store::ActionDescriptorStore;
use action_dispatch::dispatch::builtins::register_builtins;
use action_dispatch::routing::{ActionSelector, RequestData, RouteContext, RouteData, RouteValues};
use axum::http::{header, HeaderValue, Method};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "dispatch-cli")]
#[command(about = "Offline inspection of action tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an action table and list its actions
    Validate {
        table: PathBuf,
    },
    /// Run action selection for a set of route values
    Select {
        table: PathBuf,

        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Route value as key=value; repeatable
        #[arg(short = 'v', long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,

        /// Request content type, for consumes constraints
        #[arg(long)]
        content_type: Option<String>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new().permissive();
    register_builtins(&mut registry);
    registry
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Validate { table } => {
            let config = load_action_table(&table)?;
            let descriptors = registry().build(&config)?;
            for descriptor in &descriptors {
                let methods: Vec<&str> = descriptor
                    .method_constraints
                    .iter()
                    .flat_map(|c| c.methods().iter().map(String::as_str))
                    .collect();
                println!(
                    "{}",
                    json!({
                        "display_name": descriptor.display_name,
                        "handler": descriptor.handler,
                        "route_group": descriptor.route_group(),
                        "methods": methods,
                    })
                );
            }
            eprintln!("{} actions OK", descriptors.len());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Select {
            table,
            method,
            values,
            content_type,
        } => {
            let config = load_action_table(&table)?;
            let store = Arc::new(ActionDescriptorStore::new(registry().build(&config)?));
            let selector = ActionSelector::new(store);

            let mut request = RequestData::new(Method::from_bytes(method.to_uppercase().as_bytes())?, "/");
            if let Some(content_type) = content_type {
                request
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
            }
            let values: RouteValues = values.into_iter().collect();
            let context = RouteContext::new(request, RouteData::new(values));

            match selector.select(&context)? {
                Some(action) => {
                    println!("{}", json!({ "selected": action.display_name, "id": action.id.to_string() }));
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    println!("{}", json!({ "selected": null }));
                    Ok(ExitCode::from(2))
                }
            }
        }
    }
}
