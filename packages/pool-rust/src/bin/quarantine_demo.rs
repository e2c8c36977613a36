//! Runs every sub-operation of one configured operation and prints the joined
//! results as JSON.
//!
//! ```text
//! quarantine-demo --config-dir packages/pool-rust/demos/config --operation operation2
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use quarantine_core::{OperationCatalog, TaskInput, TaskResult, Value, DEFAULT_MANIFEST};
use quarantine_pool::telemetry::init_tracing;
use quarantine_pool::{FanOutEngine, HandlerRegistry, PoolRegistry};
use tracing::info;

/// Fan-out/fan-in demo over per-operation worker pools.
#[derive(Parser, Debug)]
#[command(name = "quarantine-demo", about = "Run an operation's sub-operations on its isolated pool")]
struct Args {
    /// Directory holding the manifest and per-operation property files
    #[arg(long, env = "QUARANTINE_CONFIG_DIR", default_value = "packages/pool-rust/demos/config")]
    config_dir: PathBuf,

    /// Manifest file name inside the config directory
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    manifest: String,

    /// Operation to run
    #[arg(long, default_value = "operation2")]
    operation: String,

    /// List items passed to every sub-operation; integers are sent as numbers
    #[arg(long = "value", default_values = ["a", "b", "1"])]
    values: Vec<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn register_sample_handlers(handlers: &HandlerRegistry) {
    // Concatenates the list input.
    handlers.register_fn("Operation1.sub1", |input: &TaskInput| {
        let joined: String = input
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(ToString::to_string)
            .collect();
        TaskResult::succeeded(joined)
    });
    handlers.register_fn("Operation1.sub2", |_: &TaskInput| TaskResult::failed("timeout"));
}

fn parse_value(raw: &str) -> Value {
    raw.parse::<i64>().map_or_else(|_| Value::from(raw), Value::from)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs)?;

    let catalog = OperationCatalog::load_dir(&args.config_dir, &args.manifest)
        .with_context(|| format!("loading configuration from {}", args.config_dir.display()))?;
    let pools = Arc::new(PoolRegistry::with_catalog(catalog));
    let handlers = Arc::new(HandlerRegistry::new());
    register_sample_handlers(&handlers);
    let engine = FanOutEngine::new(Arc::clone(&pools), handlers);

    let routes = pools.resolve(&args.operation)?.routes().len();
    let item = TaskInput::list(args.values.iter().map(|v| parse_value(v)).collect::<Vec<_>>());
    let inputs = vec![item; routes];

    info!(operation = %args.operation, sub_operations = routes, "running operation");
    let results = engine.run_all_sub_operations(&args.operation, inputs)?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    pools.shutdown_all(Duration::from_secs(5));
    Ok(())
}
