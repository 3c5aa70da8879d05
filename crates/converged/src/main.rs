//! converged - declarative host configuration reconciler.
//!
//! Probes host identity once, selects a handler per resource kind, then
//! watches the desired-state document and converges the host on every
//! change.

use anyhow::{Context, Result};
use clap::Parser;
use converge_common::host;
use converged::controller::Controller;
use converged::handlers;
use converged::registry::HandlerRegistry;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "converged", version, about = "Converges local host state toward a desired-state document")]
struct Args {
    /// Path to the desired-state document, or a directory of per-kind
    /// documents.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Treat a required resource kind without a compatible handler as a
    /// fatal startup error instead of a warning.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("converged v{} starting", env!("CARGO_PKG_VERSION"));

    let host = host::probe().context("cannot determine host identity")?;
    info!(
        "host: {} {} ({} {})",
        host.distribution_id, host.distribution_version, host.kernel_name, host.kernel_version
    );

    let mut registry = HandlerRegistry::new();
    handlers::register_all(&mut registry);

    let controller = Controller::new(args.config, &host, &registry, args.strict)
        .context("controller startup failed")?;

    tokio::select! {
        result = controller.run() => result.context("watch loop failed")?,
        _ = tokio::signal::ctrl_c() => info!("shutting down gracefully"),
    }

    Ok(())
}
