//! dockgeac daemon entry point.
//!
//! Wires the CLI driver, lock store, runtime adapter, stack engine and
//! observer together, then waits for shutdown. The socket transport that
//! feeds the API facade is attached by the serving layer.

use clap::Parser;
use dockgeac_core::{
    paths, AppleContainerAdapter, ContainerCli, LockStore, Observer, RuntimeAdapter, Settings,
    StackEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod api;

#[derive(Parser, Debug)]
#[command(name = "dockgeacd", about = "Stack manager daemon for Apple's container CLI")]
struct Args {
    /// Data directory (lock files, settings). Defaults to the standard location.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Stacks directory. Defaults to `<data-dir>/stacks`.
    #[arg(long)]
    stacks_dir: Option<PathBuf>,

    /// Runtime poll interval in seconds.
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// Endpoint identifier reported to clients.
    #[arg(long, default_value = "localhost")]
    endpoint: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(paths::data_dir);
    let stacks_dir = args.stacks_dir.unwrap_or_else(|| data_dir.join("stacks"));

    info!(data_dir = %data_dir.display(), stacks_dir = %stacks_dir.display(), "dockgeac daemon starting");

    std::fs::create_dir_all(&stacks_dir)?;

    let runner = Arc::new(ContainerCli::new());
    let locks = Arc::new(LockStore::new(data_dir.join("locks")));
    let adapter: Arc<dyn RuntimeAdapter> =
        Arc::new(AppleContainerAdapter::new(runner, locks.clone()));

    if adapter.available().await {
        match adapter.version().await {
            Ok(version) => info!(runtime = adapter.name(), %version, "Runtime available"),
            Err(e) => warn!(error = %e, "Runtime available but version probe failed"),
        }
    } else {
        warn!("Runtime not available; stack operations will fail until it is");
    }

    let settings = Settings::load(&data_dir.join("settings.json")).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load settings; using defaults");
        Settings::default()
    });

    let engine =
        Arc::new(StackEngine::new(stacks_dir, adapter.clone(), locks, settings));
    let _facade = Arc::new(api::Facade::new(engine, adapter.clone(), args.endpoint));

    let observer = Observer::new(adapter, Duration::from_secs(args.poll_interval));
    observer.start().await;

    info!("dockgeac daemon ready");
    tokio::signal::ctrl_c().await?;

    info!("Received shutdown signal");
    observer.stop().await;
    Ok(())
}
