// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Slot booking server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backend_lib::{
    config::{Settings, StorageKind},
    router::create_router,
    seed::seed_if_empty,
    storage::{FlatFileStorage, MemoryStorage, Storage},
    telemetry::init_tracing,
    AppState,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "slotbook-server", about = "Expert slot booking server")]
struct Args {
    /// TOML config file (defaults to ./slotbook.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Seed the demo directory into an empty store
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading configuration")?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    if args.seed {
        settings.seed_demo_data = true;
    }

    init_tracing(&settings);

    match settings.storage {
        StorageKind::Memory => run(MemoryStorage::new(), settings).await,
        StorageKind::File => {
            let storage = FlatFileStorage::open(&settings.data_dir)
                .await
                .with_context(|| format!("opening store at {}", settings.data_dir.display()))?;
            run(storage, settings).await
        },
    }
}

async fn run<S: Storage + 'static>(storage: S, settings: Settings) -> anyhow::Result<()> {
    if settings.seed_demo_data {
        let today = chrono::Local::now().date_naive();
        seed_if_empty(&storage, today, settings.seed_days)
            .await
            .context("seeding demo data")?;
    }

    let addr = settings.bind_addr;
    let state = Arc::new(AppState::new(storage, settings));
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
