use zoom_pyramid::implement::service::notifier::BroadcastNotifier;
use zoom_pyramid::implement::storage::state::SqliteSessionFactory;
use zoom_pyramid::interface::session::SessionFactory;
use zoom_pyramid::schema::pyramid::config::{self, PyramidConfig};
use zoom_pyramid::schema::pyramid::error::RebuildError;
use zoom_pyramid::service::scheduler::ReconcileScheduler;
use zoom_pyramid::use_case::wavefront::WavefrontRebuilder;

use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::signal;
use tokio::task;
use tokio_util::sync::CancellationToken;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::result::Result;
use std::sync::Arc;


#[derive(Parser)]
#[command(name = "zoomd", version, about = "Keeps zoom tile pyramids in step with their base tiles")]
struct Cli {
    /// INI configuration file. Built-in defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Reconcile zoom tiles on a timer until interrupted.
    Run,
    /// Rebuild every pyramid from the legacy grid layout once and exit.
    RebuildAll,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => PyramidConfig::new(),
    };
    fs::create_dir_all(&config.storage.grid_storage)?;
    if let Some(directory) = config.storage.database.parent() {
        if !directory.as_os_str().is_empty() {
            fs::create_dir_all(directory)?;
        }
    }
    let factory = Arc::new(SqliteSessionFactory::new(&config.storage.database, BroadcastNotifier::default()));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let shutdown = CancellationToken::new();
            let scheduler = ReconcileScheduler::new(&config.rebuild, &config.storage.grid_storage, factory);
            let interrupt = shutdown.clone();
            tokio::spawn(async move {
                match signal::ctrl_c().await {
                    Ok(()) => info!("zoomd - shutdown requested"),
                    Err(why) => error!("zoomd - could not listen for Ctrl-C: {}", why),
                }
                interrupt.cancel();
            });
            scheduler.run(shutdown).await;
        },
        Command::RebuildAll => {
            let storage_root = config.storage.grid_storage.clone();
            task::spawn_blocking(move || -> Result<(), RebuildError> {
                let session = factory.open_session()?;
                WavefrontRebuilder::new(session.context()).rebuild_all(&storage_root)
            }).await??;
            info!("zoomd - full rebuild finished");
        },
    }
    return Ok(());
}
