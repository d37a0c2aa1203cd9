use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucketsync::config::Config;
use bucketsync::display::{ConsoleDisplay, DisplaySink};
use bucketsync::sync::{LockManager, SyncEngine, SyncStateTracker, LOCK_FILE};

#[derive(Parser)]
#[command(name = "bucketsync", version, about = "Push a local directory tree to an S3 bucket")]
struct Cli {
    /// Config file (default: ~/.bucketsync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files changed since the last completed sync
    Sync {
        /// Show what would be pushed without uploading
        #[arg(long)]
        dry_run: bool,

        /// Concurrent uploads (overrides sync.jobs)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Show lock and sync state
    Status,
    /// Remove a lock left behind by a crashed run
    Unlock {
        /// Remove the lock even if its owner still appears to be running
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    // Logs go to stderr so stdout stays the display stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let display: Arc<dyn DisplaySink> = Arc::new(ConsoleDisplay);
    match run(cli, display.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            display.display(&format!("Gah! {:#}", err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, display: Arc<dyn DisplaySink>) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;

    match cli.command {
        Command::Sync { dry_run, jobs } => {
            let mut configuration = config.resolve()?.with_dry_run(dry_run);
            if let Some(jobs) = jobs {
                configuration = configuration.with_jobs(jobs);
            }
            let engine = SyncEngine::new(configuration, display);
            engine.run().await?;
        }
        Command::Status => {
            let state_dir = config.state_dir()?;
            let lock = LockManager::new(state_dir.join(LOCK_FILE));
            let state = SyncStateTracker::new(&state_dir);

            match (lock.is_held(), lock.holder()) {
                (false, _) => display.display("No sync is running."),
                (true, Some(holder)) => display.display(&format!(
                    "Locked by pid {} since {}{}",
                    holder.pid,
                    holder.acquired_at,
                    if holder.is_stale() { " (stale: process is gone)" } else { "" }
                )),
                (true, None) => display.display(&format!(
                    "Locked by an unknown run ({})",
                    lock.path().display()
                )),
            }
            match state.last_completed_at()? {
                Some(at) => display.display(&format!("Last completed sync started at {}", at)),
                None => display.display("No completed sync, next run uses checksum comparison."),
            }
            if state.has_unfinished_run()? {
                display.display("The most recent run did not finish.");
            }
        }
        Command::Unlock { force } => {
            let lock = LockManager::new(config.state_dir()?.join(LOCK_FILE));
            if let Some(holder) = lock.holder() {
                if !holder.is_stale() && !force {
                    anyhow::bail!(
                        "pid {} still appears to be running, use --force to remove its lock anyway",
                        holder.pid
                    );
                }
            }
            if lock.force_release()? {
                display.display(&format!("Removed {}", lock.path().display()));
            } else {
                display.display("No lock to remove.");
            }
        }
    }

    Ok(())
}
