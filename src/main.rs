//! SEO Pipeline command line client
//!
//! Runs analysis stages against the backend, watches background jobs, and
//! resumes stages interrupted by an authorization redirect.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use seo_pipeline_client::commands;
use seo_pipeline_client::services::auth::{
    AuthRedirector, RecordingRedirector, SystemBrowserRedirector,
};
use seo_pipeline_client::storage::config::ConfigService;
use seo_pipeline_client::ClientState;
use seo_pipeline_core::StageUpdate;

#[derive(Parser)]
#[command(name = "seo-pipeline")]
#[command(about = "Run and track SEO content-analysis stages")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.seo-pipeline/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Open authorization pages in the system browser instead of only
    /// printing them
    #[arg(long)]
    open_browser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one stage and print its progress and outcome
    Invoke {
        /// Stage name or slug, e.g. `parsing` or `lsi-analysis`
        stage: String,

        /// Stage parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// Show jobs running on the backend
    Tasks {
        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Run the stage left pending by an authorization redirect
    Resume,

    /// Check configuration and backend reachability
    Health,

    /// Print the effective configuration
    Config,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_service = match &cli.config {
        Some(path) => ConfigService::open(path.clone()),
        None => ConfigService::new(),
    }
    .context("Failed to load configuration")?;
    let config = config_service
        .effective_config()
        .context("Invalid configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level)?;

    if let Commands::Config = cli.command {
        return print_json(&commands::get_effective_settings(&config_service));
    }

    let redirector: Arc<dyn AuthRedirector> = if cli.open_browser {
        Arc::new(SystemBrowserRedirector)
    } else {
        Arc::new(RecordingRedirector::new())
    };
    let state = ClientState::from_config(config, redirector)
        .context("Failed to initialize client")?;

    match cli.command {
        Commands::Invoke { stage, params } => {
            let printer = spawn_update_printer(&state);
            resume_on_load(&state).await;
            let response = commands::invoke_stage(&state, &stage, &params).await;
            printer.abort();
            print_json(&response)?;
        }
        Commands::Tasks { watch: false } => {
            print_json(&commands::get_running_tasks(&state).await)?;
        }
        Commands::Tasks { watch: true } => {
            let printer = spawn_update_printer(&state);
            resume_on_load(&state).await;
            printer.abort();
            watch_tasks(&state).await?;
        }
        Commands::Resume => {
            let printer = spawn_update_printer(&state);
            let response = commands::resume_pending(&state).await;
            printer.abort();
            print_json(&response)?;
        }
        Commands::Health => {
            print_json(&commands::get_health(&state).await)?;
        }
        Commands::Config => {}
    }

    state.shutdown();
    Ok(())
}

/// Re-run a stage interrupted by an authorization redirect in an earlier
/// session before doing anything else
async fn resume_on_load(state: &ClientState) {
    if let Some((stage, outcome)) = state.resume_on_load().await {
        match outcome.error_message() {
            Some(message) => eprintln!("[{}] resume failed: {}", stage, message),
            None => eprintln!("[{}] resumed after authorization", stage),
        }
    }
}

/// Print stage updates to stderr while a command runs
fn spawn_update_printer(state: &ClientState) -> tokio::task::JoinHandle<()> {
    let mut updates = state.orchestrator().subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(StageUpdate::Progress { stage, percent }) => {
                    eprintln!("[{}] {}%", stage, percent);
                }
                Ok(StageUpdate::AuthorizationRequired { stage, auth_url }) => {
                    eprintln!("[{}] authorization required: {}", stage, auth_url);
                }
                Ok(StageUpdate::Error {
                    stage,
                    message: Some(message),
                }) => {
                    eprintln!("[{}] error: {}", stage, message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn watch_tasks(state: &ClientState) -> Result<()> {
    let mut jobs = state.poller().subscribe();
    state.poller().start();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = jobs.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = jobs.borrow_and_update().clone();
                print_json(&snapshot)?;
            }
        }
    }
    state.poller().stop();
    Ok(())
}
