use anyhow::Result;
use appconfig_sync::provider::DirectoryProvider;
use appconfig_sync::{EngineOptions, SyncEngine, SyncEvent};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "appconfig-sync")]
#[command(about = "Keep a local cache of remotely managed application configuration", long_about = None)]
struct Args {
    #[arg(
        short = 'r',
        long,
        env = "APPCONFIG_ROOT",
        default_value = ".",
        help = "Directory holding one sub-directory of profile files per application"
    )]
    root: PathBuf,

    #[arg(short = 'a', long, env = "APPCONFIG_APPLICATION_ID")]
    application_id: String,

    #[arg(short = 'e', long, env = "APPCONFIG_ENVIRONMENT_ID")]
    environment_id: String,

    #[arg(
        short = 'p',
        long,
        env = "APPCONFIG_KEY_PREFIX",
        help = "Only track profiles whose name starts with this prefix"
    )]
    key_prefix: Option<String>,

    #[arg(long, env = "APPCONFIG_POLL_INTERVAL_SECS", default_value_t = 30)]
    poll_interval_secs: u64,

    #[arg(long, env = "APPCONFIG_DISCOVERY_INTERVAL_SECS", default_value_t = 60)]
    discovery_interval_secs: u64,

    #[arg(long, help = "Drop cached values of deleted profiles")]
    purge_on_delete: bool,

    #[arg(long, help = "Print the full cache as JSON whenever it changes")]
    dump: bool,

    #[arg(long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(
        long,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    tracing::info!("Starting {} v{}", appconfig_sync::PKG_NAME, appconfig_sync::VERSION);
    tracing::info!("Serving profiles from {}", args.root.display());

    let options = EngineOptions {
        application_id: args.application_id.clone(),
        environment_id: args.environment_id.clone(),
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        discovery_interval: Duration::from_secs(args.discovery_interval_secs),
        key_prefix: args.key_prefix.clone(),
        purge_on_delete: args.purge_on_delete,
        ..Default::default()
    };

    let provider = Arc::new(DirectoryProvider::new(&args.root));
    let engine = Arc::new(SyncEngine::new(options, provider)?);

    let mut events = engine.subscribe();
    let dump = args.dump;
    let reporter = {
        let engine = engine.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SyncEvent::Ready { profile_names }) => {
                        tracing::info!("Ready: {}", profile_names.join(", "));
                        if dump {
                            print_snapshot(&engine);
                        }
                    }
                    Ok(SyncEvent::Update { profile_name, .. }) => {
                        let version = engine
                            .cache()
                            .entry(&profile_name)
                            .and_then(|entry| entry.version);
                        match version {
                            Some(version) => {
                                tracing::info!("Updated: {} (version {})", profile_name, version)
                            }
                            None => tracing::info!("Updated: {}", profile_name),
                        }
                        if dump {
                            print_snapshot(&engine);
                        }
                    }
                    Ok(SyncEvent::Error { scope, message }) => {
                        tracing::warn!("[{}] {}", scope, message);
                    }
                    Ok(SyncEvent::ProfileDeleted { profile_name }) => {
                        tracing::warn!("Deleted: {}", profile_name);
                    }
                    Ok(SyncEvent::Debug { message }) => {
                        tracing::debug!("{}", message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event reporter lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    engine.close();
    reporter.abort();

    Ok(())
}

fn print_snapshot(engine: &SyncEngine) {
    match engine
        .snapshot_json()
        .and_then(|v| Ok(serde_json::to_string_pretty(&v)?))
    {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Failed to serialize cache: {}", e),
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let fmt_layer = if args.json_logs {
        fmt::layer()
            .json()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
