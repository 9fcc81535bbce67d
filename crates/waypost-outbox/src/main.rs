//! Waypost binary entry point.
//!
//! Usage: waypost --device-id <id> [--endpoint <url>] [--input <file>]
//!
//! Reads fixes as JSON lines (stdin by default), queues them in the local
//! outbox and delivers them to the collector until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use waypost_core::{init_logging, Config, CoreError, Paths};
use waypost_database::AsyncDatabase;
use waypost_outbox::{
    Collaborators, ControllerConfig, DeliveryController, FixInput, JsonLinesFixSource,
    ManualReachability, OsmAndTransport, OutboxResult, ReachabilityMonitor, SideChannelNotifier,
    SqliteFixQueue, TcpProbeMonitor, TracingReporter, WebhookNotifier,
};

/// Waypost: store-and-forward delivery of location fixes.
#[derive(Parser, Debug)]
#[command(name = "waypost")]
#[command(about = "Store-and-forward delivery of location fixes")]
struct Args {
    /// Configuration file. Defaults to ~/.waypost/config.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collector endpoint.
    #[arg(long, env = "WAYPOST_ENDPOINT")]
    endpoint: Option<String>,

    /// Device ID stamped on every fix.
    #[arg(long, env = "WAYPOST_DEVICE_ID")]
    device_id: Option<String>,

    /// Send fixes once without queueing them.
    #[arg(long)]
    no_buffer: bool,

    /// Read fixes from this file instead of stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Outbox database. Defaults to ~/.waypost/waypost.sqlite.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Treat the collector as always reachable instead of probing it.
    #[arg(long)]
    always_online: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WAYPOST_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Use `explicit` when given, otherwise the default location under the home
/// directory. Fails only when the default is needed and there is no home.
fn resolve_path(
    explicit: Option<&PathBuf>,
    paths: Option<&Paths>,
    default: fn(&Paths) -> PathBuf,
) -> OutboxResult<PathBuf> {
    match (explicit, paths) {
        (Some(path), _) => Ok(path.clone()),
        (None, Some(paths)) => Ok(default(paths)),
        (None, None) => {
            let e = CoreError::Path("Could not determine home directory".to_string());
            Err(e.into())
        }
    }
}

fn load_config(args: &Args, paths: Option<&Paths>) -> OutboxResult<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&resolve_path(None, paths, Paths::config_file)?)?,
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(device_id) = &args.device_id {
        config.device_id = device_id.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.log_level = log_level.clone();
    }
    if args.no_buffer {
        config.buffer = false;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> OutboxResult<()> {
    let args = Args::parse();
    let paths = Paths::new().ok();
    let config = load_config(&args, paths.as_ref())?;

    // Without a home directory the log file falls back to the working directory.
    init_logging(&config.log_level, paths.as_ref().map(Paths::log_file));
    info!("Waypost starting...");

    let controller_config = ControllerConfig::from_config(&config)?;

    let db_path = resolve_path(args.database.as_ref(), paths.as_ref(), Paths::database_file)?;
    let db = AsyncDatabase::open(&db_path).await?;
    let queue = SqliteFixQueue::new(db.clone());
    info!(
        database = %db_path.display(),
        pending = queue.pending_count().await?,
        "Outbox opened"
    );

    let reachability: Arc<dyn ReachabilityMonitor> = if args.always_online {
        Arc::new(ManualReachability::new(true))
    } else {
        let monitor =
            TcpProbeMonitor::for_endpoint(&controller_config.endpoint, config.probe_interval())?;
        monitor.refresh().await;
        Arc::new(monitor)
    };

    let input = match &args.input {
        Some(path) => FixInput::File(path.clone()),
        None => FixInput::Stdin,
    };

    let notifier: Option<Arc<dyn SideChannelNotifier>> =
        if controller_config.side_channel_destination.is_some() {
            Some(Arc::new(WebhookNotifier::new(config.request_timeout())?))
        } else {
            None
        };

    let collaborators = Collaborators {
        queue: Arc::new(queue),
        transport: Arc::new(OsmAndTransport::new(config.request_timeout())?),
        reachability,
        source: Arc::new(JsonLinesFixSource::new(input, config.device_id.clone())),
        notifier,
        reporter: Arc::new(TracingReporter),
    };

    info!(
        endpoint = %controller_config.endpoint,
        device_id = %controller_config.device_id,
        buffer = controller_config.buffer,
        "Configuration loaded"
    );

    let (handle, task) = DeliveryController::spawn(controller_config, collaborators);
    handle.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, exiting...");

    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "Controller did not shut down cleanly");
    }
    if let Err(e) = task.await {
        error!(error = %e, "Controller task failed");
    }
    db.close().await?;

    Ok(())
}
