//! # MediNotify: notification scheduling server
//!
//! Usage:
//!   medinotify                         # Start with ~/.medinotify/config.toml (or defaults)
//!   medinotify --config ./medi.toml    # Explicit config file
//!   medinotify --port 8080 --verbose   # Override port, debug logging
//!   medinotify --init-config           # Write a default config file and exit

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use medinotify_core::config::MediNotifyConfig;
use medinotify_gateway::AppState;
use medinotify_scheduler::{
    DispatchPolicy, DispatchWorker, JobDispatcher, MemoryQueue, NotificationService, Retention,
    SqliteNotificationStore, spawn_workers,
};

#[derive(Parser)]
#[command(
    name = "medinotify",
    version,
    about = "🏥 MediNotify: notification scheduling and delivery engine"
)]
struct Cli {
    /// Config file (default: $MEDINOTIFY_CONFIG, then ~/.medinotify/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address (overrides [gateway] host)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides [gateway] port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Dispatch workers (overrides [queue] workers)
    #[arg(long)]
    workers: Option<usize>,

    /// Write a default config file to the config path and exit
    #[arg(long)]
    init_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON log lines
    #[arg(long)]
    log_json: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(|| std::env::var("MEDINOTIFY_CONFIG").ok())
        .map(|p| PathBuf::from(expand_path(&p)))
        .unwrap_or_else(MediNotifyConfig::default_path)
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "medinotify=debug,medinotify_scheduler=debug,medinotify_channels=debug,medinotify_gateway=debug,tower_http=debug"
    } else {
        "medinotify=info,medinotify_scheduler=info,medinotify_channels=info,medinotify_gateway=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let path = config_path(&cli);
    if cli.init_config {
        if path.exists() {
            println!("⚠️  Config already exists: {}", path.display());
        } else {
            MediNotifyConfig::default().save_to(&path)?;
            println!("✅ Default config written to {}", path.display());
        }
        return Ok(());
    }

    let mut config = if path.exists() {
        tracing::info!("📄 Loading config from {}", path.display());
        MediNotifyConfig::load_from(&path)?
    } else {
        tracing::info!("📄 No config at {}, using defaults", path.display());
        MediNotifyConfig::default()
    };
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(workers) = cli.workers {
        config.queue.workers = workers;
    }

    // Record store
    let db_path = expand_path(&config.store.path);
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteNotificationStore::open(Path::new(&db_path))?);
    tracing::info!("🗄️ Notification store: {db_path}");

    // Queue + dispatcher
    let queue = Arc::new(MemoryQueue::new(Retention::from(&config.queue)));
    let dispatcher = JobDispatcher::new(queue, DispatchPolicy::from(&config.queue));
    let transport = medinotify_channels::transport_from_config(&config.transport)?;

    let service = Arc::new(NotificationService::new(
        store.clone(),
        dispatcher.clone(),
        config.schedule.default_unit,
        config.schedule.utc_offset()?,
    ));
    service.recover().await?;

    // Workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Arc::new(DispatchWorker::new(store, dispatcher, transport));
    let handles = spawn_workers(worker, config.queue.workers, shutdown_rx);
    tracing::info!(
        "⏰ {} dispatch worker(s), {} attempt(s) per delivery",
        config.queue.workers.max(1),
        config.queue.max_attempts.max(1)
    );

    // Gateway runs until Ctrl-C
    let state = AppState::new(config.gateway.clone(), service);
    let served = medinotify_gateway::start(state, async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("🛑 Shutdown requested");
    })
    .await;

    shutdown_tx.send(true).ok();
    futures::future::join_all(handles).await;
    served
}
