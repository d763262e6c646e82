use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use tocsin::config::Config;
use tocsin::database::{DatabaseImpl, Store, initialize_database};
use tocsin::monitoring::handlers::{ContainerHandler, HttpHandler, PingHandler, TcpHandler};
use tocsin::notification::WebhookFactory;
use tocsin::pool::open_pool;
use tocsin::retention::{RetentionCleanup, RetentionPolicy};
use tocsin::{ConnectionType, Manager, ManagerError};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file, created with defaults when missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    logger::init(&config.logging.level, config.logging.log_format()?);

    let pool = open_pool(&config.database.path, config.database.pool_size)
        .await
        .with_context(|| format!("failed to open {}", config.database.path.display()))?;
    {
        let conn = pool.get().await.map_err(|e| anyhow!("failed to get database connection: {e}"))?;
        initialize_database(&conn).await?;
    }

    let store: Arc<dyn Store> =
        Arc::new(DatabaseImpl::new_from_pool(pool).with_history_limit(config.database.history_limit));
    let notifiers = WebhookFactory::new(config.notifications.request_timeout(), &config.notifications.user_agent)?;

    let checks = &config.checks;
    let mut builder = Manager::builder(store.clone(), Arc::new(notifiers))
        .span(info_span!("manager"))
        .history_limit(config.database.history_limit)
        .handler(ConnectionType::Http, Arc::new(HttpHandler::new(checks)?))
        .handler(ConnectionType::Tcp, Arc::new(TcpHandler::new(checks.default_timeout())));

    if checks.docker_enabled {
        match ContainerHandler::new(checks.default_timeout()) {
            Ok(handler) => builder = builder.handler(ConnectionType::Container, Arc::new(handler)),
            Err(e) => warn!(error = %e, "Docker client unavailable, container monitors will not run"),
        }
    }

    if checks.ping_enabled {
        match PingHandler::new(checks.default_timeout()) {
            Ok(handler) => builder = builder.handler(ConnectionType::Ping, Arc::new(handler)),
            Err(e) => warn!(error = %e, "ICMP sockets unavailable, ping monitors will not run"),
        }
    }

    let manager = builder.build();
    manager.boot().await?;
    seed_monitors(&manager, &config).await;

    let shutdown = CancellationToken::new();
    if config.retention.check_days > 0 {
        let policy = RetentionPolicy { check_days: config.retention.check_days };
        RetentionCleanup::new(store, policy).start_periodic_cleanup(shutdown.clone());
    }

    info!("tocsin is running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    shutdown.cancel();
    manager.stop().await;
    Ok(())
}

/// Add configured monitors whose name is not taken yet
async fn seed_monitors(manager: &Manager, config: &Config) {
    for spec in &config.monitors {
        let name = spec.name.clone();
        match manager.add_monitor(spec.clone()).await {
            Ok(monitor) => info!(monitor_id = monitor.id, %name, "Seeded monitor from config"),
            Err(ManagerError::DuplicateName(_)) => {}
            Err(e) => error!(%name, error = %e, "Failed to seed monitor"),
        }
    }
}
