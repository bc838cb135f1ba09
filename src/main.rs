use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use warden::adapters::PostgresStore;
use warden::chain::{AdapterRegistry, FileKeyProvider};
use warden::cli::{Cli, Commands};
use warden::config::{AppConfig, LoggingConfig};
use warden::oracle::HermesOracle;
use warden::pipeline::{AmountResolver, Executor, Pipeline};
use warden::policy::{PolicyConfig, PolicyEngine};
use warden::services::{
    HealthServer, HealthState, KillSwitchService, LogChannel, NotificationChannel, Notifier,
    Sweeper, SweeperConfig, WebhookChannel,
};
use warden::workflow::{ApprovalWorkflow, DelayQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config =
        AppConfig::load_from(&cli.config).context("failed to load configuration")?;
    if let Err(problems) = config.validate() {
        for problem in &problems {
            eprintln!("config error: {}", problem);
        }
        anyhow::bail!("invalid configuration ({} problems)", problems.len());
    }

    match cli.command {
        Some(Commands::Migrate) => {
            init_logging_simple();
            let store = open_store(&config).await?;
            store.migrate().await.context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Some(Commands::Status { audit }) => {
            init_logging_simple();
            let store = open_store(&config).await?;
            print_status(&store, audit).await?;
        }
        Some(Commands::Run) | None => {
            init_logging(&config.logging);
            run_daemon(config).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &AppConfig) -> anyhow::Result<PostgresStore> {
    PostgresStore::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to open database")
}

async fn run_daemon(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting warden daemon");

    let store = open_store(&config).await?;
    store.migrate().await.context("failed to run migrations")?;

    // Notification fan-out: structured log always, webhook when configured.
    let mut channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(LogChannel)];
    if let Some(webhook) = WebhookChannel::from_env() {
        channels.push(Box::new(webhook));
    }
    let notifier = Notifier::new(store.clone(), channels);

    let kill_switch = KillSwitchService::new(store.clone(), notifier.clone());
    kill_switch.ensure_initialized().await?;

    // Anything left EXECUTING did not survive the previous process.
    let interrupted = store.fail_interrupted(chrono::Utc::now()).await?;
    if interrupted > 0 {
        warn!(
            "Failed {} transactions interrupted by a previous shutdown",
            interrupted
        );
    }

    // Chain adapters are registered by the embedding deployment; the
    // bare binary authorizes and queues but cannot broadcast.
    let registry = Arc::new(AdapterRegistry::new());
    if registry.is_empty() {
        warn!("No chain adapters registered; transactions will fail closed at execution");
    }

    let keys = Arc::new(FileKeyProvider::new(&config.keys.dir));
    let executor = Arc::new(Executor::new(
        Arc::new(store.clone()),
        registry,
        keys,
        Duration::from_secs(config.executor.confirmation_timeout_secs),
    ));

    let oracle = Arc::new(HermesOracle::new()?);
    let resolver = AmountResolver::new(oracle);

    let policy = PolicyEngine::new(
        store.clone(),
        PolicyConfig {
            default_delay_seconds: config.policy.delay_seconds,
            default_approval_timeout_seconds: config.policy.approval_timeout_seconds,
        },
    );

    let delay_queue = DelayQueue::new(store.clone());
    let approval = ApprovalWorkflow::new(Arc::new(store.clone()));

    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        resolver,
        policy,
        executor,
        delay_queue.clone(),
        approval.clone(),
        notifier.clone(),
    ));

    let sweeper = Sweeper::new(
        store.clone(),
        Arc::clone(&pipeline),
        delay_queue,
        approval,
        notifier,
        SweeperConfig {
            delay_interval_secs: config.sweeper.delay_interval_secs,
            approval_interval_secs: config.sweeper.approval_interval_secs,
        },
    );
    sweeper.start();

    // Health surface stays reachable even with the kill switch engaged;
    // recovery runs through it.
    let health_state = Arc::new(HealthState::new());
    let health_server = HealthServer::new(Arc::clone(&health_state), config.health_port);
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            error!("Health server error: {}", e);
        }
    });

    // Readiness probe: ping the database and mirror the kill-switch
    // state into the health snapshot.
    let probe_handle = {
        let store = store.clone();
        let health_state = Arc::clone(&health_state);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(10));
            loop {
                tick.tick().await;
                let db_ok = store.ping().await.is_ok();
                health_state.record_db_check(db_ok).await;
                if let Ok(switch) = store.get_kill_switch().await {
                    health_state.record_kill_switch(switch.state).await;
                }
            }
        })
    };

    info!(
        health_port = config.health_port,
        "warden is running. Press Ctrl+C to stop."
    );
    shutdown_signal().await;

    info!("Shutting down...");
    sweeper.stop();
    // Let an in-flight sweep settle before tearing the pool down.
    tokio::time::sleep(Duration::from_secs(1)).await;

    health_handle.abort();
    probe_handle.abort();

    match tokio::time::timeout(Duration::from_secs(10), store.pool().close()).await {
        Ok(()) => info!("Database pool closed"),
        Err(_) => warn!("Database pool close timed out after 10s"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn print_status(store: &PostgresStore, audit_limit: i64) -> anyhow::Result<()> {
    let switch = store.get_kill_switch().await?;
    println!("Kill switch: {}", switch.state);
    if let Some(by) = &switch.activated_by {
        println!("  activated by: {}", by);
    }
    if let Some(reason) = &switch.reason {
        println!("  reason: {}", reason);
    }
    if let Some(at) = switch.activated_at {
        println!("  activated at: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let counts = store.count_transactions_by_status().await?;
    println!("\nTransactions:");
    if counts.is_empty() {
        println!("  (none)");
    }
    for (status, count) in counts {
        println!("  {:<18} {}", status, count);
    }

    let entries = store.list_recent_audit(audit_limit).await?;
    println!("\nRecent audit:");
    if entries.is_empty() {
        println!("  (none)");
    }
    for entry in entries {
        println!(
            "  {} [{}] {} {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.severity,
            entry.event,
            entry.details
        );
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let level = if config.level.is_empty() {
        "info"
    } else {
        config.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", level)));

    // Optional daily-rotating file log.
    //
    // `tracing_appender::rolling::daily` panics (and with panic=abort,
    // kills the process) if it cannot create the initial log file, so
    // preflight writability first.
    let file_layer = std::env::var("WARDEN_LOG_DIR").ok().and_then(|dir| {
        if std::fs::create_dir_all(&dir).is_err() {
            eprintln!(
                "Warning: could not create log directory {}, file logging disabled",
                dir
            );
            return None;
        }
        let test_path = std::path::Path::new(&dir).join(".warden_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let appender = tracing_appender::rolling::daily(&dir, "warden.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // Keep the guard alive for the life of the process.
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
