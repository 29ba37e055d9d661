//! Main entry point for the Snake Arena benchmarking service
//!
//! Initializes the full stack (stores, queue, dispatcher, orchestrator,
//! sweeper), runs periodic evaluation and cleanup loops, and shuts down
//! gracefully on SIGINT/SIGTERM.

use anyhow::Result;
use clap::Parser;
use snake_arena::config::AppConfig;
use snake_arena::dispatch::{InMemoryJobQueue, MatchDispatcher, StaleSweeper};
use snake_arena::orchestrator::EvaluationOrchestrator;
use snake_arena::storage::{InMemoryAgentStore, InMemoryMatchStore};
use snake_arena::types::{Agent, Direction, ProviderKind, TestStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Snake Arena - AI-agent benchmarking and rating service
#[derive(Parser)]
#[command(
    name = "snake-arena",
    version,
    about = "Deterministic grid-game benchmarking with Bayesian agent ratings",
    long_about = "Snake Arena runs simultaneous-move grid matches between AI agents, keeps \
                 TrueSkill ratings derived from the chronological match log, and onboards new \
                 agents through confidence-weighted placement matches."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Seed a set of built-in demo agents at startup
    #[arg(long, help = "Register built-in demo agents so sweeps have a population")]
    seed_demo_agents: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

fn display_startup_banner(config: &AppConfig) {
    info!("Snake Arena Benchmarking Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Board: {}x{}, {} apples, {} rounds max, target {}",
        config.game.board_width,
        config.game.board_height,
        config.game.apple_count,
        config.game.max_rounds,
        config.game.apple_target
    );
    info!(
        "   Dispatch: {} workers, {} retries",
        config.dispatch.workers, config.dispatch.max_retry_attempts
    );
    info!(
        "   Placement budget: {} games per agent",
        config.evaluation.max_games
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    Ok(config)
}

/// Register a ranked baseline plus a couple of onboarding agents so the
/// evaluation loop has something to chew on out of the box.
async fn seed_demo_agents(agents: &InMemoryAgentStore) -> Result<()> {
    use snake_arena::storage::AgentStore;

    let demos = [
        ("baseline-random", ProviderKind::Random, TestStatus::Ranked),
        (
            "baseline-north",
            ProviderKind::Fixed {
                direction: Direction::Up,
            },
            TestStatus::Ranked,
        ),
        ("challenger-random", ProviderKind::Random, TestStatus::Untested),
    ];
    for (id, provider, status) in demos {
        let mut agent = Agent::discovered(id.to_string(), id.to_string(), provider);
        agent.is_active = true;
        agent.test_status = status;
        agents.put_agent(agent).await?;
        info!(agent_id = id, status = %status, "demo agent registered");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let queue = Arc::new(InMemoryJobQueue::new());
    let agents = Arc::new(InMemoryAgentStore::new());
    let matches = Arc::new(InMemoryMatchStore::new());

    if args.seed_demo_agents {
        seed_demo_agents(&agents).await?;
    }

    let dispatcher = Arc::new(MatchDispatcher::new(
        queue.clone(),
        agents.clone(),
        matches.clone(),
        config.clone(),
    ));
    let orchestrator = Arc::new(EvaluationOrchestrator::new(
        agents.clone(),
        matches.clone(),
        dispatcher.clone(),
        config.clone(),
    ));
    dispatcher.add_completion_hook(orchestrator.clone()).await;

    let workers = dispatcher.spawn_workers();
    info!(workers = workers.len(), "match workers running");

    // Periodic evaluation sweeps
    let evaluation_task = {
        let orchestrator = orchestrator.clone();
        let interval = config.evaluation_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match orchestrator.run_sweep().await {
                    Ok(report) => {
                        if !report.outcomes.is_empty() {
                            info!(agents = report.outcomes.len(), "evaluation sweep finished");
                        }
                    }
                    Err(e) => warn!("Evaluation sweep failed: {}", e),
                }
            }
        })
    };

    // Periodic stale-match cleanup
    let sweeper_task = {
        let sweeper = StaleSweeper::new(
            queue.clone(),
            agents.clone(),
            matches.clone(),
            config.clone(),
        );
        let interval = config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = sweeper.run_once().await {
                    warn!("Stale sweep failed: {}", e);
                }
            }
        })
    };

    info!("Snake Arena is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    evaluation_task.abort();
    sweeper_task.abort();

    let shutdown = async {
        for worker in workers {
            worker.abort();
        }
    };
    match tokio::time::timeout(config.shutdown_timeout(), shutdown).await {
        Ok(()) => info!("Graceful shutdown completed"),
        Err(_) => {
            warn!("Shutdown timeout exceeded, forcing exit");
            error!("Some workers did not stop cleanly");
        }
    }

    info!("Snake Arena stopped");
    Ok(())
}
