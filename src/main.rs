//! Research orchestrator: routes a prompt to a data source, collects items
//! from it (falling back across related sources on failure), and
//! synthesizes a briefing with an LLM.
//!
//! Subcommands:
//! - `query`: one-shot pipeline invocation, printing the response.
//! - `serve-daily`: runs the daily scheduler loop in the foreground.
//! - `sources`: lists the registry keys.
//! - `subscribers`: list/add/remove daily-briefing recipients.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use research_orchestrator::collector::CollectorRegistry;
use research_orchestrator::config::Config;
use research_orchestrator::pipeline::{self, PipelineState};
use research_orchestrator::storage::Storage;
use research_orchestrator::{metrics, scheduler};

#[derive(Parser, Debug)]
#[command(name = "research-orchestrator")]
#[command(author = "Research Orchestrator Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Routes a prompt to a data source, collects items, and synthesizes a briefing with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline once against a user message and print the response
    Query {
        /// The caller's raw request; if omitted, read from stdin
        message: Option<String>,

        /// Force a specific collector, skipping the routing step
        #[arg(short, long)]
        source: Option<String>,

        /// Force a specific query string (requires --source)
        #[arg(short, long)]
        query: Option<String>,

        /// User identifier, for the query log
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Run the daily scheduler loop in the foreground
    ServeDaily,

    /// List every registered collector key
    Sources,

    /// Manage daily-briefing subscribers
    Subscribers {
        #[command(subcommand)]
        action: SubscriberAction,
    },
}

#[derive(Subcommand, Debug)]
enum SubscriberAction {
    /// List active subscribers
    List,
    /// Subscribe a phone number
    Add {
        phone_number: String,
        #[arg(long, value_delimiter = ',')]
        preferences: Vec<String>,
    },
    /// Unsubscribe a phone number
    Remove { phone_number: String },
}

fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "starting research orchestrator");

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Commands::Query { message, source, query, user } => {
            run_query(config, message, source, query, &user).await?;
        }
        Commands::ServeDaily => {
            run_serve_daily(config).await?;
        }
        Commands::Sources => {
            show_sources(&config)?;
        }
        Commands::Subscribers { action } => {
            run_subscribers(config, action).await?;
        }
    }

    Ok(())
}

async fn run_query(
    config: Config,
    message: Option<String>,
    source: Option<String>,
    query: Option<String>,
    user: &str,
) -> Result<()> {
    let user_message = match message {
        Some(m) => m,
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf.trim().to_string()
        }
    };

    let registry = CollectorRegistry::build(&config)?;

    let mut state = PipelineState::new(user_message);
    if let (Some(source), Some(query)) = (source, query) {
        state = state.with_source_and_query(source, query);
    }

    let result = pipeline::run(&registry, &config, state).await;
    println!("{}", result.response);

    if let Some(database_url) = &config.database_url {
        if let Ok(storage) = Storage::connect(database_url).await {
            storage.log_query(user, &result.source, &result.query, &result.response).await;
        }
    }

    Ok(())
}

async fn run_serve_daily(config: Config) -> Result<()> {
    let registry = CollectorRegistry::build(&config)?;

    let storage = match &config.database_url {
        Some(url) => {
            let storage = Storage::connect(url).await?;
            storage.migrate().await?;
            Some(storage)
        }
        None => None,
    };

    if config.metrics_enabled {
        let metrics_addr: SocketAddr = format!("0.0.0.0:{}", config.metrics_port).parse()?;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_addr).await {
                error!(error = %e, "metrics server failed");
            }
        });
        info!(port = config.metrics_port, "metrics server started at /metrics");
    }

    info!(hour = config.daily_hour, minute = config.daily_minute, "starting daily scheduler");

    tokio::select! {
        _ = scheduler::run_forever(&registry, &config, storage.as_ref()) => {}
        _ = shutdown_signal() => {
            info!("scheduler shutting down");
        }
    }

    Ok(())
}

fn show_sources(config: &Config) -> Result<()> {
    let registry = CollectorRegistry::build(config)?;
    println!("Registered collectors:");
    for key in registry.keys() {
        println!("  - {key}");
    }
    Ok(())
}

async fn run_subscribers(config: Config, action: SubscriberAction) -> Result<()> {
    let database_url = config
        .database_url
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("database_url is required to manage subscribers"))?;
    let storage = Storage::connect(database_url).await?;
    storage.migrate().await?;

    match action {
        SubscriberAction::List => {
            let subscribers = storage.active_subscribers().await?;
            println!("Active subscribers ({}):", subscribers.len());
            for s in subscribers {
                println!("  - {} (preferences: {})", s.phone_number, s.preferences.join(", "));
            }
        }
        SubscriberAction::Add { phone_number, preferences } => {
            storage.subscribe(&phone_number, &preferences).await?;
            println!("Subscribed {phone_number}");
        }
        SubscriberAction::Remove { phone_number } => {
            storage.unsubscribe(&phone_number).await?;
            println!("Unsubscribed {phone_number}");
        }
    }

    Ok(())
}
