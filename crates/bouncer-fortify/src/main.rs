//! Standalone remediation server and cache-maintenance driver on top of
//! `bouncer-core`, wiring it onto axum. CLI surface: `serve` /
//! `refresh-cache` / `clear-cache` / `prune-cache`, exit codes 0/2/3/4.

use anyhow::Result;
use cerberus_common::error::BouncerError;
use cerberus_common::types::{ExitCode, OperatingMode};
use clap::{Parser, Subcommand};
use std::process::ExitCode as ProcessExitCode;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

/// Cerberus remediation engine.
#[derive(Parser, Debug)]
#[command(name = "bouncer-fortify")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path.
    #[arg(short, long, default_value = "config/bouncer.toml")]
    config: String,

    /// Listen address (overrides config).
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// LAPI base URL (overrides config).
    #[arg(long, env = "LAPI_URL")]
    api_url: Option<String>,

    /// LAPI API key (overrides config).
    #[arg(long, env = "LAPI_API_KEY")]
    api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output.
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Pull the latest decisions and exit (STREAM warm-up/refresh, or a
    /// no-op confirmation in LIVE mode).
    RefreshCache,
    /// Remove every cache entry regardless of tag.
    ClearCache,
    /// Sweep expired entries on backends that aren't self-expiring.
    PruneCache,
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("failed to initialize logging: {e}");
        return ProcessExitCode::from(ExitCode::ConfigError as u8);
    }

    match run(args).await {
        Ok(code) => ProcessExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            ProcessExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = match AppConfig::load(&args.config, &args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return Ok(ExitCode::ConfigError);
        }
    };
    info!(path = %args.config, "configuration loaded");

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::RefreshCache => refresh_cache(config).await,
        Command::ClearCache => clear_cache(config).await,
        Command::PruneCache => prune_cache(config).await,
    }
}

async fn serve(config: AppConfig) -> Result<ExitCode> {
    let listen_addr = config.listen_addr.clone();
    let operating_mode = config.bouncer.operating_mode;

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize application state");
            return Ok(exit_code_for(&e));
        }
    };

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    if operating_mode == OperatingMode::Stream {
        match state.stream.warm_up().await {
            Ok(count) => info!(decisions = count, "stream warm-up complete"),
            Err(e) => {
                tracing::error!(error = %e, "stream warm-up failed");
                return Ok(exit_code_for_bouncer(&e));
            }
        }

        let stream = state.stream.clone();
        let refresh_interval = state.stream_refresh_interval();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(bouncer_core::stream_sync_worker(
            stream,
            refresh_interval,
            shutdown_rx,
        ));
    }

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "bouncer-fortify listening");

    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("bouncer-fortify shutdown complete");
    Ok(ExitCode::Success)
}

async fn refresh_cache(config: AppConfig) -> Result<ExitCode> {
    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => return Ok(exit_code_for(&e)),
    };
    match state.stream.refresh().await {
        Ok(counts) => {
            info!(new = counts.new, deleted = counts.deleted, "cache refreshed");
            Ok(ExitCode::Success)
        }
        Err(e) => {
            tracing::error!(error = %e, "cache refresh failed");
            Ok(exit_code_for_bouncer(&e))
        }
    }
}

async fn clear_cache(config: AppConfig) -> Result<ExitCode> {
    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => return Ok(exit_code_for(&e)),
    };
    match state.decision_store.clear().await {
        Ok(()) => {
            info!("cache cleared");
            Ok(ExitCode::Success)
        }
        Err(e) => {
            tracing::error!(error = %e, "cache clear failed");
            Ok(exit_code_for_bouncer(&e))
        }
    }
}

async fn prune_cache(config: AppConfig) -> Result<ExitCode> {
    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => return Ok(exit_code_for(&e)),
    };
    match state.decision_store.prune().await {
        Ok(()) => {
            info!("cache pruned");
            Ok(ExitCode::Success)
        }
        Err(e) => {
            tracing::error!(error = %e, "cache prune failed");
            Ok(exit_code_for_bouncer(&e))
        }
    }
}

/// Exit code for an error surfaced before `AppState` exists — typically
/// a bad DSN/path caught by `anyhow::Context`, which is always a backend
/// connectivity problem at this stage since config shape was already
/// validated.
fn exit_code_for(e: &anyhow::Error) -> ExitCode {
    if let Some(bouncer_err) = e.downcast_ref::<BouncerError>() {
        return exit_code_for_bouncer(bouncer_err);
    }
    ExitCode::BackendUnreachable
}

fn exit_code_for_bouncer(e: &BouncerError) -> ExitCode {
    match e {
        BouncerError::Config(_) => ExitCode::ConfigError,
        BouncerError::Busy => ExitCode::Busy,
        BouncerError::Storage(_) | BouncerError::WarmUp(_) => ExitCode::BackendUnreachable,
        _ => ExitCode::BackendUnreachable,
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
