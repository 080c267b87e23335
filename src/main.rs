use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use ledgerlimit::auth::TokenAuthority;
use ledgerlimit::config::LedgerLimitConfig;
use ledgerlimit::error::Error;
use ledgerlimit::grpc::{GrpcServer, RateLimitClient};
use ledgerlimit::ledger;
use ledgerlimit::ratelimit::{RateLimiter, RetentionSweep};
use ledgerlimit::telemetry;

#[derive(Debug, Parser)]
#[command(name = "ledgerlimit", version, about = "Ledger-backed rate limiting service")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the gRPC service and the scheduled retention sweep
    Serve,
    /// Run a single retention sweep cycle against the configured ledger
    Sweep,
    /// Print a signed identity token
    MintToken {
        #[arg(long)]
        uid: String,
        /// Grant the admin assertion
        #[arg(long)]
        admin: bool,
    },
    /// Check an action against a running service
    Check {
        #[arg(long, default_value = "http://127.0.0.1:8081")]
        endpoint: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the caller's usage statistics from a running service
    Stats {
        #[arg(long, default_value = "http://127.0.0.1:8081")]
        endpoint: String,
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = LedgerLimitConfig::load(cli.config.as_deref())?;
    telemetry::init_logging(&config.logging)?;

    match cli.command {
        Command::Serve => serve(config).await?,
        Command::Sweep => {
            let ledger = ledger::open(&config.ledger).await?;
            let deleted = sweep_for(&config, ledger).run_once().await?;
            info!(deleted = deleted, "Retention sweep complete");
        }
        Command::MintToken { uid, admin } => {
            let token = authority_for(&config)
                .ok_or_else(|| Error::Config("auth.jwt_secret is not set".to_string()))?
                .mint(&uid, admin)?;
            println!("{}", token);
        }
        Command::Check {
            endpoint,
            action,
            token,
        } => {
            let mut client = RateLimitClient::connect_lazy(endpoint)?;
            if let Some(token) = token {
                client = client.with_token(token);
            }
            let decision = client.check(&action).await;
            println!(
                "{}",
                serde_json::json!({
                    "allowed": decision.allowed,
                    "remaining": decision.remaining,
                    "resetAt": decision.reset_at,
                })
            );
        }
        Command::Stats { endpoint, token } => {
            let mut client = RateLimitClient::connect_lazy(endpoint)?.with_token(token);
            let stats = client
                .usage_stats()
                .await
                .ok_or_else(|| anyhow::anyhow!("usage statistics unavailable"))?;
            let body: serde_json::Map<String, serde_json::Value> = stats
                .into_iter()
                .map(|(action, usage)| {
                    (
                        action,
                        serde_json::json!({
                            "used": usage.used,
                            "limit": usage.limit,
                            "resetAt": usage.reset_at,
                        }),
                    )
                })
                .collect();
            println!("{}", serde_json::Value::Object(body));
        }
    }

    Ok(())
}

async fn serve(config: LedgerLimitConfig) -> anyhow::Result<()> {
    info!("Starting ledgerlimit rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let ledger = ledger::open(&config.ledger).await?;
    let quotas = Arc::new(config.quota_table());
    info!(
        backend = ?config.ledger.backend,
        largest_window_ms = quotas.largest_window_ms(),
        "Ledger opened"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweep_for(&config, ledger.clone()).spawn(
        Duration::from_secs(config.sweep.interval_secs),
        shutdown_rx,
    );

    let rate_limiter = Arc::new(RateLimiter::new(quotas, ledger));
    let mut grpc_server = GrpcServer::new(config.server.grpc_addr, rate_limiter);
    match authority_for(&config) {
        Some(authority) => grpc_server = grpc_server.with_authority(Arc::new(authority)),
        None => info!("No JWT secret configured, all callers are anonymous"),
    }

    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    sweeper.await?;

    info!("ledgerlimit stopped");
    Ok(())
}

fn sweep_for(config: &LedgerLimitConfig, ledger: Arc<dyn ledger::Ledger>) -> RetentionSweep {
    RetentionSweep::new(ledger)
        .with_retention_ms(config.sweep.retention_ms)
        .with_batch_size(config.sweep.batch_size)
}

fn authority_for(config: &LedgerLimitConfig) -> Option<TokenAuthority> {
    config.auth.jwt_secret.as_ref().map(|secret| {
        TokenAuthority::new(secret, config.auth.issuer.clone(), config.auth.token_ttl_secs)
    })
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
