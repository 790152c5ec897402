use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::auth::{issue_token, Claims};
use crate::config::{self, AppConfig};
use crate::database;
use crate::lifecycle::{shutdown_signal, Shutdown};
use crate::routes;
use crate::state::AppState;
use crate::telemetry::FlushScheduler;

#[derive(Parser)]
#[command(name = "mediavault-api")]
#[command(about = "MediaVault API server - scoped API keys and request analytics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on; overrides SERVER_PORT")]
        port: Option<u16>,
    },

    #[command(about = "Sign an admin bearer token with the configured JWT secret")]
    MintToken {
        #[arg(long, default_value = "admin")]
        subject: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::config().clone();
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::MintToken { subject, email, hours } => {
            let token = issue_token(&config.security.jwt_secret, &Claims::new(subject, email, hours))?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn serve(mut config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let config = Arc::new(config);
    tracing::info!("Starting MediaVault API in {:?} mode", config.environment);

    let store = database::connect(&config.database)
        .await
        .context("failed to open document store")?;
    let state = AppState::new(config.clone(), store);

    let shutdown = Shutdown::new();
    let scheduler = FlushScheduler::spawn(
        state.persister.clone(),
        config.analytics.flush_interval(),
        shutdown.subscribe(),
    );
    let usage_worker = state.usage.spawn_worker(shutdown.subscribe());

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("MediaVault API listening on http://{}", bind_addr);

    axum::serve(listener, routes::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop background tasks; each drains once more before exiting
    shutdown.trigger();
    if let Err(e) = scheduler.await {
        tracing::error!("Flush scheduler ended abnormally: {}", e);
    }
    if let Err(e) = usage_worker.await {
        tracing::error!("Usage worker ended abnormally: {}", e);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
