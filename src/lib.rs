use anyhow::Context;
use clap::Parser;

pub mod api;
pub mod config;
pub mod guard;
pub mod telegram;
pub mod utils;

#[cfg(test)]
mod testing;

use config::{Cli, Command, ServerConfig};
use guard::{SessionBackend, SessionGuard};
use telegram::{GrammersBackend, SessionSource};

pub async fn run() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    // This will not override real environment variables
    dotenv::dotenv().ok();
    utils::logger::init();

    let cli = Cli::parse();
    match cli.command() {
        Command::Serve => serve(cli).await,
        Command::Login => login(cli).await,
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let credentials = cli
        .telegram
        .credentials(false)
        .map_err(anyhow::Error::msg)?;
    let backend = GrammersBackend::new(
        credentials,
        cli.telegram.session_source(),
        cli.telegram.dc_address.clone(),
    )
    .map_err(anyhow::Error::msg)
    .context("failed to load Telegram session")?;

    let guard = SessionGuard::new(backend, cli.telegram.guard_config());

    // Connect in the background so the first request does not pay for it.
    let warm_up = guard.warm_up();

    let state = api::AppState::new(ServerConfig::from(&cli.server), guard.clone());
    let result = api::serve(state).await;

    warm_up.abort();
    guard.shutdown().await;
    log::info!("serve: stopped");

    result.context("HTTP server failed")
}

async fn login(cli: Cli) -> anyhow::Result<()> {
    let credentials = cli
        .telegram
        .credentials(true)
        .map_err(anyhow::Error::msg)?;
    let backend = GrammersBackend::new(
        credentials,
        SessionSource::File(cli.telegram.session_file.clone()),
        cli.telegram.dc_address.clone(),
    )
    .map_err(anyhow::Error::msg)
    .context("failed to load Telegram session")?;

    let handle = backend.connect().await?;
    let outcome = backend.authenticate(&handle).await;
    let session = backend.export_session();
    backend.disconnect(handle).await;
    outcome?;

    if let Some(path) = backend.session_file() {
        println!("Session saved to {}", path.display());
    }
    println!("Set this to reuse the session without the file:");
    println!("TELEGRAM_SESSION={}", session);
    Ok(())
}
