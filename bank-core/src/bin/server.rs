//! Ledger server binary
//!
//! Opens the ledger and keeps it available until interrupted. The wire
//! front-end (HTTP/gRPC) lives in a separate service and talks to the
//! [`bank_core::Ledger`] API.

use bank_core::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Meridian ledger server");

    // Load configuration
    let config = match std::env::var("BANK_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };

    // Open ledger
    let ledger = Ledger::open(config).await?;
    let stats = ledger.stats()?;
    tracing::info!(
        accounts = stats.total_accounts,
        balances = stats.total_balances,
        transactions = stats.total_transactions,
        "Ledger opened"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down ledger server");
    ledger.close()?;
    Ok(())
}
