//! `order-executor --account-id <id>`: consumes one account's signal queue
//! and turns each signal into a broker order. Exit 0 on clean shutdown,
//! 1 on fatal init error, 2 on config error.

use clap::Parser;
use meridian_core::Config;
use meridian_services::{order_executor, AppContext};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Meridian order executor")]
struct Args {
    /// Account to run this process for. Overrides ACCOUNT_ID if set.
    #[arg(long)]
    account_id: Option<String>,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let args = Args::parse();
    if let Some(account_id) = &args.account_id {
        std::env::set_var("ACCOUNT_ID", account_id);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: configuration error: {e}");
            std::process::exit(2);
        }
    };

    let ctx = match AppContext::build(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("FATAL: failed to initialize: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(account = %ctx.config.account_id, "order-executor starting");

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(()).await;
        }
    });

    if let Err(e) = order_executor::run(ctx, shutdown_rx).await {
        tracing::error!("order-executor exited with error: {e}");
        std::process::exit(1);
    }

    tracing::info!("order-executor shut down cleanly");
}
