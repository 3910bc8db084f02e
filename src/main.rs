use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use devgate::config::Config;
use devgate::routing::RuleTable;
use devgate::server::{listener, Gateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load().context("Failed to load configuration")?;
    let table = RuleTable::from_config(&cfg.routing).context("Invalid forwarding rules")?;

    tracing::info!(
        upstream = %cfg.routing.upstream_origin,
        rules = table.len(),
        "Forwarding rules loaded"
    );

    let gateway = Arc::new(Gateway::from_config(&cfg, Arc::new(table)));

    tokio::select! {
        res = listener::run(&cfg.server.listen_addr, gateway) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
