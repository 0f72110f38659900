use anyhow::Context;
use gatekeeper::{config::GatekeeperConfig, init_tracing, run_server};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config file is optional; GATEKEEPER__* environment variables apply either way
    let config_path = env::args().nth(1);

    let config = GatekeeperConfig::load(config_path.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration from {}\nUsage: gatekeeper [config_file]",
            config_path.as_deref().unwrap_or("<environment>")
        )
    })?;

    init_tracing(&config.logging);

    run_server(config).await.context("Gatekeeper error")?;

    Ok(())
}
