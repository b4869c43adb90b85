use anyhow::Context;
use std::process::ExitCode;

use claim_uploader::{config, Agent, RunOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Claim Uploader");

    match run().await {
        Ok(RunOutcome::NoFiles { skipped }) => {
            if skipped > 0 {
                log::warn!("{} entries were skipped because their metadata was unreadable", skipped);
            }
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Uploaded(report)) => {
            log::info!(
                "Run {} submitted {} file(s)",
                report.run_id,
                report.files_attached
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<RunOutcome> {
    let config = config::load_config().context("Failed to load configuration")?;
    log::debug!("Configuration: {:?}", config);

    let agent = Agent::from_config(config);
    let location = agent.config().network_location.display().to_string();

    agent
        .run()
        .await
        .with_context(|| format!("Claim upload from {} failed", location))
}
