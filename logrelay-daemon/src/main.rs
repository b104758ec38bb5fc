mod cli;

use anyhow::Result;
use clap::Parser;

use logrelay_core::config::RelayConfig;
use logrelay_daemon::Orchestrator;
use logrelay_daemon::orchestrator::restrict_sources;
use logrelay_daemon::logging::{apply_cli_overrides, init_tracing};

use crate::cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = RelayConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    apply_cli_overrides(
        &mut config.general,
        cli.log_level.as_deref(),
        cli.log_format.as_deref(),
    );
    if let Some(pid_file) = cli.pid_file {
        config.general.pid_file = pid_file;
    }
    restrict_sources(&mut config, &cli.only)?;

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration invalid: {}", e))?;
        println!(
            "configuration OK: {} ({} source(s), {} enabled)",
            cli.config.display(),
            config.sources.len(),
            config.enabled_sources().count()
        );
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "logrelay-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    let result = orchestrator.run().await;

    match &result {
        Ok(()) => tracing::info!("logrelay-daemon shut down"),
        Err(e) => tracing::error!(error = %e, "logrelay-daemon exited with error"),
    }
    result
}
