//! Relay pipeline module initialization.
//!
//! Converts each enabled `[[sources]]` entry into a `SourcePipelineConfig`,
//! builds a `RelayPipeline` on the shared HTTP client and wraps it in a
//! [`ModuleHandle`].

use anyhow::Result;

use logrelay_core::config::{GeneralConfig, RelayConfig, SourceConfig};
use logrelay_pipeline::sink::webhook::{build_client, default_user_agent};
use logrelay_pipeline::{RelayPipelineBuilder, SourcePipelineConfig};

use super::{ModuleHandle, ModuleRegistry};

/// Builds the HTTP client shared by every source.
pub fn shared_client() -> Result<reqwest::Client> {
    build_client(&default_user_agent())
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))
}

/// Initialize one source.
pub fn init(
    source: &SourceConfig,
    general: &GeneralConfig,
    client: &reqwest::Client,
) -> Result<ModuleHandle> {
    let config = SourcePipelineConfig::from_core(source, general);
    tracing::info!(
        source = %config.name,
        path = %config.tail.path.display(),
        grammar = %config.grammar,
        webhook = config.webhook_url.is_some(),
        "initializing relay pipeline"
    );

    let pipeline = RelayPipelineBuilder::new(config)
        .client(client.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build source '{}': {}", source.name, e))?;
    let stats = pipeline.stats();

    Ok(ModuleHandle::new(source.name.clone(), true, Box::new(pipeline)).with_stats(stats))
}

/// Initialize every enabled source in file order.
pub fn init_all(config: &RelayConfig, client: &reqwest::Client) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    for source in &config.sources {
        if !source.enabled {
            tracing::info!(source = %source.name, "source disabled in configuration");
            continue;
        }
        registry.register(init(source, &config.general, client)?)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> RelayConfig {
        let toml = format!(
            r#"
[general]
data_dir = "{data}"

[[sources]]
name = "tron"
log_path = "{data}/tron.log"
grammar = "armagetron"
webhook_url = "https://example.invalid/hook"

[[sources]]
name = "q3"
enabled = false
log_path = "{data}/q3.log"
grammar = "quake3"
"#,
            data = dir.display()
        );
        RelayConfig::parse(&toml).unwrap()
    }

    #[test]
    fn init_all_skips_disabled_sources() {
        let dir = tempfile::tempdir().unwrap();
        let client = shared_client().unwrap();
        let registry = init_all(&config(dir.path()), &client).unwrap();
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.names(), vec!["tron"]);
    }

    #[test]
    fn init_attaches_stats() {
        let dir = tempfile::tempdir().unwrap();
        let client = shared_client().unwrap();
        let config = config(dir.path());
        let handle = init(&config.sources[0], &config.general, &client).unwrap();
        assert_eq!(handle.name, "tron");
        assert!(handle.enabled);
        assert!(handle.stats.is_some());
    }

    #[test]
    fn invalid_source_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let client = shared_client().unwrap();
        let mut config = config(dir.path());
        config.sources[0].log_path = String::new();
        let err = init(&config.sources[0], &config.general, &client).err().unwrap();
        assert!(err.to_string().contains("tron"));
    }
}
