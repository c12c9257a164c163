//! `synapse serve` — Start the gateway.

use std::path::Path;
use tracing::info;

pub async fn run(
    config_path: Option<&Path>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(p) = port {
        config.gateway.port = p;
    }
    if let Some(h) = host {
        config.gateway.host = h;
    }

    info!(
        environment = %config.environment,
        memory = %config.memory.backend,
        providers = config.providers.len(),
        auth = config.has_api_key(),
        "Starting Synapse"
    );

    println!("🧠 Synapse Gateway");
    println!("==================");
    println!("  Listening:  http://{}:{}", config.gateway.host, config.gateway.port);
    println!("  Chat:       POST /v1/chat/completions");
    println!("  Health:     GET  /health, /health/ready");
    if !config.has_api_key() {
        println!("  ⚠️  No API key configured, authentication is disabled");
    }
    println!();

    synapse_gateway::start(config).await
}
