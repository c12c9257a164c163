//! `synapse status` — Show the effective configuration.

use std::path::Path;
use synapse_config::AppConfig;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config_path);
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    for line in report(&config) {
        println!("{line}");
    }

    if path.exists() {
        println!("\n  ✅ Config file found: {}", path.display());
    } else {
        println!("\n  ⚠️  No config file at {}, run `synapse onboard` first", path.display());
    }

    Ok(())
}

fn report(config: &AppConfig) -> Vec<String> {
    let chain = config
        .providers
        .iter()
        .map(|p| format!("{} ({})", p.name, p.priority))
        .collect::<Vec<_>>()
        .join(" → ");

    vec![
        "🧠 Synapse Status".into(),
        "=================".into(),
        format!("  Environment:  {}", config.environment),
        format!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port),
        format!(
            "  Auth:         {}",
            if config.has_api_key() { "bearer token" } else { "disabled" }
        ),
        format!("  Memory:       {}", config.memory.backend),
        format!("  Budget:       {} tokens", config.context.budget_tokens),
        format!(
            "  Top-k:        memory {}, retrieval {}",
            config.context.memory_top_k, config.context.retrieval_top_k
        ),
        format!(
            "  Router:       {} attempts, unavailable after {} failures",
            config.router.max_attempts, config.router.failure_threshold
        ),
        format!("  Providers:    {chain}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_config::ProviderConfig;

    #[test]
    fn report_shows_provider_chain_in_order() {
        let mut config = AppConfig::default();
        config.providers = vec![
            ProviderConfig::static_reply("primary", "a", 0),
            ProviderConfig::static_reply("backup", "b", 5),
        ];
        let lines = report(&config);
        assert!(lines.iter().any(|l| l.contains("primary (0) → backup (5)")));
        assert!(lines.iter().any(|l| l.contains("disabled")));
    }

    #[test]
    fn report_never_prints_api_keys() {
        let mut config = AppConfig::default();
        config.gateway.api_keys = vec!["sk-secret".into()];
        let lines = report(&config).join("\n");
        assert!(lines.contains("bearer token"));
        assert!(!lines.contains("sk-secret"));
    }
}
