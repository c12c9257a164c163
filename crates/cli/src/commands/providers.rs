//! `synapse providers` — List the configured provider chain.

use std::path::Path;
use synapse_providers::ProviderDescriptor;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = synapse_providers::build_from_config(&config);

    println!("🤖 Provider Chain");
    println!("=================");
    println!();
    for line in table(&registry.descriptors()) {
        println!("{line}");
    }
    println!();
    println!("  Providers are tried in priority order (lower first).");
    println!("  Environment: OPENAI_API_KEY, ANTHROPIC_API_KEY, OPENROUTER_API_KEY, OLLAMA_HOST");

    Ok(())
}

fn table(descriptors: &[ProviderDescriptor]) -> Vec<String> {
    let mut lines = vec![
        format!(
            "  {:<16} {:>8}  {:<24} {:<9} {:>8}",
            "Provider", "Priority", "Default model", "Streaming", "Timeout"
        ),
        format!("  {}", "─".repeat(70)),
    ];
    for d in descriptors {
        lines.push(format!(
            "  {:<16} {:>8}  {:<24} {:<9} {:>7}s",
            d.name,
            d.priority,
            d.default_model.as_deref().unwrap_or("-"),
            if d.capabilities.streaming { "yes" } else { "no" },
            d.timeout_secs,
        ));
    }
    lines
}
