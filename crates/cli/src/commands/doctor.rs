//! `synapse doctor` — Diagnose configuration and dependencies.

use std::path::Path;
use std::time::Duration;
use synapse_core::provider::Provider;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Synapse Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let path = super::config_path(config_path);
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file at {}, using defaults", path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the configuration and re-run `synapse doctor`.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ Gateway authentication enabled");
    } else {
        println!("  ⚠️  No gateway API key, every client is accepted");
    }

    match synapse_memory::create_backends(&config.memory.backend) {
        Some((memory, documents)) => {
            let memory_ok = matches!(memory.health_check().await, Ok(true));
            let documents_ok = matches!(documents.health_check().await, Ok(true));
            issues += report("Memory backend", memory.name(), memory_ok);
            issues += report("Document index", documents.name(), documents_ok);
        }
        None => {
            println!("  ❌ Unknown memory backend '{}'", config.memory.backend);
            issues += 1;
        }
    }

    let registry = synapse_providers::build_from_config(&config);
    for descriptor in registry.descriptors() {
        let Some(provider) = registry.provider(&descriptor.name) else {
            continue;
        };
        issues += report("Provider", &descriptor.name, probe(provider.as_ref()).await);
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Print one check line; returns 1 when it failed.
fn report(what: &str, name: &str, ok: bool) -> usize {
    if ok {
        println!("  ✅ {what} '{name}' reachable");
        0
    } else {
        println!("  ❌ {what} '{name}' not reachable");
        1
    }
}

async fn probe(provider: &dyn Provider) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, provider.health_check()).await,
        Ok(Ok(true))
    )
}
