//! `synapse onboard` — First-time setup.

use std::path::Path;
use synapse_config::AppConfig;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config_path);

    println!("🧠 Synapse — First-Time Setup");
    println!("=============================\n");

    match write_default(&path)? {
        true => {
            println!("✅ Created config.toml at: {}", path.display());
            println!("\n📝 Next steps:");
            println!("   1. Add a [[providers]] section or export OPENAI_API_KEY");
            println!("   2. Set SYNAPSE_API_KEY to require bearer auth");
            println!("   3. Run: synapse serve\n");
        }
        false => {
            println!("⚠️  Config already exists at: {}", path.display());
            println!("   Edit it manually or delete and re-run onboard.\n");
        }
    }

    Ok(())
}

/// Write the default config unless a file already exists. Returns whether
/// a file was written.
fn write_default(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
