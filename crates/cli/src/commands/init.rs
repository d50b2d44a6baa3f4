//! `ctxpack init` — Write the default configuration file.

use ctxpack_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Pick a tokenizer backend in [tokenizer]");
        println!("   2. Run: ctxpack render request.json");
    }

    Ok(())
}
