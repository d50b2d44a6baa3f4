//! `ctxpack config` — Configuration management commands.

use ctxpack_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if config.tokenizer.backend == "whitespace" {
                warnings.push("Whitespace tokenizer counts are approximate for real models");
            }

            if cfg!(not(feature = "hf")) && config.tokenizer.backend == "huggingface" {
                warnings.push("Tokenizer backend 'huggingface' needs a build with the `hf` feature");
            }

            if config.cache.backend == "none" {
                warnings.push("Token count caching is disabled");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Tokenizer: {}", config.tokenizer.backend);
            println!("   Model:     {}", config.assembler.default_model);
            println!("   Cache:     {}", config.cache.backend);
            println!(
                "   Window:    {} ctx / {} gen / {} overhead",
                config.assembler.max_context_tokens,
                config.assembler.max_generation_tokens,
                config.assembler.reserved_overhead
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = ctxpack_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let toml_str = ctxpack_config::AppConfig::default_toml();
        let parsed: ctxpack_config::AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
