//! `mindkeep config`: configuration management commands.

use mindkeep_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = advisories(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.provider.name);
            println!("   Model:     {}", config.generation.model);
            println!("   Timeout:   {}s", config.generation.timeout_secs);
            println!("   Window:    {} messages", config.assistant.context_window);
            println!("   Store:     {} ({})", config.store.backend, config.store.database_url);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Settings that load fine but will make the assistant degrade.
fn advisories(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.api_key.is_none() && config.provider.name != "ollama" {
        warnings.push("No API key set (set MINDKEEP_API_KEY or OPENAI_API_KEY env var)");
    }

    if config.assistant.default_owner.is_none() {
        warnings.push("No default owner; every request must name one");
    }

    if config.store.backend == "memory" {
        warnings.push("Memory store: conversations are lost on restart");
    }

    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("ℹ️  Config already exists at {}", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(AppConfig::config_dir())?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote default config to {}", config_path.display());
    println!("   Next: mindkeep migrate --owner <id>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn default_config_warns_about_missing_key_and_owner() {
        let warnings = advisories(&AppConfig::default());
        assert!(warnings.iter().any(|w| w.contains("API key")));
        assert!(warnings.iter().any(|w| w.contains("default owner")));
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut config = AppConfig::default();
        config.provider.name = "ollama".into();
        config.assistant.default_owner = Some("alice".into());
        assert!(advisories(&config).is_empty());
    }
}
