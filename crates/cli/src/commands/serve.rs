//! `mindkeep serve`: start the HTTP API server.

use mindkeep_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🧠 Mindkeep Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!("   Model:     {}", config.generation.model);
    if let Some(owner) = &config.assistant.default_owner {
        println!("   Default owner: {owner}");
    }

    mindkeep_gateway::start(config).await?;

    Ok(())
}
