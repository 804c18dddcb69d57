//! `mindkeep migrate`: create the SQLite schema and provision owners.

use mindkeep_config::AppConfig;
use mindkeep_core::error::RepositoryError;
use mindkeep_core::message::OwnerId;
use mindkeep_store::SqliteStore;

pub async fn run(owners: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.store.backend == "memory" {
        println!("ℹ️  The memory backend keeps no schema; nothing to migrate.");
        return Ok(());
    }

    let url = &config.store.database_url;
    if !url.starts_with("sqlite:") {
        if let Some(parent) = std::path::Path::new(url).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut owners = owners;
    if let Some(owner) = &config.assistant.default_owner {
        if !owners.contains(owner) {
            owners.push(owner.clone());
        }
    }

    println!("🔄 Migrating {url}");
    provision(url, &owners).await?;
    println!("   ✅ Schema up to date");
    for owner in &owners {
        println!("   ✅ Owner provisioned: {owner}");
    }
    if owners.is_empty() {
        println!("   ⚠️  No owners provisioned; chats will answer with OWNER_UNPROVISIONED.");
        println!("      Pass --owner <id> or set assistant.default_owner.");
    }

    Ok(())
}

/// Bring the schema up to date and register every owner in `owners`.
async fn provision(url: &str, owners: &[String]) -> Result<SqliteStore, RepositoryError> {
    let store = SqliteStore::new(url).await?;
    for owner in owners {
        store.add_owner(&OwnerId::from(owner.as_str())).await?;
    }
    tracing::info!(owners = owners.len(), "Store provisioned");
    Ok(store)
}
