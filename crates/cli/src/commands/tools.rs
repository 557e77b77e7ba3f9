//! `stepwise tools` — list the tools offered to the model.

use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::tool::ToolRegistry;
use stepwise_tools::{SqliteQueryStore, default_registry};

use super::resolve_kind;

pub async fn run(agent: Option<String>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = SqliteQueryStore::open_lazy(&config.query.database_path)?;
    let registry = default_registry(Arc::new(store), config.query.max_rows)?;

    let registry = match agent.as_deref() {
        Some(name) => registry.subset(resolve_kind(Some(name), &config)?.tool_names())?,
        None => registry,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
    } else {
        print!("{}", render_list(&registry));
    }
    Ok(())
}

fn render_list(registry: &ToolRegistry) -> String {
    registry
        .definitions()
        .iter()
        .map(|d| format!("  {:<22} {}\n", d.name, d.description))
        .collect()
}
