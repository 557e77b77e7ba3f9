//! `stepwise query` — run SQL the way the model would.

use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::tool::ToolCall;
use stepwise_tools::{SqliteQueryStore, default_registry, query_database};
use tracing::debug;

pub async fn run(sql: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = SqliteQueryStore::open_lazy(&config.query.database_path)?;
    let registry = default_registry(Arc::new(store), config.query.max_rows)?;

    let call = ToolCall {
        id: "cli".into(),
        name: query_database::NAME.into(),
        arguments: serde_json::json!({ "query": sql }),
    };
    debug!(database = %config.query.database_path, "Running query");
    let result = registry.execute(&call).await?;

    match result.data {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("{}", result.output),
    }
    Ok(())
}
