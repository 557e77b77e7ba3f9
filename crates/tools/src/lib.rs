//! Built-in tool implementations for Stepwise.
//!
//! Tools give the agent the ability to reach outside the conversation:
//! look up the weather and query the CRM database.

pub mod get_current_weather;
pub mod query_database;
pub mod query_store;

use std::sync::Arc;
use stepwise_core::error::ToolError;
use stepwise_core::tool::ToolRegistry;

pub use get_current_weather::GetCurrentWeatherTool;
pub use query_database::QueryDatabaseTool;
pub use query_store::{QueryStore, Row};

#[cfg(feature = "sqlite")]
pub use query_store::SqliteQueryStore;

/// Create a registry with every built-in tool, in a stable order.
///
/// Agent policies pick their own tools out of it with
/// [`ToolRegistry::subset`].
pub fn default_registry(
    store: Arc<dyn QueryStore>,
    max_rows: usize,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(
        QueryDatabaseTool::new(store).with_max_rows(max_rows),
    ))?;
    registry.register(Arc::new(GetCurrentWeatherTool))?;
    Ok(registry)
}
