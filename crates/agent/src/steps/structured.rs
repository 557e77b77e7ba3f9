//! Structured decisions from the model.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use stepwise_core::error::{ProviderError, Result};
use stepwise_core::provider::OutputSchema;

use crate::engine::RunContext;

/// A type the model can be asked to produce as JSON.
pub trait StructuredOutput: DeserializeOwned {
    fn schema_name() -> &'static str;

    fn schema() -> serde_json::Value;
}

/// Which approach the flowchart should take. Kept as a string so an
/// unexpected answer surfaces as an unknown-approach error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectedApproach {
    pub approach: String,
}

impl StructuredOutput for SelectedApproach {
    fn schema_name() -> &'static str {
        "SelectedApproach"
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "approach": {
                    "type": "string",
                    "enum": ["simple_answer", "semantic_search", "query_database"]
                }
            },
            "required": ["approach"]
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecideOnQuery {
    pub query: String,
}

impl StructuredOutput for DecideOnQuery {
    fn schema_name() -> &'static str {
        "DecideOnQuery"
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        })
    }
}

/// Ask the model for a `T` over the visible history.
pub async fn structured_output<T: StructuredOutput>(ctx: &mut RunContext) -> Result<T> {
    let view = ctx.visible_history()?;
    let request = ctx.request(view, Vec::new(), false);
    let provider = Arc::clone(ctx.provider());
    let schema = OutputSchema {
        name: T::schema_name().to_string(),
        schema: T::schema(),
    };

    ctx.stats.provider_calls += 1;
    let value = provider.structured(request, schema).await?;
    let parsed = serde_json::from_value(value).map_err(|e| {
        ProviderError::InvalidResponse(format!("expected {}: {e}", T::schema_name()))
    })?;
    Ok(parsed)
}
