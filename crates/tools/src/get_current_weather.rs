//! Current-weather tool.
//!
//! Returns a fixed forecast so agent flows can be exercised end-to-end
//! without network access. Only the unit is validated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolResult};

pub const NAME: &str = "get_current_weather";

pub struct GetCurrentWeatherTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    location: String,
    #[serde(default)]
    unit: TemperatureUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub unit: TemperatureUnit,
    pub temperature: String,
    pub forecast: Vec<String>,
}

#[async_trait]
impl Tool for GetCurrentWeatherTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Get the current weather in a given location"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "enum": ["fahrenheit", "celsius"],
                    "description": "The unit of temperature",
                    "default": "fahrenheit"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: WeatherArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let report = WeatherReport {
            location: args.location,
            unit: args.unit,
            temperature: "60".into(),
            forecast: vec!["windy".into()],
        };

        let data = serde_json::to_value(&report).map_err(|e| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: data.to_string(),
            data: Some(data),
        })
    }
}
