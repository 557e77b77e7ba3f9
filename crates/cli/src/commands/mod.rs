pub mod config_cmd;
pub mod flows;
pub mod query;
pub mod tools;

use stepwise_agent::AgentKind;
use stepwise_config::AppConfig;

/// The agent kind named on the command line, or the configured one.
pub(crate) fn resolve_kind(
    agent: Option<&str>,
    config: &AppConfig,
) -> Result<AgentKind, stepwise_core::Error> {
    agent.unwrap_or(&config.agent).parse()
}
