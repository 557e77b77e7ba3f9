//! `stepwise flows` — print a policy's event routing.

use stepwise_agent::{RunLimits, StepEngine};
use stepwise_config::AppConfig;

use super::resolve_kind;

pub async fn run(agent: Option<String>, dot: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let kind = resolve_kind(agent.as_deref(), &config)?;
    let engine = kind.build_policy(RunLimits::from(&config.engine))?;

    if dot {
        print!("{}", engine.to_dot());
    } else {
        println!("{kind} ({})", engine.name());
        print!("{}", render_table(&engine));
    }
    Ok(())
}

fn render_table(engine: &StepEngine) -> String {
    let mut out = String::new();
    for edge in engine.describe() {
        let produces: Vec<String> = edge.produces.iter().map(|k| k.to_string()).collect();
        out.push_str(&format!(
            "  {:<20} {:<22} -> {}\n",
            edge.step,
            edge.consumes.to_string(),
            produces.join(" | ")
        ));
    }
    out
}
