//! Tool dispatch.
//!
//! Tool failures never fail the run: they become `Tool` messages the model
//! can read and react to.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use stepwise_core::error::{Error, Result};
use stepwise_core::message::Message;
use stepwise_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, warn};

use crate::engine::{Event, EventKind, RunContext, Step};
use crate::history::ChatHistory;

/// Run `calls` in order and append one `Tool` message per call.
///
/// Messages are appended only after every call has finished, in call
/// order, and are also returned.
pub async fn dispatch(
    calls: &[ToolCall],
    registry: &ToolRegistry,
    history: &mut ChatHistory,
) -> Vec<Message> {
    let mut results = Vec::with_capacity(calls.len());

    for call in calls {
        let content = if registry.get(&call.name).is_none() {
            warn!(tool = %call.name, "Model requested an unknown tool");
            format!("Tool {} does not exist", call.name)
        } else {
            let started = Instant::now();
            match registry.execute(call).await {
                Ok(result) => {
                    debug!(
                        tool = %call.name,
                        success = result.success,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Tool call finished"
                    );
                    result.output
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    format!(
                        "Encountered error in tool call. You can try again with different inputs. But give up after 3 times.\nError: {e}"
                    )
                }
            }
        };
        results.push(Message::tool_result(&call.id, &call.name, content));
    }

    for message in &results {
        history.add(message.clone());
    }
    results
}

/// Executes requested tool calls and asks for the next reply.
pub struct DispatchTools;

#[async_trait]
impl Step for DispatchTools {
    fn name(&self) -> &str {
        "dispatch_tools"
    }

    fn consumes(&self) -> EventKind {
        EventKind::ToolCallsRequested
    }

    fn produces(&self) -> &[EventKind] {
        &[EventKind::RequestAssistantReply]
    }

    async fn run(&self, event: Event, ctx: &mut RunContext) -> Result<Event> {
        let Event::ToolCallsRequested { calls } = event else {
            return Err(Error::config("dispatch_tools expects ToolCallsRequested"));
        };
        let tools = Arc::clone(ctx.tools());
        dispatch(&calls, &tools, &mut ctx.history).await;
        ctx.stats.tool_calls += calls.len();
        Ok(Event::RequestAssistantReply)
    }
}
