//! Streaming assistant replies.

use async_trait::async_trait;
use std::sync::Arc;
use stepwise_core::error::{Error, Result};
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::ToolDefinition;
use stepwise_core::tool::ToolCall;
use tracing::debug;

use crate::engine::{Event, EventKind, RunContext, Step};

/// Stream one assistant reply over the visible history.
///
/// Every non-empty text chunk is emitted as a `StreamDelta`. Tool-call
/// deltas sharing an id are merged. Returns the assembled message without
/// adding it to history.
pub async fn stream_reply(ctx: &mut RunContext, tools: Vec<ToolDefinition>) -> Result<Message> {
    let view = ctx.visible_history()?;
    let request = ctx.request(view, tools, true);
    let provider = Arc::clone(ctx.provider());

    ctx.stats.provider_calls += 1;
    let mut rx = provider.stream(request).await?;

    let mut content = String::new();
    let mut tool_calls: Vec<MessageToolCall> = Vec::new();
    let mut chunks = 0usize;

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        chunks += 1;

        if let Some(text) = chunk.content
            && !text.is_empty()
        {
            content.push_str(&text);
            ctx.emit_delta(text).await;
        }

        for tc in chunk.tool_calls {
            if let Some(existing) = tool_calls.iter_mut().find(|t| t.id == tc.id) {
                existing.arguments.push_str(&tc.arguments);
            } else {
                tool_calls.push(tc);
            }
        }
    }

    if chunks == 0 {
        return Err(Error::NoResponse);
    }

    debug!(
        provider = provider.name(),
        chunks,
        chars = content.len(),
        tool_calls = tool_calls.len(),
        "Assistant reply streamed"
    );
    Ok(Message::assistant(content).with_tool_calls(tool_calls))
}

/// Convert the calls of an assistant message into executable tool calls.
///
/// Arguments that are not valid JSON are passed through as a string so the
/// tool rejects them and the model sees the error.
pub fn parse_tool_calls(calls: &[MessageToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .map(|c| ToolCall {
            id: c.id.clone(),
            name: c.name.clone(),
            arguments: parse_arguments(&c.arguments),
        })
        .collect()
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Asks the model for a reply and finishes the run, or hands off tool calls.
pub struct AssistantReply {
    name: &'static str,
    consumes: EventKind,
    produces: &'static [EventKind],
    offer_tools: bool,
}

impl AssistantReply {
    /// Reply with the run's tools offered to the model.
    pub fn with_tools(consumes: EventKind) -> Self {
        Self {
            name: "assistant_reply",
            consumes,
            produces: &[EventKind::ToolCallsRequested, EventKind::Terminal],
            offer_tools: true,
        }
    }

    /// Plain chat reply; always terminal.
    pub fn plain(consumes: EventKind) -> Self {
        Self {
            name: "chat_reply",
            consumes,
            produces: &[EventKind::Terminal],
            offer_tools: false,
        }
    }
}

#[async_trait]
impl Step for AssistantReply {
    fn name(&self) -> &str {
        self.name
    }

    fn consumes(&self) -> EventKind {
        self.consumes
    }

    fn produces(&self) -> &[EventKind] {
        self.produces
    }

    async fn run(&self, _event: Event, ctx: &mut RunContext) -> Result<Event> {
        let tools = if self.offer_tools {
            ctx.tools().definitions()
        } else {
            Vec::new()
        };

        let message = stream_reply(ctx, tools).await?;
        let calls = if self.offer_tools {
            parse_tool_calls(&message.tool_calls)
        } else {
            Vec::new()
        };
        ctx.history.add(message);

        if !calls.is_empty() {
            return Ok(Event::ToolCallsRequested { calls });
        }
        // Recovery rewrites an oversized reply in the log itself.
        ctx.history.get()?;
        Ok(Event::Terminal {
            final_messages: ctx.history.get_all().to_vec(),
        })
    }
}
