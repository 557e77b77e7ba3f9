//! Per-run state shared by every step of one engine run.

use std::sync::Arc;
use stepwise_core::error::{Error, Result};
use stepwise_core::message::Message;
use stepwise_core::provider::{Provider, ProviderRequest, ToolDefinition};
use stepwise_core::tool::ToolRegistry;
use tokio::sync::mpsc;

use super::event::Event;
use crate::history::ChatHistory;

/// Model parameters for every provider call of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
        }
    }
}

/// Counters updated as the run progresses, logged when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub steps: usize,
    pub provider_calls: usize,
    pub tool_calls: usize,
}

pub(crate) type EventSender = mpsc::Sender<Result<Event>>;

/// Everything a step may touch: history, collaborators, and the stream.
pub struct RunContext {
    pub history: ChatHistory,
    pub stats: RunStats,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    settings: ModelSettings,
    stream: Option<EventSender>,
}

impl RunContext {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        settings: ModelSettings,
        history: ChatHistory,
    ) -> Self {
        Self {
            history,
            stats: RunStats::default(),
            provider,
            tools,
            settings,
            stream: None,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub(crate) fn attach_stream(&mut self, tx: EventSender) {
        self.stream = Some(tx);
    }

    /// Push partial assistant text to the caller.
    ///
    /// A caller that stopped listening is not an error; the run carries on
    /// and its history is still finalized.
    pub async fn emit_delta(&self, text: impl Into<String>) {
        if let Some(tx) = &self.stream {
            let _ = tx.send(Ok(Event::StreamDelta { text: text.into() })).await;
        }
    }

    /// Visible history, failing when nothing can be shown to the model.
    pub fn visible_history(&mut self) -> Result<Vec<Message>> {
        let view = self.history.get()?;
        if view.is_empty() {
            return Err(Error::OutOfMemory);
        }
        Ok(view)
    }

    /// Build a provider request from the given messages.
    pub fn request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        stream: bool,
    ) -> ProviderRequest {
        ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            tools,
            stream,
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .field("history_len", &self.history.len())
            .field("stats", &self.stats)
            .finish()
    }
}
