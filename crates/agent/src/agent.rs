//! The agent facade — what a chat front end talks to.
//!
//! An [`Agent`] owns the message list of one conversation. Each turn builds
//! a fresh policy engine, seeds it with the stored messages plus the new
//! user message, streams the reply text back, and stores the history the
//! policy hands back on `Terminal`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::error::{Error, Result};
use stepwise_core::message::Message;
use stepwise_core::provider::Provider;
use stepwise_core::tool::ToolRegistry;
use stepwise_tools::{get_current_weather, query_database};
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::engine::{Event, EventStream, ModelSettings, RunContext, RunLimits, StepEngine};
use crate::history::{ChatHistory, TokenBudget};
use crate::policies::{flowchart, tool_loop};

const DEFAULT_PROMPT: &str = "You are a helpful assistant.";
const WELCOME_MESSAGE: &str = "How can I help you?";

/// The agent variants on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// Tool loop over the query tool.
    ToolRouter,
    /// Approach selection with bounded query retries.
    Flowchart,
    /// Tool loop over the weather tool.
    Weather,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::ToolRouter, AgentKind::Flowchart, AgentKind::Weather];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ToolRouter => "tool_router",
            Self::Flowchart => "flowchart",
            Self::Weather => "weather",
        }
    }

    /// Messages every new conversation starts with.
    pub fn initial_prompt(&self) -> Vec<Message> {
        match self {
            Self::ToolRouter | Self::Flowchart => vec![Message::system(format!(
                "You are a helpful assistant working with CRM data to help the user navigate it.\n\
                 You have various tools available to you.\n\n\
                 All queries should get a limit of 10 or less rows to not break the system.\n\
                 -----\n{}\n-----",
                query_database::PROMPT_DESCRIPTION
            ))],
            Self::Weather => vec![Message::system(DEFAULT_PROMPT)],
        }
    }

    pub fn welcome_message(&self) -> Option<&'static str> {
        Some(WELCOME_MESSAGE)
    }

    /// Names of the tools this agent's runs may use.
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            Self::ToolRouter | Self::Flowchart => &[query_database::NAME],
            Self::Weather => &[get_current_weather::NAME],
        }
    }

    /// A fresh policy engine for one turn.
    pub fn build_policy(&self, limits: RunLimits) -> Result<StepEngine> {
        match self {
            Self::ToolRouter | Self::Weather => tool_loop(limits),
            Self::Flowchart => flowchart(limits),
        }
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::config(format!("unknown agent kind '{s}'")))
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Model and run settings shared by every turn of an agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSettings {
    pub model: ModelSettings,
    pub budget: TokenBudget,
    pub limits: RunLimits,
}

impl From<&AppConfig> for AgentSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: ModelSettings {
                model: config.default_model.clone(),
                temperature: config.default_temperature,
            },
            budget: TokenBudget {
                max_tokens: config.history.max_tokens,
            },
            limits: RunLimits::from(&config.engine),
        }
    }
}

pub struct Agent {
    kind: AgentKind,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
    messages: Vec<Message>,
}

impl Agent {
    /// Create an agent seeded with its kind's initial prompt.
    ///
    /// `tools` may hold more than the kind needs; the agent keeps only its own.
    pub fn new(
        kind: AgentKind,
        provider: Arc<dyn Provider>,
        tools: &ToolRegistry,
        settings: AgentSettings,
    ) -> Result<Self> {
        let tools = tools.subset(kind.tool_names())?;
        Ok(Self {
            kind,
            provider,
            tools: Arc::new(tools),
            settings,
            messages: kind.initial_prompt(),
        })
    }

    /// Replace the stored messages, e.g. to resume a saved conversation.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Start a turn and stream the reply text.
    ///
    /// The stored messages change only when the turn reaches `Terminal`.
    pub fn stream_turn(&mut self, input: impl Into<String>) -> Result<TurnStream<'_>> {
        let engine = self.kind.build_policy(self.settings.limits)?;
        let mut seed = self.messages.clone();
        seed.push(Message::user(input));

        let ctx = RunContext::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            self.settings.model.clone(),
            ChatHistory::new(self.settings.budget),
        );
        info!(agent = %self.kind, messages = seed.len(), "Turn started");

        Ok(TurnStream {
            events: engine.run(seed, ctx),
            messages: &mut self.messages,
        })
    }

    /// Run a turn to the end and return the concatenated reply.
    pub async fn answer(&mut self, input: impl Into<String>) -> Result<String> {
        let mut stream = self.stream_turn(input)?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }

    /// One-shot question against a fresh agent of `kind`.
    pub async fn answer_from_query(
        kind: AgentKind,
        provider: Arc<dyn Provider>,
        tools: &ToolRegistry,
        settings: AgentSettings,
        query: &str,
    ) -> Result<String> {
        Self::new(kind, provider, tools, settings)?.answer(query).await
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("kind", &self.kind)
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("messages", &self.messages.len())
            .finish()
    }
}

/// Reply text of one turn. Finite and not restartable.
pub struct TurnStream<'a> {
    events: EventStream,
    messages: &'a mut Vec<Message>,
}

impl TurnStream<'_> {
    /// Next text fragment, or `None` once the turn is over.
    pub async fn next(&mut self) -> Option<Result<String>> {
        while let Some(item) = self.events.next().await {
            match item {
                Ok(Event::StreamDelta { text }) => return Some(Ok(text)),
                Ok(Event::Terminal { final_messages }) => {
                    debug!(messages = final_messages.len(), "Turn finished");
                    *self.messages = final_messages;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
