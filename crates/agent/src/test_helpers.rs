//! Shared test helpers for engine, step, and policy tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use stepwise_core::error::{ProviderError, ToolError};
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{
    ChunkReceiver, OutputSchema, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};
use stepwise_core::tool::ToolRegistry;
use stepwise_tools::{GetCurrentWeatherTool, QueryDatabaseTool, QueryStore, Row};
use tokio::sync::mpsc;

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer to `stream()` (or `complete()`, concatenated).
    Chunks(Vec<StreamChunk>),
    /// Answer to `structured()`.
    Structured(serde_json::Value),
    /// Fail whichever call comes next.
    Fail(ProviderError),
}

/// A mock provider that plays back a script, one entry per call.
///
/// Panics if more calls are made than entries provided, or if the entry
/// does not match the kind of call.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A text reply streamed one word at a time.
    pub fn text(text: &str) -> Scripted {
        let mut chunks: Vec<StreamChunk> = text
            .split_inclusive(' ')
            .map(|w| StreamChunk {
                content: Some(w.to_string()),
                ..Default::default()
            })
            .collect();
        if let Some(last) = chunks.last_mut() {
            last.done = true;
        }
        Scripted::Chunks(chunks)
    }

    /// A reply that only requests tool calls.
    pub fn tool_calls(calls: Vec<MessageToolCall>) -> Scripted {
        Scripted::Chunks(vec![StreamChunk {
            content: None,
            tool_calls: calls,
            done: true,
            usage: None,
        }])
    }

    pub fn structured(value: serde_json::Value) -> Scripted {
        Scripted::Structured(value)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn next(&self, request: ProviderRequest) -> Scripted {
        let mut script = self.script.lock().unwrap();
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        script.pop_front().unwrap_or_else(|| {
            panic!(
                "ScriptedProvider: no more responses (call #{})",
                requests.len()
            )
        })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Scripted::Chunks(chunks) => {
                let mut message =
                    Message::assistant(chunks.iter().filter_map(|c| c.content.clone()).collect::<String>());
                message.tool_calls = chunks.into_iter().flat_map(|c| c.tool_calls).collect();
                Ok(ProviderResponse {
                    message,
                    usage: None,
                    model: "mock-model".into(),
                })
            }
            Scripted::Fail(e) => Err(e),
            other => panic!("ScriptedProvider: complete() got {other:?}"),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        match self.next(request) {
            Scripted::Chunks(chunks) => {
                let (tx, rx) = mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    let _ = tx.send(Ok(chunk)).await;
                }
                Ok(rx)
            }
            Scripted::Fail(e) => Err(e),
            other => panic!("ScriptedProvider: stream() got {other:?}"),
        }
    }

    async fn structured(
        &self,
        request: ProviderRequest,
        _schema: OutputSchema,
    ) -> Result<serde_json::Value, ProviderError> {
        match self.next(request) {
            Scripted::Structured(value) => Ok(value),
            Scripted::Fail(e) => Err(e),
            other => panic!("ScriptedProvider: structured() got {other:?}"),
        }
    }
}

/// Helper to create a tool call.
pub fn tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// A query store that answers from a script, one entry per query.
pub struct ScriptedStore {
    answers: Mutex<VecDeque<Result<Vec<Row>, String>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new(answers: Vec<Result<Vec<Row>, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ToolError> {
        self.queries.lock().unwrap().push(sql.to_string());
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        answer.map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "query_database".into(),
            reason,
        })
    }
}

/// A single-column row.
pub fn row(column: &str, value: serde_json::Value) -> Row {
    let mut row = Row::new();
    row.insert(column.into(), value);
    row
}

/// Registry with the query tool over `store` and the weather tool.
pub fn registry_with(store: Arc<ScriptedStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(QueryDatabaseTool::new(store)))
        .unwrap();
    registry.register(Arc::new(GetCurrentWeatherTool)).unwrap();
    registry
}
