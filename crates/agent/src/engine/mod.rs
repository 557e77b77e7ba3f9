//! The step engine — a small event-routed state machine.
//!
//! A policy is a set of [`Step`]s. Each step consumes exactly one
//! [`EventKind`] and declares the kinds it may produce. The builder checks
//! the routing table once, up front:
//!
//! - every kind has at most one consumer
//! - every produced kind other than `Terminal` has a consumer
//! - exactly one step consumes `Start` and some step produces `Terminal`
//! - `Terminal` and `StreamDelta` are never consumed, and `StreamDelta` is
//!   never a routed output
//!
//! A run drives one step at a time on a spawned task and forwards every
//! produced event (plus the `StreamDelta`s steps emit along the way) to an
//! [`EventStream`]. The run ends after the single `Terminal` event, or with
//! an error item when a step fails or the wall-clock timeout expires.

pub mod context;
pub mod event;

pub use context::{ModelSettings, RunContext, RunStats};
pub use event::{Approach, Event, EventKind};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stepwise_config::EngineConfig;
use stepwise_core::error::{Error, Result};
use stepwise_core::message::Message;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use context::EventSender;

/// Finite stream of a run's events. Not restartable.
pub type EventStream = ReceiverStream<Result<Event>>;

/// One node of a policy.
#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in logs and flow diagrams.
    fn name(&self) -> &str;

    /// The single event kind routed to this step.
    fn consumes(&self) -> EventKind;

    /// Every kind this step may return.
    fn produces(&self) -> &[EventKind];

    async fn run(&self, event: Event, ctx: &mut RunContext) -> Result<Event>;
}

/// Wall-clock and buffering limits of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub timeout: Duration,
    pub stream_capacity: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            stream_capacity: 128,
        }
    }
}

impl From<&EngineConfig> for RunLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            stream_capacity: config.stream_capacity,
        }
    }
}

/// What a finished run hands back.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub final_messages: Vec<Message>,
}

/// One edge group of the static flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub step: String,
    pub consumes: EventKind,
    pub produces: Vec<EventKind>,
}

pub struct StepEngine {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    routes: HashMap<EventKind, usize>,
    limits: RunLimits,
}

impl StepEngine {
    pub fn builder(name: impl Into<String>) -> StepEngineBuilder {
        StepEngineBuilder {
            name: name.into(),
            steps: Vec::new(),
            limits: RunLimits::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    /// Start a run on a new task and return its event stream.
    pub fn run(self, start_messages: Vec<Message>, mut ctx: RunContext) -> EventStream {
        let (tx, rx) = mpsc::channel(self.limits.stream_capacity);
        ctx.attach_stream(tx.clone());

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome =
                tokio::time::timeout(self.limits.timeout, self.drive(start_messages, &mut ctx, &tx))
                    .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(Error::Timeout {
                    limit: self.limits.timeout,
                }),
            };

            match failure {
                None => info!(
                    policy = %self.name,
                    steps = ctx.stats.steps,
                    provider_calls = ctx.stats.provider_calls,
                    tool_calls = ctx.stats.tool_calls,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Run finished"
                ),
                Some(e) => {
                    warn!(policy = %self.name, error = %e, steps = ctx.stats.steps, "Run failed");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Run and drain the stream, returning the terminal history.
    pub async fn run_to_completion(
        self,
        start_messages: Vec<Message>,
        ctx: RunContext,
    ) -> Result<RunResult> {
        let mut stream = self.run(start_messages, ctx);
        while let Some(item) = stream.next().await {
            if let Event::Terminal { final_messages } = item? {
                return Ok(RunResult { final_messages });
            }
        }
        Err(Error::Internal("run ended without a terminal event".into()))
    }

    async fn drive(
        &self,
        start_messages: Vec<Message>,
        ctx: &mut RunContext,
        tx: &EventSender,
    ) -> Result<()> {
        let mut event = Event::Start {
            messages: start_messages,
        };

        loop {
            let step = self.consumer_of(event.kind())?;
            ctx.stats.steps += 1;
            debug!(policy = %self.name, step = step.name(), event = %event.kind(), "Running step");

            let next = step.run(event, ctx).await?;
            let kind = next.kind();
            if !step.produces().contains(&kind) {
                return Err(Error::config(format!(
                    "step '{}' returned undeclared event {kind}",
                    step.name()
                )));
            }

            if kind == EventKind::Terminal {
                let _ = tx.send(Ok(next)).await;
                return Ok(());
            }
            if tx.send(Ok(next.clone())).await.is_err() {
                debug!(policy = %self.name, "Event stream closed by consumer");
                return Ok(());
            }
            event = next;
        }
    }

    fn consumer_of(&self, kind: EventKind) -> Result<Arc<dyn Step>> {
        self.routes
            .get(&kind)
            .map(|&i| Arc::clone(&self.steps[i]))
            .ok_or_else(|| Error::config(format!("no step consumes {kind}")))
    }

    /// The static flow graph, in registration order.
    pub fn describe(&self) -> Vec<FlowEdge> {
        self.steps
            .iter()
            .map(|s| FlowEdge {
                step: s.name().to_string(),
                consumes: s.consumes(),
                produces: s.produces().to_vec(),
            })
            .collect()
    }

    /// Render the flow graph as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let mut out = format!("digraph \"{}\" {{\n    rankdir=TB;\n", self.name);
        for edge in self.describe() {
            for produced in &edge.produces {
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\" [label=\"{}\"];",
                    edge.consumes, produced, edge.step
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

impl std::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEngine")
            .field("name", &self.name)
            .field("steps", &self.describe())
            .field("limits", &self.limits)
            .finish()
    }
}

pub struct StepEngineBuilder {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    limits: RunLimits,
}

impl StepEngineBuilder {
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    /// Validate the routing table and build the engine.
    pub fn build(self) -> Result<StepEngine> {
        let name = self.name;
        let bad = |msg: String| Error::config(format!("policy '{name}': {msg}"));

        if self.limits.stream_capacity == 0 {
            return Err(bad("stream capacity must be > 0".into()));
        }

        let mut routes = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            let kind = step.consumes();
            if matches!(kind, EventKind::Terminal | EventKind::StreamDelta) {
                return Err(bad(format!("step '{}' consumes {kind}", step.name())));
            }
            if step.produces().is_empty() {
                return Err(bad(format!("step '{}' declares no outputs", step.name())));
            }
            if step.produces().contains(&EventKind::StreamDelta) {
                return Err(bad(format!(
                    "step '{}' declares StreamDelta as a routed output",
                    step.name()
                )));
            }
            if let Some(&j) = routes.get(&kind) {
                let other: &Arc<dyn Step> = &self.steps[j];
                return Err(bad(format!(
                    "steps '{}' and '{}' both consume {kind}",
                    other.name(),
                    step.name()
                )));
            }
            routes.insert(kind, i);
        }

        if !routes.contains_key(&EventKind::Start) {
            return Err(bad("no step consumes Start".into()));
        }

        let mut terminates = false;
        for step in &self.steps {
            for &produced in step.produces() {
                if produced == EventKind::Terminal {
                    terminates = true;
                } else if !routes.contains_key(&produced) {
                    return Err(bad(format!(
                        "step '{}' produces {produced} but nothing consumes it",
                        step.name()
                    )));
                }
            }
        }
        if !terminates {
            return Err(bad("no step produces Terminal".into()));
        }

        debug!(policy = %name, steps = self.steps.len(), "Step engine built");
        Ok(StepEngine {
            name,
            steps: self.steps,
            routes,
            limits: self.limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ChatHistory, TokenBudget};
    use crate::test_helpers::ScriptedProvider;
    use stepwise_core::tool::ToolRegistry;

    /// Returns a fixed event; optionally emits a delta first.
    struct Fixed {
        name: &'static str,
        consumes: EventKind,
        produces: Vec<EventKind>,
        next: Event,
        delta: Option<&'static str>,
    }

    fn fixed(name: &'static str, consumes: EventKind, next: Event) -> Fixed {
        Fixed {
            name,
            consumes,
            produces: vec![next.kind()],
            next,
            delta: None,
        }
    }

    #[async_trait]
    impl Step for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn consumes(&self) -> EventKind {
            self.consumes
        }
        fn produces(&self) -> &[EventKind] {
            &self.produces
        }
        async fn run(&self, _event: Event, ctx: &mut RunContext) -> Result<Event> {
            if let Some(delta) = self.delta {
                ctx.emit_delta(delta).await;
            }
            Ok(self.next.clone())
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Step for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }
        fn consumes(&self) -> EventKind {
            EventKind::InitialTurn
        }
        fn produces(&self) -> &[EventKind] {
            &[EventKind::Terminal]
        }
        async fn run(&self, _event: Event, _ctx: &mut RunContext) -> Result<Event> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Event::Terminal {
                final_messages: vec![],
            })
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(
            Arc::new(ScriptedProvider::new(vec![])),
            Arc::new(ToolRegistry::new()),
            ModelSettings::default(),
            ChatHistory::new(TokenBudget::default()),
        )
    }

    fn terminal() -> Event {
        Event::Terminal {
            final_messages: vec![Message::assistant("done")],
        }
    }

    fn config_message(result: Result<StepEngine>) -> String {
        match result {
            Err(e @ Error::Config { .. }) => e.to_string(),
            Err(other) => panic!("expected config error, got {other}"),
            Ok(_) => panic!("expected config error, got an engine"),
        }
    }

    #[test]
    fn rejects_two_consumers_of_one_kind() {
        let msg = config_message(
            StepEngine::builder("dup")
                .step(fixed("a", EventKind::Start, terminal()))
                .step(fixed("b", EventKind::Start, terminal()))
                .build(),
        );
        assert!(msg.contains("both consume Start"));
    }

    #[test]
    fn rejects_unconsumed_output() {
        let msg = config_message(
            StepEngine::builder("dangling")
                .step(fixed("a", EventKind::Start, Event::PickApproach))
                .step(fixed("b", EventKind::InitialTurn, terminal()))
                .build(),
        );
        assert!(msg.contains("PickApproach"));
    }

    #[test]
    fn rejects_consuming_terminal_or_delta() {
        for kind in [EventKind::Terminal, EventKind::StreamDelta] {
            let msg = config_message(
                StepEngine::builder("bad")
                    .step(fixed("a", EventKind::Start, terminal()))
                    .step(fixed("b", kind, terminal()))
                    .build(),
            );
            assert!(msg.contains("consumes"));
        }
    }

    #[test]
    fn rejects_delta_as_routed_output() {
        let msg = config_message(
            StepEngine::builder("bad")
                .step(fixed(
                    "a",
                    EventKind::Start,
                    Event::StreamDelta { text: "x".into() },
                ))
                .build(),
        );
        assert!(msg.contains("StreamDelta"));
    }

    #[test]
    fn rejects_missing_start_and_terminal() {
        let msg = config_message(
            StepEngine::builder("no-start")
                .step(fixed("a", EventKind::InitialTurn, terminal()))
                .build(),
        );
        assert!(msg.contains("Start"));

        let msg = config_message(
            StepEngine::builder("no-end")
                .step(fixed("a", EventKind::Start, Event::InitialTurn))
                .step(fixed("b", EventKind::InitialTurn, Event::InitialTurn))
                .build(),
        );
        assert!(msg.contains("Terminal"));
    }

    #[tokio::test]
    async fn run_forwards_events_and_deltas_in_order() {
        let mut seed = fixed("seed", EventKind::Start, Event::InitialTurn);
        seed.delta = Some("Hel");
        let mut answer = fixed("answer", EventKind::InitialTurn, terminal());
        answer.delta = Some("lo");

        let engine = StepEngine::builder("two-step")
            .step(seed)
            .step(answer)
            .build()
            .unwrap();

        let events: Vec<_> = engine
            .run(vec![Message::user("hi")], ctx())
            .map(|e| e.unwrap().kind())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                EventKind::StreamDelta,
                EventKind::InitialTurn,
                EventKind::StreamDelta,
                EventKind::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn undeclared_output_fails_the_run() {
        let mut liar = fixed("liar", EventKind::Start, Event::InitialTurn);
        liar.next = Event::PickApproach;
        let engine = StepEngine::builder("liar")
            .step(liar)
            .step(fixed("end", EventKind::InitialTurn, terminal()))
            .build()
            .unwrap();

        let err = engine
            .run_to_completion(vec![], ctx())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("undeclared"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_error_and_no_terminal() {
        let engine = StepEngine::builder("slow")
            .step(fixed("seed", EventKind::Start, Event::InitialTurn))
            .step(Sleeper)
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap();

        let items: Vec<_> = engine.run(vec![], ctx()).collect().await;
        assert!(
            items
                .iter()
                .all(|i| !matches!(i, Ok(Event::Terminal { .. })))
        );
        assert!(matches!(
            items.last(),
            Some(Err(Error::Timeout { limit })) if *limit == Duration::from_secs(120)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_is_reported_exactly() {
        let engine = StepEngine::builder("slow")
            .step(fixed("seed", EventKind::Start, Event::InitialTurn))
            .step(Sleeper)
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();

        let err = engine.run_to_completion(vec![], ctx()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { limit } if limit == Duration::from_millis(500)));
        assert!(err.to_string().ends_with("500ms"));
    }

    #[test]
    fn dot_lists_every_edge() {
        let engine = StepEngine::builder("tiny")
            .step(fixed("seed", EventKind::Start, Event::InitialTurn))
            .step(fixed("end", EventKind::InitialTurn, terminal()))
            .build()
            .unwrap();

        let dot = engine.to_dot();
        assert!(dot.starts_with("digraph \"tiny\""));
        assert!(dot.contains("\"Start\" -> \"InitialTurn\" [label=\"seed\"];"));
        assert!(dot.contains("\"InitialTurn\" -> \"Terminal\" [label=\"end\"];"));
        assert_eq!(engine.describe().len(), 2);
    }
}
