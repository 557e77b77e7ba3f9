//! Reusable steps shared by the agent policies.

pub mod dispatch;
pub mod reply;
pub mod structured;

pub use dispatch::{DispatchTools, dispatch};
pub use reply::{AssistantReply, stream_reply};
pub use structured::{DecideOnQuery, SelectedApproach, StructuredOutput, structured_output};

use async_trait::async_trait;
use stepwise_core::error::{Error, Result};

use crate::engine::{Event, EventKind, RunContext, Step};

/// Seeds the run's history from the `Start` event.
pub struct SeedHistory;

#[async_trait]
impl Step for SeedHistory {
    fn name(&self) -> &str {
        "seed_history"
    }

    fn consumes(&self) -> EventKind {
        EventKind::Start
    }

    fn produces(&self) -> &[EventKind] {
        &[EventKind::InitialTurn]
    }

    async fn run(&self, event: Event, ctx: &mut RunContext) -> Result<Event> {
        let Event::Start { messages } = event else {
            return Err(Error::config("seed_history expects Start"));
        };
        for message in messages {
            ctx.history.add(message);
        }
        Ok(Event::InitialTurn)
    }
}

/// Moves from one event to another without side effects.
pub struct Transition {
    name: &'static str,
    from: EventKind,
    to: [EventKind; 1],
    next: Event,
}

impl Transition {
    pub fn new(name: &'static str, from: EventKind, next: Event) -> Self {
        Self {
            name,
            from,
            to: [next.kind()],
            next,
        }
    }
}

#[async_trait]
impl Step for Transition {
    fn name(&self) -> &str {
        self.name
    }

    fn consumes(&self) -> EventKind {
        self.from
    }

    fn produces(&self) -> &[EventKind] {
        &self.to
    }

    async fn run(&self, _event: Event, _ctx: &mut RunContext) -> Result<Event> {
        Ok(self.next.clone())
    }
}
