//! Direct tool-calling loop.
//!
//! `Start → InitialTurn → RequestAssistantReply → (ToolCallsRequested →
//! RequestAssistantReply)* → Terminal`. There is no iteration cap; the
//! engine timeout bounds the loop.

use stepwise_core::error::Result;

use crate::engine::{Event, EventKind, RunLimits, StepEngine};
use crate::steps::{AssistantReply, DispatchTools, SeedHistory, Transition};

pub const NAME: &str = "tool_loop";

/// Build the tool loop. The tools offered are whatever the run context holds.
pub fn tool_loop(limits: RunLimits) -> Result<StepEngine> {
    StepEngine::builder(NAME)
        .step(SeedHistory)
        .step(Transition::new(
            "begin_turn",
            EventKind::InitialTurn,
            Event::RequestAssistantReply,
        ))
        .step(AssistantReply::with_tools(EventKind::RequestAssistantReply))
        .step(DispatchTools)
        .limits(limits)
        .build()
}
