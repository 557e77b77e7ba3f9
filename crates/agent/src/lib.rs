//! Step-based agent orchestration for Stepwise.
//!
//! A turn runs as a small event-routed state machine:
//!
//! 1. **Seed** the run's history with the conversation so far
//! 2. **Step** through the policy graph, one event at a time
//! 3. **Stream** assistant text to the caller as it arrives
//! 4. **Dispatch** tool calls and feed their results back into history
//! 5. **Finish** with a single `Terminal` event carrying the final history
//!
//! The history window is bounded by a token budget and recovers from
//! oversized messages. A wall-clock timeout bounds every run.

pub mod agent;
pub mod engine;
pub mod history;
pub mod policies;
pub mod steps;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, AgentKind, AgentSettings, TurnStream};
pub use engine::{
    Approach, Event, EventKind, EventStream, FlowEdge, ModelSettings, RunContext, RunLimits,
    RunResult, RunStats, Step, StepEngine,
};
pub use history::{ChatHistory, OUT_OF_MEMORY_NOTICE, TokenBudget};
pub use steps::dispatch;
