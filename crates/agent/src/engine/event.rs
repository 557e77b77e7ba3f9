//! Events routed between steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stepwise_core::error::Error;
use stepwise_core::message::Message;
use stepwise_core::tool::ToolCall;

/// A transition produced by a step (or the seed passed to a run).
///
/// Only `Start` and `Terminal` carry history; every other step reads and
/// writes the run's [`ChatHistory`](crate::history::ChatHistory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Start { messages: Vec<Message> },
    InitialTurn,
    RequestAssistantReply,
    ToolCallsRequested { calls: Vec<ToolCall> },
    /// Partial assistant text. Forwarded to the caller, never routed.
    StreamDelta { text: String },
    Terminal { final_messages: Vec<Message> },
    PickApproach,
    ApproachChosen { approach: Approach },
    ChatApproach,
    SemanticApproach,
    QueryAttempt { attempt: u32 },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Start { .. } => EventKind::Start,
            Self::InitialTurn => EventKind::InitialTurn,
            Self::RequestAssistantReply => EventKind::RequestAssistantReply,
            Self::ToolCallsRequested { .. } => EventKind::ToolCallsRequested,
            Self::StreamDelta { .. } => EventKind::StreamDelta,
            Self::Terminal { .. } => EventKind::Terminal,
            Self::PickApproach => EventKind::PickApproach,
            Self::ApproachChosen { .. } => EventKind::ApproachChosen,
            Self::ChatApproach => EventKind::ChatApproach,
            Self::SemanticApproach => EventKind::SemanticApproach,
            Self::QueryAttempt { .. } => EventKind::QueryAttempt,
        }
    }
}

/// Routing tag of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Start,
    InitialTurn,
    RequestAssistantReply,
    ToolCallsRequested,
    StreamDelta,
    Terminal,
    PickApproach,
    ApproachChosen,
    ChatApproach,
    SemanticApproach,
    QueryAttempt,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the flowchart policy answers a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    SimpleAnswer,
    SemanticSearch,
    QueryDatabase,
}

impl Approach {
    pub const ALL: [Approach; 3] = [
        Approach::SimpleAnswer,
        Approach::SemanticSearch,
        Approach::QueryDatabase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleAnswer => "simple_answer",
            Self::SemanticSearch => "semantic_search",
            Self::QueryDatabase => "query_database",
        }
    }
}

impl FromStr for Approach {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::UnknownApproach(s.to_string()))
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Event::QueryAttempt { attempt: 3 }.kind(), EventKind::QueryAttempt);
        assert_eq!(
            Event::StreamDelta { text: "Ma".into() }.kind(),
            EventKind::StreamDelta
        );
    }

    #[test]
    fn approach_parses_known_names() {
        assert_eq!(
            "query_database".parse::<Approach>().unwrap(),
            Approach::QueryDatabase
        );
        let err = "ask_a_friend".parse::<Approach>().unwrap_err();
        assert!(matches!(err, Error::UnknownApproach(ref a) if a == "ask_a_friend"));
        assert!(err.is_configuration());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(Event::ApproachChosen {
            approach: Approach::SemanticSearch,
        })
        .unwrap();
        assert_eq!(json["type"], "approach_chosen");
        assert_eq!(json["approach"], "semantic_search");
    }
}
