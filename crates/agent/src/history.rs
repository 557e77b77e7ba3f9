//! Bounded chat history with overflow recovery.
//!
//! The full log is kept for recovery; callers only ever see the visible
//! view, which is the newest suffix of the log that fits the token budget.
//! When even the newest message does not fit, it is replaced by a short
//! notice of the same role so the conversation can continue.

use stepwise_core::error::{Error, Result};
use stepwise_core::message::{Message, Role};
use tracing::warn;

use crate::token::estimate_message_tokens;

/// Content of the message that replaces an oversized one.
pub const OUT_OF_MEMORY_NOTICE: &str = "Error: Ran out of memory. This message was too long.";

/// Maximum estimated tokens in the visible view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_tokens: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self { max_tokens: 3000 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Vec<Message>,
    budget: TokenBudget,
}

impl ChatHistory {
    pub fn new(budget: TokenBudget) -> Self {
        Self {
            messages: Vec::new(),
            budget,
        }
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Append a message to the full log.
    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The visible view, recovering from an oversized tail if needed.
    ///
    /// Each recovery round replaces the last message with
    /// [`OUT_OF_MEMORY_NOTICE`]. Fails with [`Error::OutOfMemory`] once the
    /// notice itself does not fit.
    pub fn get(&mut self) -> Result<Vec<Message>> {
        loop {
            let view = self.visible();
            if !view.is_empty() || self.messages.is_empty() {
                return Ok(view);
            }

            let Some(last) = self.messages.pop() else {
                return Err(Error::OutOfMemory);
            };
            if last.content == OUT_OF_MEMORY_NOTICE && last.tool_calls.is_empty() {
                self.messages.push(last);
                return Err(Error::OutOfMemory);
            }

            warn!(
                role = %last.role,
                chars = last.content.len(),
                budget = self.budget.max_tokens,
                "Newest message exceeds the history budget, replacing it"
            );
            let mut notice = Message::new(last.role, OUT_OF_MEMORY_NOTICE);
            notice.tool_call_id = last.tool_call_id;
            notice.tool_name = last.tool_name;
            self.messages.push(notice);
        }
    }

    /// The full log, including messages outside the budget.
    pub fn get_all(&self) -> &[Message] {
        &self.messages
    }

    /// Replace the full log.
    pub fn set(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn visible(&self) -> Vec<Message> {
        let mut used = 0;
        let mut start = self.messages.len();
        for (i, message) in self.messages.iter().enumerate().rev() {
            let cost = estimate_message_tokens(message);
            if used + cost > self.budget.max_tokens {
                break;
            }
            used += cost;
            start = i;
        }
        // Never open on tool traffic whose request fell outside the window.
        while let Some(message) = self.messages.get(start)
            && (message.role == Role::Tool
                || (message.role == Role::Assistant && !message.tool_calls.is_empty()))
        {
            start += 1;
        }
        self.messages[start..].to_vec()
    }
}
