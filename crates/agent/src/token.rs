//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. It is close
//! enough for budgeting the history window and keeps tests predictable.

use stepwise_core::message::Message;

/// Fixed cost per message for role markers and delimiters.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Tool-call names and arguments count too, since they are sent back to
/// the model with the assistant message.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments))
        .sum();
    MESSAGE_OVERHEAD + estimate_tokens(&message.content) + calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::message::MessageToolCall;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn message_includes_overhead() {
        let msg = Message::user("test"); // 1 token + 4 overhead
        assert_eq!(estimate_message_tokens(&msg), 5);
    }

    #[test]
    fn tool_calls_are_counted() {
        let msg = Message::assistant("").with_tool_calls(vec![MessageToolCall {
            id: "call_1".into(),
            name: "get_current_weather".into(), // 19 chars -> 5
            arguments: r#"{"location":"Boston"}"#.into(), // 21 chars -> 6
        }]);
        assert_eq!(estimate_message_tokens(&msg), 4 + 5 + 6);
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![
            Message::user("hello"),     // 2 + 4 = 6
            Message::assistant("hi!!"), // 1 + 4 = 5
        ];
        assert_eq!(estimate_messages_tokens(&msgs), 11);
    }
}
