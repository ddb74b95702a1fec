//! Approximate token counting.
//!
//! A character-based heuristic (four characters per token plus a fixed
//! per-message overhead) used only to size histories relative to a budget.
//! It never talks to a tokenizer so it is cheap enough to run on every message
//! of every turn.

use crate::core_types::Message;

const CHARS_PER_TOKEN: usize = 4;
const TOKENS_PER_MESSAGE: usize = 3;

pub fn estimate_text(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn estimate_message(message: &Message) -> usize {
    let mut chars = message.content.chars().count() + message.role.as_str().len();
    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            chars += call.name.chars().count();
            chars += call.arguments.to_string().chars().count();
        }
    }
    if let Some(id) = &message.tool_call_id {
        chars += id.chars().count();
    }
    chars.div_ceil(CHARS_PER_TOKEN) + TOKENS_PER_MESSAGE
}

pub fn estimate_messages(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}
