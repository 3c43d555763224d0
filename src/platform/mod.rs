pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Keyboard attached to an outgoing reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMarkup {
    None,
    /// The two-button main menu
    MainMenu,
    /// Hide any custom keyboard the user currently sees
    RemoveKeyboard,
}

/// A message sent back to the user in the chat the event came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markup: ReplyMarkup,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::None,
        }
    }

    pub fn with_markup(text: impl Into<String>, markup: ReplyMarkup) -> Self {
        Self {
            text: text.into(),
            markup,
        }
    }
}

/// The chat an inbound event arrived on: where replies go and where
/// attachments are fetched from.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn send_reply(&self, reply: &Reply) -> Result<()>;

    /// Fetch the raw bytes of an attachment by its platform file id.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Split long messages for platform length limits.
/// Always returns at least one chunk.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // max_len is smaller than one char; take the whole char
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
