use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation. `capabilities` reports the
/// adapter's message size limit, which `deliver` splits against.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Send text written in the platform's own markup (Telegram MarkdownV2).
    ///
    /// Text the platform refuses to parse is re-sent verbatim without markup.
    async fn send_markup(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
}
