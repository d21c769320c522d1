use crate::{
    domain::{ChatId, UserId},
    scope::ChatKind,
};

#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub chat_kind: ChatKind,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub name: String,
    /// Bot named in `/cmd@botname`, as typed.
    pub mention: Option<String>,
    pub args: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_kind: ChatKind,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub text: String,
}

impl IncomingUpdate {
    /// Classify a text message: a leading `/` makes it a command.
    pub fn from_text(
        chat_kind: ChatKind,
        chat_id: ChatId,
        user_id: UserId,
        username: Option<String>,
        text: &str,
    ) -> Self {
        if text.starts_with('/') {
            let (name, mention, args) = parse_command(text);
            return IncomingUpdate::Command(Command {
                chat_kind,
                chat_id,
                user_id,
                username,
                name,
                mention,
                args,
            });
        }
        IncomingUpdate::Text(TextMessage {
            chat_kind,
            chat_id,
            user_id,
            username,
            text: text.to_string(),
        })
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            IncomingUpdate::Command(c) => c.chat_id,
            IncomingUpdate::Text(t) => t.chat_id,
        }
    }
}

fn parse_command(text: &str) -> (String, Option<String>, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let (cmd, mention) = match first.trim_start_matches('/').split_once('@') {
        Some((cmd, bot)) => (cmd, Some(bot).filter(|b| !b.is_empty())),
        None => (first.trim_start_matches('/'), None),
    };

    (cmd.to_lowercase(), mention.map(str::to_string), rest)
}
