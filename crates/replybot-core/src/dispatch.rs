//! Routes incoming updates to the registry / news port and renders replies.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    domain::ChatId,
    formatting::{escape_html, render_command_list_html, split_message},
    messaging::{
        port::MessagingPort,
        types::{Command, IncomingUpdate, TextMessage},
    },
    news::{render_news_html, NewsSource},
    registry::{parse_add_args, CommandRegistry, Listing, MatchOutcome, RegistryError},
    scope::Scope,
    utils::{AuditEvent, AuditLogger},
    Result,
};

const HELP_TEXT: &str = "Here are the commands you can use:\n\
/addcommand \"<command>\" <answer> - Save a custom command (admins only).\n\
/mycommands - List your saved commands (admins only).\n\
/deletecommand <command> - Delete a saved command (admins only).\n\
/theblazetimes - Get the latest news from Blaze Times.";

/// What to send back for one update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Bot-generated text, already escaped for Telegram HTML.
    Html(String),
    /// A stored response, sent in the platform's own markup.
    Markup(String),
    None,
}

pub struct BotService {
    registry: Arc<CommandRegistry>,
    news: Arc<dyn NewsSource>,
    news_max_items: usize,
    audit: Option<Arc<AuditLogger>>,
    bot_username: Option<String>,
}

impl BotService {
    pub fn new(
        registry: Arc<CommandRegistry>,
        news: Arc<dyn NewsSource>,
        news_max_items: usize,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            registry,
            news,
            news_max_items,
            audit,
            bot_username: None,
        }
    }

    /// Our own username; commands mentioning any other bot are ignored.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    pub async fn handle(&self, update: &IncomingUpdate) -> Reply {
        match update {
            IncomingUpdate::Command(cmd) => self.handle_command(cmd).await,
            IncomingUpdate::Text(msg) => self.handle_text(msg).await,
        }
    }

    async fn handle_command(&self, cmd: &Command) -> Reply {
        if !self.is_addressed_to_us(cmd) {
            debug!(command = %cmd.name, mention = ?cmd.mention, "command for another bot");
            return Reply::None;
        }
        let scope = Scope::resolve(cmd.chat_kind, cmd.chat_id);

        match cmd.name.as_str() {
            "start" => {
                info!(user_id = cmd.user_id.0, "user started the bot");
                Reply::Html("Welcome! Use /help to see available commands.".to_string())
            }
            "help" => Reply::Html(escape_html(HELP_TEXT)),
            "addcommand" => self.add_command(&scope, cmd).await,
            "mycommands" => self.list_commands(&scope, cmd).await,
            "deletecommand" => self.delete_command(&scope, cmd).await,
            "theblazetimes" | "news" => self.news().await,
            other => {
                if scope.is_group() {
                    // Other bots in the chat own their commands.
                    return Reply::None;
                }
                Reply::Html(format!("Unknown command: /{}", escape_html(other)))
            }
        }
    }

    /// Unmentioned commands are ours. A mention must name us, unless we do
    /// not know our own username.
    fn is_addressed_to_us(&self, cmd: &Command) -> bool {
        match (&cmd.mention, &self.bot_username) {
            (Some(mention), Some(me)) => mention.eq_ignore_ascii_case(me),
            _ => true,
        }
    }

    async fn add_command(&self, scope: &Scope, cmd: &Command) -> Reply {
        let result = match parse_add_args(&cmd.args) {
            Ok((trigger, response)) => {
                self.registry
                    .add(scope, cmd.user_id, &trigger, &response)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(stored) => {
                self.audit(AuditEvent::command_added(
                    scope,
                    cmd.user_id.0,
                    cmd.username.as_deref(),
                    &stored.trigger,
                    &stored.response,
                ));
                Reply::Html(format!(
                    "Command '{}' saved:\n\n{}",
                    escape_html(&stored.trigger),
                    escape_html(&stored.response)
                ))
            }
            Err(RegistryError::InvalidFormat) => Reply::Html(escape_html(
                "Invalid format. Use:\n/addcommand \"<command>\" <answer>",
            )),
            Err(RegistryError::Unauthorized) => {
                self.audit_denied(scope, cmd, "add", "unauthorized");
                Reply::Html("Only admins can add commands.".to_string())
            }
            Err(e) => self.failure_reply(scope, cmd, "add", e),
        }
    }

    async fn list_commands(&self, scope: &Scope, cmd: &Command) -> Reply {
        match self.registry.list(scope, cmd.user_id).await {
            Ok(Listing::Empty) => Reply::Html("No commands found.".to_string()),
            Ok(Listing::Commands(commands)) => Reply::Html(render_command_list_html(&commands)),
            Err(RegistryError::Unauthorized) => {
                self.audit_denied(scope, cmd, "list", "unauthorized");
                Reply::Html("Only admins can view commands.".to_string())
            }
            Err(e) => self.failure_reply(scope, cmd, "list", e),
        }
    }

    async fn delete_command(&self, scope: &Scope, cmd: &Command) -> Reply {
        match self.registry.delete(scope, cmd.user_id, &cmd.args).await {
            Ok(deleted) => {
                self.audit(AuditEvent::command_deleted(
                    scope,
                    cmd.user_id.0,
                    cmd.username.as_deref(),
                    &deleted.trigger,
                ));
                Reply::Html(format!(
                    "Command '{}' has been deleted.",
                    escape_html(&deleted.trigger)
                ))
            }
            Err(RegistryError::NotFound(trigger)) => Reply::Html(format!(
                "Command '{}' not found.",
                escape_html(&trigger)
            )),
            Err(RegistryError::InvalidFormat) => {
                Reply::Html(escape_html("Usage: /deletecommand <command>"))
            }
            Err(RegistryError::Unauthorized) => {
                self.audit_denied(scope, cmd, "delete", "unauthorized");
                Reply::Html("Only admins can delete commands.".to_string())
            }
            Err(e) => self.failure_reply(scope, cmd, "delete", e),
        }
    }

    async fn news(&self) -> Reply {
        match self.news.fetch_latest(self.news_max_items).await {
            Ok(items) => Reply::Html(render_news_html(&items)),
            Err(e) => {
                warn!(error = %e, "news fetch failed");
                Reply::Html("Failed to fetch news from Blaze Times.".to_string())
            }
        }
    }

    async fn handle_text(&self, msg: &TextMessage) -> Reply {
        let scope = Scope::resolve(msg.chat_kind, msg.chat_id);
        match self.registry.match_text(&scope, &msg.text).await {
            MatchOutcome::Matched(response) => Reply::Markup(response),
            MatchOutcome::NoMatch => Reply::None,
        }
    }

    fn failure_reply(&self, scope: &Scope, cmd: &Command, op: &str, e: RegistryError) -> Reply {
        match e {
            RegistryError::AuthorizationUnavailable(reason) => {
                self.audit_denied(scope, cmd, op, &reason);
                Reply::Html(
                    "Could not verify your permissions right now. Please try again.".to_string(),
                )
            }
            RegistryError::StorageFailure(_) => {
                Reply::Html("Failed to save commands. Please try again.".to_string())
            }
            RegistryError::DuplicateCommand(trigger) => Reply::Html(format!(
                "Command '{}' already exists.",
                escape_html(&trigger)
            )),
            other => Reply::Html(escape_html(&other.to_string())),
        }
    }

    fn audit_denied(&self, scope: &Scope, cmd: &Command, op: &str, reason: &str) {
        self.audit(AuditEvent::denied(
            scope,
            cmd.user_id.0,
            cmd.username.as_deref(),
            op,
            reason,
        ));
    }

    fn audit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit.write(event) {
            warn!(error = %e, path = %audit.path().display(), "failed to write audit event");
        }
    }
}

/// Send `reply` to `chat_id`, split under `limit` bytes per message.
pub async fn deliver(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    reply: Reply,
    limit: usize,
) -> Result<()> {
    let limit = limit.min(messenger.capabilities().max_message_len);
    match reply {
        Reply::Html(html) => {
            for chunk in split_message(&html, limit) {
                messenger.send_html(chat_id, &chunk).await?;
            }
        }
        Reply::Markup(text) => {
            for chunk in split_message(&text, limit) {
                messenger.send_markup(chat_id, &chunk).await?;
            }
        }
        Reply::None => {}
    }
    Ok(())
}
