//! Telegram adapter (teloxide).
//!
//! Implements the `replybot-core` messaging and role-lookup ports over the
//! Telegram Bot API.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod router;

use replybot_core::{
    auth::{MemberRole, RoleLookup},
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    scope::Scope,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        retry_after(&mut op).await.map_err(Self::map_err)
    }
}

/// Run `op`, retrying once when Telegram asks us to back off.
async fn retry_after<T, Fut>(
    op: &mut impl FnMut() -> Fut,
) -> std::result::Result<T, RequestError>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                sleep(d).await;
            }
            Err(other) => return Err(other),
        }
    }
}

/// Telegram refused the text because its MarkdownV2 entities do not parse.
fn is_markup_rejection(e: &RequestError) -> bool {
    matches!(e, RequestError::Api(ApiError::CantParseEntities))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_markup(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let formatted = retry_after(&mut || {
            self.bot
                .send_message(Self::tg_chat(chat_id), text.to_string())
                .parse_mode(ParseMode::MarkdownV2)
        })
        .await;

        let msg = match formatted {
            Ok(msg) => msg,
            Err(e) if is_markup_rejection(&e) => {
                debug!(chat_id = chat_id.0, error = %e, "markup rejected, sending plain text");
                self.with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
                    .await?
            }
            Err(e) => return Err(Self::map_err(e)),
        };

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

/// Resolves chat roles with `getChatMember`.
#[derive(Clone)]
pub struct TelegramRoleLookup {
    bot: Bot,
}

impl TelegramRoleLookup {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl RoleLookup for TelegramRoleLookup {
    async fn member_role(&self, scope: &Scope, actor: UserId) -> Result<MemberRole> {
        let member = self
            .bot
            .get_chat_member(
                teloxide::types::ChatId(scope.id),
                teloxide::types::UserId(actor.0 as u64),
            )
            .await
            .map_err(TelegramMessenger::map_err)?;

        Ok(if member.is_owner() {
            MemberRole::Owner
        } else if member.is_administrator() {
            MemberRole::Administrator
        } else {
            MemberRole::Member
        })
    }
}
