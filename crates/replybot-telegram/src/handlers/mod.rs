//! Telegram update handlers.
//!
//! Text messages are converted into the core's `IncomingUpdate`, routed
//! through `BotService`, and the reply is delivered back through the
//! messaging port.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::warn;

use replybot_core::{
    dispatch::deliver,
    domain::{ChatId, UserId},
    messaging::types::IncomingUpdate,
    scope::ChatKind,
};

use crate::router::AppState;

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(update) = incoming_update(&msg) else {
        return Ok(());
    };

    let chat_id = update.chat_id();
    let reply = state.service.handle(&update).await;
    if let Err(e) = deliver(
        state.messenger.as_ref(),
        chat_id,
        reply,
        state.cfg.telegram_safe_limit,
    )
    .await
    {
        warn!(chat_id = chat_id.0, error = %e, "failed to deliver reply");
    }

    Ok(())
}

/// Only text from identified users is handled; everything else is ignored.
fn incoming_update(msg: &Message) -> Option<IncomingUpdate> {
    let text = msg.text()?;
    let user = msg.from()?;

    let chat_kind = if msg.chat.is_supergroup() {
        ChatKind::Supergroup
    } else if msg.chat.is_group() {
        ChatKind::Group
    } else if msg.chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Private
    };

    Some(IncomingUpdate::from_text(
        chat_kind,
        ChatId(msg.chat.id.0),
        UserId(user.id.0 as i64),
        user.username.clone(),
        text,
    ))
}
