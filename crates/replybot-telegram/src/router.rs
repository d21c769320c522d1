use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use replybot_core::{
    auth::AuthorizationGate, config::Config, dispatch::BotService,
    messaging::port::MessagingPort, news::NewsSource, registry::CommandRegistry,
    store::CommandStore, utils::AuditLogger,
};

use crate::handlers;
use crate::{TelegramMessenger, TelegramRoleLookup};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<BotService>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// Wire the registry, role lookup and news source to a long-polling dispatcher.
pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn CommandStore>,
    news: Arc<dyn NewsSource>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!(username = %me.username(), "replybot started");
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!(error = %e, "could not fetch bot identity, accepting every @mention");
            None
        }
    };
    info!(
        commands_dir = %cfg.commands_dir.display(),
        policy = ?cfg.individual_scope_policy,
        "command registry ready"
    );

    let gate = AuthorizationGate::new(
        Arc::new(TelegramRoleLookup::new(bot.clone())),
        cfg.auth_timeout,
        cfg.individual_scope_policy,
    );
    let registry = Arc::new(CommandRegistry::new(store, gate));
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));
    let service = Arc::new(
        BotService::new(registry, news, cfg.news_max_items, Some(audit))
            .with_bot_username(bot_username),
    );

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        service,
        messenger: Arc::new(TelegramMessenger::new(bot.clone())),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
