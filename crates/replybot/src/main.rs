use std::sync::Arc;

use tracing::info;

use replybot_core::{config::Config, store::FsCommandStore};
use replybot_news::RssNewsClient;

#[tokio::main]
async fn main() -> Result<(), replybot_core::Error> {
    replybot_core::logging::init("replybot")?;

    let cfg = Arc::new(Config::load()?);

    let store = Arc::new(FsCommandStore::new(cfg.commands_dir.clone()));
    let news = Arc::new(RssNewsClient::new(
        cfg.news_feed_url.clone(),
        cfg.news_timeout,
    ));
    info!(feed = %news.url, "news source configured");

    replybot_telegram::router::run_polling(cfg, store, news)
        .await
        .map_err(|e| replybot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
