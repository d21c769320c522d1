//! News feed port and rendering for the read-only news command.

use async_trait::async_trait;

use crate::{formatting::escape_html, Result};

/// Upper bound on items shown by the news command.
pub const MAX_NEWS_ITEMS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub published: String,
    pub link: String,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Latest items, newest first as published by the feed, at most `limit`.
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<NewsItem>>;
}

/// Render feed items as Telegram HTML, one block per item.
pub fn render_news_html(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return "No news found.".to_string();
    }

    items
        .iter()
        .take(MAX_NEWS_ITEMS)
        .map(|item| {
            format!(
                "📰 <b>{}</b>\n<i>{}</i>\n<a href=\"{}\">Read more</a>",
                escape_html(&item.title),
                escape_html(&item.published),
                escape_html(&item.link)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
