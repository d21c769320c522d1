//! Feed adapter (RSS 2.0 / Atom) for the news command.
//!
//! Implements the `replybot-core` `NewsSource` port over HTTP.

use std::{collections::HashMap, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use replybot_core::{
    errors::Error,
    news::{NewsItem, NewsSource},
    Result,
};

#[derive(Clone, Debug)]
pub struct RssNewsClient {
    pub url: String,
    http: reqwest::Client,
}

impl RssNewsClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Self {
            url: url.into(),
            http,
        }
    }
}

#[async_trait]
impl NewsSource for RssNewsClient {
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<NewsItem>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::External(format!("feed request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "feed request failed: {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("feed body error: {e}")))?;

        let items = parse_feed(&body, limit)?;
        debug!(url = %self.url, count = items.len(), "fetched feed");
        Ok(items)
    }
}

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

/// Parse up to `limit` entries from an RSS 2.0 or Atom document.
///
/// Entries without a title or link are skipped. A document that is neither
/// RSS nor Atom is an error.
pub fn parse_feed(xml: &str, limit: usize) -> Result<Vec<NewsItem>> {
    static ROOT: OnceLock<Regex> = OnceLock::new();
    static RSS_ITEM: OnceLock<Regex> = OnceLock::new();
    static ATOM_ENTRY: OnceLock<Regex> = OnceLock::new();

    let root = re(&ROOT, r"<(rss|feed|rdf:RDF)\b")
        .captures(xml)
        .map(|c| c[1].to_string())
        .ok_or_else(|| Error::External("response is not an RSS or Atom feed".to_string()))?;

    let blocks = if root == "feed" {
        re(&ATOM_ENTRY, r"(?s)<entry\b[^>]*>(.*?)</entry>")
    } else {
        re(&RSS_ITEM, r"(?s)<item\b[^>]*>(.*?)</item>")
    };

    Ok(blocks
        .captures_iter(xml)
        .filter_map(|c| parse_entry(&c[1]))
        .take(limit)
        .collect())
}

fn parse_entry(block: &str) -> Option<NewsItem> {
    let title = element_text(block, "title").filter(|t| !t.is_empty())?;
    let link = entry_link(block)?;
    let published = ["pubDate", "published", "updated", "dc:date"]
        .iter()
        .find_map(|tag| element_text(block, tag))
        .unwrap_or_default();

    Some(NewsItem {
        title,
        published,
        link,
    })
}

/// Elements read from a feed entry; their patterns are compiled once.
const ENTRY_TAGS: [&str; 6] = ["title", "link", "pubDate", "published", "updated", "dc:date"];

fn element_re(tag: &str) -> Option<&'static Regex> {
    static TAGS: OnceLock<HashMap<&'static str, Regex>> = OnceLock::new();

    TAGS.get_or_init(|| {
        ENTRY_TAGS
            .iter()
            .map(|tag| {
                let pattern = format!(r"(?s)<{0}\b[^>]*>(.*?)</{0}>", regex::escape(tag));
                (*tag, Regex::new(&pattern).expect("valid regex"))
            })
            .collect()
    })
    .get(tag)
}

fn element_text(block: &str, tag: &str) -> Option<String> {
    let raw = element_re(tag)?.captures(block)?.get(1)?.as_str();
    Some(decode_text(raw))
}

/// RSS `<link>url</link>`, or the Atom `<link href>` that is not a
/// non-alternate relation.
fn entry_link(block: &str) -> Option<String> {
    static LINK_TAG: OnceLock<Regex> = OnceLock::new();
    static HREF: OnceLock<Regex> = OnceLock::new();
    static REL: OnceLock<Regex> = OnceLock::new();

    if let Some(text) = element_text(block, "link").filter(|l| !l.is_empty()) {
        return Some(text);
    }

    re(&LINK_TAG, r"<link\b([^>]*)/?>")
        .captures_iter(block)
        .filter(|c| {
            re(&REL, r#"\brel\s*=\s*["']([^"']*)["']"#)
                .captures(&c[1])
                .map(|r| &r[1] == "alternate")
                .unwrap_or(true)
        })
        .find_map(|c| {
            re(&HREF, r#"\bhref\s*=\s*["']([^"']*)["']"#)
                .captures(&c[1])
                .map(|h| decode_entities(&h[1]))
        })
}

fn decode_text(raw: &str) -> String {
    static CDATA: OnceLock<Regex> = OnceLock::new();

    let raw = raw.trim();
    let mut out = String::new();
    let mut last = 0;
    for c in re(&CDATA, r"(?s)<!\[CDATA\[(.*?)\]\]>").captures_iter(raw) {
        let Some(whole) = c.get(0) else {
            continue;
        };
        out.push_str(&decode_entities(&raw[last..whole.start()]));
        out.push_str(&c[1]);
        last = whole.end();
    }
    out.push_str(&decode_entities(&raw[last..]));
    out.trim().to_string()
}

fn decode_entities(s: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();

    re(&ENTITY, r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")
        .replace_all(s, |c: &regex::Captures| {
            let name = &c[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => name
                    .strip_prefix("#x")
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map(String::from).unwrap_or_else(|| c[0].to_string())
        })
        .into_owned()
}
