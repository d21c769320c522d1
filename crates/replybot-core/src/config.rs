use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{auth::IndividualScopePolicy, errors::Error, news::MAX_NEWS_ITEMS, Result};

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,

    // Command registry
    pub commands_dir: PathBuf,
    pub auth_timeout: Duration,
    pub individual_scope_policy: IndividualScopePolicy,

    // News
    pub news_feed_url: String,
    pub news_max_items: usize,
    pub news_timeout: Duration,

    // Telegram limits
    pub telegram_safe_limit: usize,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_source(env_str)
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let commands_dir = get("COMMANDS_DIR")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("bot_commands"));
        let auth_timeout =
            Duration::from_millis(parse_u64(get("AUTH_TIMEOUT_MS")).unwrap_or(5_000).max(1));
        let individual_scope_policy = match get("INDIVIDUAL_SCOPE_POLICY").and_then(non_empty) {
            Some(raw) => raw.parse::<IndividualScopePolicy>()?,
            None => IndividualScopePolicy::default(),
        };

        let news_feed_url = get("NEWS_FEED_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://www.theblazetimes.in/feed.xml".to_string());
        let news_max_items = parse_usize(get("NEWS_MAX_ITEMS"))
            .unwrap_or(MAX_NEWS_ITEMS)
            .clamp(1, MAX_NEWS_ITEMS);
        let news_timeout = Duration::from_millis(parse_u64(get("NEWS_TIMEOUT_MS")).unwrap_or(10_000));

        let telegram_safe_limit = parse_usize(get("TELEGRAM_SAFE_LIMIT"))
            .unwrap_or(4000)
            .clamp(200, 4096);

        let audit_log_path = PathBuf::from(
            get("AUDIT_LOG_PATH").unwrap_or("/tmp/replybot-audit.log".to_string()),
        );
        let audit_log_json = parse_bool(get("AUDIT_LOG_JSON")).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            commands_dir,
            auth_timeout,
            individual_scope_policy,
            news_feed_url,
            news_max_items,
            news_timeout,
            telegram_safe_limit,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_usize(v: Option<String>) -> Option<usize> {
    v.and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
