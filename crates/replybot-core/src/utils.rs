use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{errors::Error, scope::Scope, Result};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/audit).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Audit Logging ==============

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub scope: String,
    pub user_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, scope: &Scope, user_id: i64, username: Option<&str>) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            scope: scope.storage_key(),
            user_id,
            username: username.map(|s| s.to_string()),
            trigger: None,
            response: None,
            operation: None,
            error: None,
        }
    }

    pub fn command_added(
        scope: &Scope,
        user_id: i64,
        username: Option<&str>,
        trigger: &str,
        response: &str,
    ) -> Self {
        Self {
            trigger: Some(trigger.to_string()),
            response: Some(response.to_string()),
            ..Self::base("command_added", scope, user_id, username)
        }
    }

    pub fn command_deleted(
        scope: &Scope,
        user_id: i64,
        username: Option<&str>,
        trigger: &str,
    ) -> Self {
        Self {
            trigger: Some(trigger.to_string()),
            ..Self::base("command_deleted", scope, user_id, username)
        }
    }

    /// A mutating or listing attempt that was refused or could not be checked.
    pub fn denied(
        scope: &Scope,
        user_id: i64,
        username: Option<&str>,
        operation: &str,
        reason: &str,
    ) -> Self {
        Self {
            operation: Some(operation.to_string()),
            error: Some(reason.to_string()),
            ..Self::base("denied", scope, user_id, username)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.trigger {
            event.trigger = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.response {
            event.response = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
