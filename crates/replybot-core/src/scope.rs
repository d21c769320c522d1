//! Scope resolution: which command namespace a chat event belongs to.

use std::fmt;

use crate::domain::ChatId;

/// Chat kind as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKind {
    Individual,
    Group,
}

impl ScopeKind {
    fn key_prefix(self) -> &'static str {
        match self {
            ScopeKind::Individual => "user",
            ScopeKind::Group => "group",
        }
    }
}

/// An isolated command namespace: one per (kind, chat id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: i64,
}

impl Scope {
    pub fn new(kind: ScopeKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Resolve the scope of a chat. Multi-party chats share one group scope;
    /// everything else is individual.
    pub fn resolve(chat_kind: ChatKind, chat_id: ChatId) -> Self {
        let kind = match chat_kind {
            ChatKind::Group | ChatKind::Supergroup => ScopeKind::Group,
            ChatKind::Private | ChatKind::Channel => ScopeKind::Individual,
        };
        Self { kind, id: chat_id.0 }
    }

    pub fn is_group(&self) -> bool {
        self.kind == ScopeKind::Group
    }

    /// Storage key, e.g. `group_-1001234` or `user_42`.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.kind.key_prefix(), self.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}
