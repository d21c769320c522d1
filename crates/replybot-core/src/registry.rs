//! Command registry: per-scope trigger → response mappings.
//!
//! Every operation is one load → (mutate → save) transaction against a single
//! scope. Mutating operations and listings run inside a per-scope exclusive
//! section so two admins editing the same chat cannot lose each other's
//! updates. Matching takes no lock and may see the state from just before or
//! just after a concurrent edit.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use regex::Regex;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthorizationGate, AuthorizationUnavailable},
    domain::UserId,
    scope::Scope,
    store::{CommandSet, CommandStore},
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid format")]
    InvalidFormat,

    #[error("unauthorized")]
    Unauthorized,

    #[error("authorization unavailable: {0}")]
    AuthorizationUnavailable(String),

    #[error("command '{0}' already exists")]
    DuplicateCommand(String),

    #[error("command '{0}' not found")]
    NotFound(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl From<AuthorizationUnavailable> for RegistryError {
    fn from(e: AuthorizationUnavailable) -> Self {
        RegistryError::AuthorizationUnavailable(e.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stored {
    pub trigger: String,
    pub response: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deleted {
    pub trigger: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    Empty,
    Commands(CommandSet),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(String),
    NoMatch,
}

/// Lower-case then trim; the lookup key for both stored triggers and inbound text.
pub fn normalize_trigger(raw: &str) -> String {
    raw.to_lowercase().trim().to_string()
}

/// Split `/addcommand` arguments into `(trigger, response)`.
///
/// Grammar: `"<trigger>" <response>`. The trigger is the shortest non-empty
/// quoted run on the first line; the response is everything after the
/// separating whitespace and may span several lines.
pub fn parse_add_args(args: &str) -> Result<(String, String), RegistryError> {
    static ADD_RE: OnceLock<Regex> = OnceLock::new();
    let re = ADD_RE
        .get_or_init(|| Regex::new(r#"^"(.+?)"\s+((?s:.+))"#).expect("valid regex"));

    let caps = re
        .captures(args.trim())
        .ok_or(RegistryError::InvalidFormat)?;
    let trigger = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let response = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    if trigger.trim().is_empty() || response.trim().is_empty() {
        return Err(RegistryError::InvalidFormat);
    }
    Ok((trigger.to_string(), response.to_string()))
}

/// Keyed lock table: one async mutex per scope.
///
/// Entries nobody holds or waits on are pruned on the next lock request, so
/// the table is bounded by the number of scopes in use at once.
#[derive(Default)]
pub struct ScopeLocks {
    inner: Mutex<HashMap<Scope, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub async fn lock_scope(&self, scope: &Scope) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Clones only happen under the map lock, so a count of 1 means idle.
            map.retain(|key, lock| key == scope || Arc::strong_count(lock) > 1);
            map.entry(*scope)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub struct CommandRegistry {
    store: Arc<dyn CommandStore>,
    gate: AuthorizationGate,
    locks: ScopeLocks,
}

impl CommandRegistry {
    pub fn new(store: Arc<dyn CommandStore>, gate: AuthorizationGate) -> Self {
        Self {
            store,
            gate,
            locks: ScopeLocks::default(),
        }
    }

    /// Register `raw_trigger` → `response`. Existing triggers are never overwritten.
    pub async fn add(
        &self,
        scope: &Scope,
        actor: UserId,
        raw_trigger: &str,
        response: &str,
    ) -> Result<Stored, RegistryError> {
        let trigger = normalize_trigger(raw_trigger);
        if trigger.is_empty() || response.trim().is_empty() {
            return Err(RegistryError::InvalidFormat);
        }
        self.authorize(scope, actor).await?;

        let _guard = self.locks.lock_scope(scope).await;
        let mut commands = self.store.load(scope).await;
        if !commands.insert(trigger.clone(), response) {
            return Err(RegistryError::DuplicateCommand(trigger));
        }
        self.persist(scope, &commands).await?;

        info!(%scope, actor = actor.0, %trigger, "command added");
        Ok(Stored {
            trigger,
            response: response.to_string(),
        })
    }

    pub async fn list(&self, scope: &Scope, actor: UserId) -> Result<Listing, RegistryError> {
        self.authorize(scope, actor).await?;

        let _guard = self.locks.lock_scope(scope).await;
        let commands = self.store.load(scope).await;
        if commands.is_empty() {
            return Ok(Listing::Empty);
        }
        Ok(Listing::Commands(commands))
    }

    pub async fn delete(
        &self,
        scope: &Scope,
        actor: UserId,
        raw_trigger: &str,
    ) -> Result<Deleted, RegistryError> {
        let trigger = normalize_trigger(raw_trigger);
        if trigger.is_empty() {
            return Err(RegistryError::InvalidFormat);
        }
        self.authorize(scope, actor).await?;

        let _guard = self.locks.lock_scope(scope).await;
        let mut commands = self.store.load(scope).await;
        if commands.remove(&trigger).is_none() {
            return Err(RegistryError::NotFound(trigger));
        }
        self.persist(scope, &commands).await?;

        info!(%scope, actor = actor.0, %trigger, "command deleted");
        Ok(Deleted { trigger })
    }

    /// Auto-reply lookup for an inbound message. Never authorizes, never locks.
    pub async fn match_text(&self, scope: &Scope, raw_text: &str) -> MatchOutcome {
        let key = normalize_trigger(raw_text);
        if key.is_empty() {
            return MatchOutcome::NoMatch;
        }

        match self.store.load(scope).await.get(&key) {
            Some(response) => MatchOutcome::Matched(response.to_string()),
            None => {
                debug!(%scope, %key, "no command matched");
                MatchOutcome::NoMatch
            }
        }
    }

    async fn authorize(&self, scope: &Scope, actor: UserId) -> Result<(), RegistryError> {
        if self.gate.is_authorized(scope, actor).await? {
            return Ok(());
        }
        info!(%scope, actor = actor.0, "unauthorized registry access");
        Err(RegistryError::Unauthorized)
    }

    async fn persist(&self, scope: &Scope, commands: &CommandSet) -> Result<(), RegistryError> {
        self.store.save(scope, commands).await.map_err(|e| {
            warn!(%scope, error = %e, "failed to save command set");
            RegistryError::StorageFailure(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{IndividualScopePolicy, MemberRole, RoleLookup},
        errors::Error,
        scope::ScopeKind,
        store::{FsCommandStore, MemoryCommandStore},
        Result,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    const ADMIN: UserId = UserId(1);
    const MEMBER: UserId = UserId(2);
    const GROUP: Scope = Scope {
        kind: ScopeKind::Group,
        id: -1001,
    };
    const OTHER_GROUP: Scope = Scope {
        kind: ScopeKind::Group,
        id: -1002,
    };

    /// Actor 1 administers every chat; everybody else is a plain member.
    struct Roles;

    #[async_trait]
    impl RoleLookup for Roles {
        async fn member_role(&self, _scope: &Scope, actor: UserId) -> Result<MemberRole> {
            if actor == ADMIN {
                Ok(MemberRole::Administrator)
            } else {
                Ok(MemberRole::Member)
            }
        }
    }

    struct Unreachable;

    #[async_trait]
    impl RoleLookup for Unreachable {
        async fn member_role(&self, _scope: &Scope, _actor: UserId) -> Result<MemberRole> {
            Err(Error::External("network down".to_string()))
        }
    }

    /// Widens the read-modify-write window so lost updates would show up.
    struct SlowStore(MemoryCommandStore);

    #[async_trait]
    impl CommandStore for SlowStore {
        async fn load(&self, scope: &Scope) -> CommandSet {
            let set = self.0.load(scope).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            set
        }

        async fn save(&self, scope: &Scope, commands: &CommandSet) -> Result<()> {
            self.0.save(scope, commands).await
        }
    }

    fn gate(lookup: Arc<dyn RoleLookup>) -> AuthorizationGate {
        AuthorizationGate::new(
            lookup,
            Duration::from_secs(1),
            IndividualScopePolicy::AlwaysAllow,
        )
    }

    fn registry(store: Arc<dyn CommandStore>) -> CommandRegistry {
        CommandRegistry::new(store, gate(Arc::new(Roles)))
    }

    fn memory_registry() -> (Arc<MemoryCommandStore>, CommandRegistry) {
        let store = Arc::new(MemoryCommandStore::new());
        let reg = registry(store.clone());
        (store, reg)
    }

    #[test]
    fn parses_quoted_trigger_and_multiline_response() {
        let (t, r) = parse_add_args(r#""Hello There"   General *Kenobi*"#).unwrap();
        assert_eq!(t, "Hello There");
        assert_eq!(r, "General *Kenobi*");

        let (t, r) = parse_add_args("\"rules\" 1. be nice\n2. no spam").unwrap();
        assert_eq!(t, "rules");
        assert_eq!(r, "1. be nice\n2. no spam");
    }

    #[test]
    fn trigger_ends_at_first_closing_quote() {
        let (t, r) = parse_add_args(r#""a" "b" c"#).unwrap();
        assert_eq!(t, "a");
        assert_eq!(r, r#""b" c"#);
    }

    #[test]
    fn rejects_malformed_add_args() {
        for bad in [
            "",
            "hello world",
            r#""hello""#,
            r#""hello"   "#,
            r#""hello"world"#,
            r#""" response"#,
            r#""   " response"#,
            "\"multi\nline\" response",
        ] {
            assert_eq!(
                parse_add_args(bad),
                Err(RegistryError::InvalidFormat),
                "input: {bad:?}"
            );
        }
    }

    #[test]
    fn normalization_lowercases_and_trims() {
        assert_eq!(normalize_trigger("  Hello "), "hello");
        assert_eq!(normalize_trigger("PING\n"), "ping");
        assert_eq!(normalize_trigger("   "), "");
    }

    #[tokio::test]
    async fn add_then_match_and_duplicate_is_rejected() {
        let (store, reg) = memory_registry();

        let stored = reg.add(&GROUP, ADMIN, " Hello ", "Hi *there*").await.unwrap();
        assert_eq!(
            stored,
            Stored {
                trigger: "hello".to_string(),
                response: "Hi *there*".to_string()
            }
        );
        assert_eq!(
            reg.match_text(&GROUP, "hello").await,
            MatchOutcome::Matched("Hi *there*".to_string())
        );

        let dup = reg.add(&GROUP, ADMIN, "HELLO", "other").await;
        assert_eq!(dup, Err(RegistryError::DuplicateCommand("hello".to_string())));
        assert_eq!(store.load(&GROUP).await.get("hello"), Some("Hi *there*"));
    }

    #[tokio::test]
    async fn add_rejects_blank_trigger_or_response() {
        let (store, reg) = memory_registry();
        assert_eq!(
            reg.add(&GROUP, ADMIN, "  ", "x").await,
            Err(RegistryError::InvalidFormat)
        );
        assert_eq!(
            reg.add(&GROUP, ADMIN, "x", " \n").await,
            Err(RegistryError::InvalidFormat)
        );
        assert!(store.load(&GROUP).await.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_and_absent_is_not_found() {
        let (store, reg) = memory_registry();
        reg.add(&GROUP, ADMIN, "bye", "see you").await.unwrap();

        assert_eq!(
            reg.delete(&GROUP, ADMIN, " BYE").await,
            Ok(Deleted {
                trigger: "bye".to_string()
            })
        );
        assert_eq!(reg.match_text(&GROUP, "bye").await, MatchOutcome::NoMatch);

        reg.add(&GROUP, ADMIN, "keep", "me").await.unwrap();
        let before = store.load(&GROUP).await;
        assert_eq!(
            reg.delete(&GROUP, ADMIN, "bye").await,
            Err(RegistryError::NotFound("bye".to_string()))
        );
        assert_eq!(store.load(&GROUP).await, before);
    }

    #[tokio::test]
    async fn delete_with_blank_trigger_is_invalid() {
        let (_store, reg) = memory_registry();
        assert_eq!(
            reg.delete(&GROUP, ADMIN, "   ").await,
            Err(RegistryError::InvalidFormat)
        );
    }

    #[tokio::test]
    async fn match_is_whitespace_and_case_insensitive() {
        let (_store, reg) = memory_registry();
        reg.add(&GROUP, ADMIN, "hello", "world").await.unwrap();

        let a = reg.match_text(&GROUP, "  Hello ").await;
        let b = reg.match_text(&GROUP, "hello").await;
        assert_eq!(a, b);
        assert_eq!(a, MatchOutcome::Matched("world".to_string()));
        assert_eq!(reg.match_text(&GROUP, "hello there").await, MatchOutcome::NoMatch);
        assert_eq!(reg.match_text(&GROUP, "   ").await, MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn match_needs_no_authorization() {
        let store = Arc::new(MemoryCommandStore::new());
        let set: CommandSet = [("ping", "pong")].into_iter().collect();
        store.save(&GROUP, &set).await.unwrap();

        let reg = CommandRegistry::new(store, gate(Arc::new(Unreachable)));
        assert_eq!(
            reg.match_text(&GROUP, "ping").await,
            MatchOutcome::Matched("pong".to_string())
        );
    }

    #[tokio::test]
    async fn unauthorized_mutations_leave_disk_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FsCommandStore::new(tmp.path()));
        let reg = registry(store.clone());

        reg.add(&GROUP, ADMIN, "ping", "pong").await.unwrap();
        let path = store.commands_path(&GROUP);
        let before = std::fs::read(&path).unwrap();

        assert_eq!(
            reg.add(&GROUP, MEMBER, "new", "x").await,
            Err(RegistryError::Unauthorized)
        );
        assert_eq!(
            reg.delete(&GROUP, MEMBER, "ping").await,
            Err(RegistryError::Unauthorized)
        );
        assert_eq!(
            reg.list(&GROUP, MEMBER).await,
            Err(RegistryError::Unauthorized)
        );

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn lookup_failure_surfaces_as_unavailable() {
        let store = Arc::new(MemoryCommandStore::new());
        let reg = CommandRegistry::new(store.clone(), gate(Arc::new(Unreachable)));

        let err = reg.add(&GROUP, ADMIN, "x", "y").await.unwrap_err();
        assert!(matches!(err, RegistryError::AuthorizationUnavailable(_)));
        assert!(store.load(&GROUP).await.is_empty());
    }

    #[tokio::test]
    async fn individual_scope_owner_can_manage_commands() {
        let (_store, reg) = memory_registry();
        let me = Scope::new(ScopeKind::Individual, 99);

        reg.add(&me, UserId(99), "note", "remember the milk")
            .await
            .unwrap();
        assert!(matches!(
            reg.list(&me, UserId(99)).await,
            Ok(Listing::Commands(_))
        ));
    }

    #[tokio::test]
    async fn failed_save_is_reported_and_not_applied() {
        let (store, reg) = memory_registry();
        reg.add(&GROUP, ADMIN, "a", "1").await.unwrap();

        store.set_fail_saves(true);
        let err = reg.add(&GROUP, ADMIN, "b", "2").await.unwrap_err();
        assert!(matches!(err, RegistryError::StorageFailure(_)));
        let err = reg.delete(&GROUP, ADMIN, "a").await.unwrap_err();
        assert!(matches!(err, RegistryError::StorageFailure(_)));

        store.set_fail_saves(false);
        assert_eq!(reg.match_text(&GROUP, "b").await, MatchOutcome::NoMatch);
        assert_eq!(
            reg.match_text(&GROUP, "a").await,
            MatchOutcome::Matched("1".to_string())
        );
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let (_store, reg) = memory_registry();
        reg.add(&GROUP, ADMIN, "x", "r1").await.unwrap();

        assert_eq!(reg.match_text(&OTHER_GROUP, "x").await, MatchOutcome::NoMatch);
        let user = Scope::new(ScopeKind::Individual, GROUP.id);
        assert_eq!(reg.match_text(&user, "x").await, MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn list_scenario_ping_pong() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(Arc::new(FsCommandStore::new(tmp.path())));

        assert_eq!(reg.list(&GROUP, ADMIN).await, Ok(Listing::Empty));

        reg.add(&GROUP, ADMIN, "ping", "pong").await.unwrap();
        let expected: CommandSet = [("ping", "pong")].into_iter().collect();
        assert_eq!(reg.list(&GROUP, ADMIN).await, Ok(Listing::Commands(expected)));

        assert_eq!(
            reg.match_text(&GROUP, "PING ").await,
            MatchOutcome::Matched("pong".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_of_same_trigger_store_exactly_once() {
        let store = Arc::new(SlowStore(MemoryCommandStore::new()));
        let reg = Arc::new(registry(store.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let reg = reg.clone();
                tokio::spawn(async move {
                    let scope = GROUP;
                    let response = format!("r{i}");
                    reg.add(&scope, ADMIN, "x", &response).await
                })
            })
            .collect();

        let mut stored = 0;
        let mut duplicates = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => stored += 1,
                Err(RegistryError::DuplicateCommand(_)) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(stored, 1);
        assert_eq!(duplicates, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_of_different_triggers_lose_nothing() {
        let store = Arc::new(SlowStore(MemoryCommandStore::new()));
        let reg = Arc::new(registry(store.clone()));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let reg = reg.clone();
                tokio::spawn(async move {
                    let scope = GROUP;
                    let trigger = format!("t{i}");
                    reg.add(&scope, ADMIN, &trigger, "r").await
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(store.load(&GROUP).await.len(), 10);
    }

    #[tokio::test]
    async fn scope_locks_do_not_block_other_scopes() {
        let locks = ScopeLocks::default();
        let _held = locks.lock_scope(&GROUP).await;

        let other = tokio::time::timeout(
            Duration::from_millis(200),
            locks.lock_scope(&OTHER_GROUP),
        )
        .await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock_scope(&GROUP)).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn idle_scope_locks_are_pruned() {
        let locks = ScopeLocks::default();
        for id in 0..50 {
            let _guard = locks.lock_scope(&Scope::new(ScopeKind::Group, -id)).await;
        }
        assert_eq!(locks.len().await, 1);

        let held = locks.lock_scope(&GROUP).await;
        let other = locks.lock_scope(&OTHER_GROUP).await;
        assert_eq!(locks.len().await, 2);

        // The held lock survives pruning; the released one does not.
        drop(held);
        let third = locks.lock_scope(&Scope::new(ScopeKind::Individual, 7)).await;
        assert_eq!(locks.len().await, 2);

        drop(other);
        drop(third);
        let _last = locks.lock_scope(&GROUP).await;
        assert_eq!(locks.len().await, 1);
    }
}
