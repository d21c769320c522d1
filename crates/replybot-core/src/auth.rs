//! Authorization gate for mutating registry operations.

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{domain::UserId, errors::Error, scope::Scope, Result};

/// Role of a chat member as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator,
    Member,
}

impl MemberRole {
    pub fn is_elevated(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Administrator)
    }
}

/// Platform membership lookup (e.g. Telegram `getChatMember`).
#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn member_role(&self, scope: &Scope, actor: UserId) -> Result<MemberRole>;
}

/// How actors in individual (one-to-one) scopes are authorized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndividualScopePolicy {
    /// The sole participant owns the scope; no lookup is performed.
    #[default]
    AlwaysAllow,
    /// Same elevated-role check as group scopes.
    RequireElevatedRole,
}

impl FromStr for IndividualScopePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "always_allow" | "allow" => Ok(Self::AlwaysAllow),
            "require_role" | "require_elevated_role" => Ok(Self::RequireElevatedRole),
            other => Err(Error::Config(format!(
                "unknown INDIVIDUAL_SCOPE_POLICY: {other} (expected always_allow or require_role)"
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("authorization unavailable: {0}")]
pub struct AuthorizationUnavailable(pub String);

/// Allow/deny decision on top of a [`RoleLookup`], bounded by a timeout.
#[derive(Clone)]
pub struct AuthorizationGate {
    lookup: Arc<dyn RoleLookup>,
    timeout: Duration,
    individual_policy: IndividualScopePolicy,
}

impl AuthorizationGate {
    pub fn new(
        lookup: Arc<dyn RoleLookup>,
        timeout: Duration,
        individual_policy: IndividualScopePolicy,
    ) -> Self {
        Self {
            lookup,
            timeout,
            individual_policy,
        }
    }

    pub async fn is_authorized(
        &self,
        scope: &Scope,
        actor: UserId,
    ) -> std::result::Result<bool, AuthorizationUnavailable> {
        if !scope.is_group() && self.individual_policy == IndividualScopePolicy::AlwaysAllow {
            return Ok(true);
        }

        let role = match tokio::time::timeout(self.timeout, self.lookup.member_role(scope, actor))
            .await
        {
            Ok(Ok(role)) => role,
            Ok(Err(e)) => {
                warn!(%scope, actor = actor.0, error = %e, "role lookup failed");
                return Err(AuthorizationUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(%scope, actor = actor.0, timeout_ms = self.timeout.as_millis() as u64, "role lookup timed out");
                return Err(AuthorizationUnavailable(format!(
                    "role lookup timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        debug!(%scope, actor = actor.0, ?role, "role lookup");
        Ok(role.is_elevated())
    }
}
