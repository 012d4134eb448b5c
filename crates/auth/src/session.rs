use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Principal, Role, RoleQuery};

/// Opaque bearer credential.
///
/// `Debug` is redacted so tokens never end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Coarse session status, as observed by UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Restoring,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Restoring => "restoring",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether an access decision must wait.
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Uninitialized | SessionStatus::Restoring)
    }
}

impl core::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide authentication state.
///
/// # Invariants
/// - A token exists iff a principal exists; both live in `Authenticated` only.
/// - The principal's role set is non-empty (enforced by [`Principal::new`]).
///
/// Lifecycle: `Uninitialized -> Restoring | Unauthenticated`,
/// `Restoring -> Authenticated | Unauthenticated`,
/// `Authenticated <-> Unauthenticated`. Nothing returns to `Uninitialized`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Session {
    #[default]
    Uninitialized,
    Restoring,
    Authenticated {
        token: BearerToken,
        principal: Principal,
        since: DateTime<Utc>,
    },
    Unauthenticated,
}

impl Session {
    pub fn authenticated(token: BearerToken, principal: Principal, since: DateTime<Utc>) -> Self {
        Session::Authenticated {
            token,
            principal,
            since,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            Session::Uninitialized => SessionStatus::Uninitialized,
            Session::Restoring => SessionStatus::Restoring,
            Session::Authenticated { .. } => SessionStatus::Authenticated,
            Session::Unauthenticated => SessionStatus::Unauthenticated,
        }
    }

    pub fn token(&self) -> Option<&BearerToken> {
        match self {
            Session::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Session::Authenticated { principal, .. } => Some(principal),
            _ => None,
        }
    }

    pub fn authenticated_since(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::Authenticated { since, .. } => Some(*since),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_pending()
    }
}

impl RoleQuery for Session {
    fn has_role(&self, role: &Role) -> bool {
        self.principal().is_some_and(|p| p.has_role(role))
    }
}

/// Serializable snapshot for UI layers. Never includes the token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView<'a> {
    pub status: SessionStatus,
    pub loading: bool,
    pub principal: Option<&'a Principal>,
    pub since: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Session> for SessionView<'a> {
    fn from(session: &'a Session) -> Self {
        Self {
            status: session.status(),
            loading: session.is_loading(),
            principal: session.principal(),
            since: session.authenticated_since(),
        }
    }
}
