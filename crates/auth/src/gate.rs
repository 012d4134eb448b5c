//! Route-level authorization gate.
//!
//! [`decide`] is the pure policy check. [`ProtectedRoute`] is the UI-boundary
//! guard that renders per outcome and performs the login redirect.

use serde::Serialize;

use crate::{Principal, Role, RoleQuery, RoleSet, Session, SessionStatus};

/// Path the gate redirects unauthenticated users to.
pub const LOGIN_PATH: &str = "/login";

/// Result of an access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Session is still being established; render a loading state.
    Loading,
    /// No session; navigate to the login route.
    Redirect { to: &'static str },
    /// Authenticated but none of the required roles is held.
    Forbidden,
    Allow,
}

/// Decide whether `session` may access content requiring any of `required`.
///
/// - No IO
/// - No panics
/// - Total over every `Session` value
///
/// An empty `required` set means "any authenticated user".
pub fn decide(session: &Session, required: &RoleSet) -> Outcome {
    match session {
        Session::Uninitialized | Session::Restoring => Outcome::Loading,
        Session::Unauthenticated => Outcome::Redirect { to: LOGIN_PATH },
        Session::Authenticated { principal, .. } => {
            if required.is_empty() || principal.has_any_role(required) {
                Outcome::Allow
            } else {
                Outcome::Forbidden
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable account of a gate decision.
#[derive(Debug, Clone, Serialize)]
pub struct GateExplanation {
    pub outcome: Outcome,
    pub status: SessionStatus,
    pub username: Option<String>,
    pub held_roles: Vec<String>,
    pub required_roles: Vec<String>,
    /// Required roles the principal actually holds.
    pub matched_roles: Vec<String>,
    pub reason: String,
}

/// Explain why [`decide`] returns what it returns for these inputs.
pub fn explain(session: &Session, required: &RoleSet) -> GateExplanation {
    let outcome = decide(session, required);
    let required_roles: Vec<String> = required.iter().map(|r| r.as_str().to_string()).collect();
    let (username, held_roles, matched_roles) = match session.principal() {
        Some(p) => (
            Some(p.username().to_string()),
            p.roles().iter().map(|r| r.as_str().to_string()).collect(),
            p.roles()
                .intersection(required)
                .map(|r| r.as_str().to_string())
                .collect(),
        ),
        None => (None, Vec::new(), Vec::new()),
    };

    let reason = match outcome {
        Outcome::Loading => "Session is still being restored".to_string(),
        Outcome::Redirect { to } => format!("No active session; redirecting to {to}"),
        Outcome::Forbidden => format!(
            "Requires one of {:?}; current roles are {:?}",
            required_roles, held_roles
        ),
        Outcome::Allow if required.is_empty() => "Route is open to any signed-in user".to_string(),
        Outcome::Allow => format!("Granted by role(s) {:?}", matched_roles),
    };

    GateExplanation {
        outcome,
        status: session.status(),
        username,
        held_roles,
        required_roles,
        matched_roles,
        reason,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UI boundary guard
// ─────────────────────────────────────────────────────────────────────────────

/// Navigation seam used by [`ProtectedRoute`] to perform redirects.
pub trait Navigator {
    fn navigate(&self, path: &str);
}

/// Visible in-place notice shown for a `Forbidden` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenialNotice {
    pub title: String,
    pub message: String,
    pub required_roles: Vec<String>,
}

/// What the UI boundary should show for a protected route.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardView<V> {
    Loading,
    Redirected(String),
    Denied(DenialNotice),
    Content(V),
}

/// Guard wrapping a protected view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRoute {
    required: RoleSet,
    login_path: String,
}

impl ProtectedRoute {
    /// Route open to any authenticated user.
    pub fn authenticated() -> Self {
        Self {
            required: RoleSet::new(),
            login_path: LOGIN_PATH.to_string(),
        }
    }

    /// Route restricted to principals holding at least one of `roles`.
    pub fn any_of<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        Self {
            required: crate::role_set(roles),
            login_path: LOGIN_PATH.to_string(),
        }
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn required(&self) -> &RoleSet {
        &self.required
    }

    pub fn decide(&self, session: &Session) -> Outcome {
        decide(session, &self.required)
    }

    /// Render the route. `content` only runs on `Allow`.
    pub fn render<N, F, V>(&self, session: &Session, navigator: &N, content: F) -> GuardView<V>
    where
        N: Navigator + ?Sized,
        F: FnOnce(&Principal) -> V,
    {
        match (self.decide(session), session.principal()) {
            (Outcome::Loading, _) => GuardView::Loading,
            (Outcome::Redirect { .. }, _) => {
                tracing::debug!(to = %self.login_path, "redirecting to login");
                navigator.navigate(&self.login_path);
                GuardView::Redirected(self.login_path.clone())
            }
            (Outcome::Forbidden, _) => {
                let explanation = explain(session, &self.required);
                tracing::info!(
                    username = ?explanation.username,
                    required = ?explanation.required_roles,
                    "access denied by role gate"
                );
                GuardView::Denied(DenialNotice {
                    title: "Access denied".to_string(),
                    message: "You do not have permission to view this page.".to_string(),
                    required_roles: explanation.required_roles,
                })
            }
            (Outcome::Allow, Some(principal)) => GuardView::Content(content(principal)),
            // Allow is only produced for Authenticated sessions.
            (Outcome::Allow, None) => GuardView::Loading,
        }
    }
}
