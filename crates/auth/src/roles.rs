use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Role identifier used for coarse-grained RBAC.
///
/// Roles are opaque strings at this layer (the backend sends values such as
/// `"ROLE_STUDENT"`). Membership checks compare the exact string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

/// Set of roles held by a principal or required by a route.
pub type RoleSet = BTreeSet<Role>;

impl Role {
    pub const STUDENT: Role = Role(Cow::Borrowed("ROLE_STUDENT"));
    pub const FACULTY: Role = Role(Cow::Borrowed("ROLE_FACULTY"));
    pub const HOD: Role = Role(Cow::Borrowed("ROLE_HOD"));
    pub const ADMIN: Role = Role(Cow::Borrowed("ROLE_ADMIN"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-friendly label, e.g. `"ROLE_HOD"` -> `"Hod"`.
    ///
    /// Presentation only; never use the label for authorization.
    pub fn display_name(&self) -> String {
        let bare = self.as_str().strip_prefix("ROLE_").unwrap_or(self.as_str());
        let mut out = String::with_capacity(bare.len());
        for (i, word) in bare.split('_').filter(|w| !w.is_empty()).enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
        }
        out
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// Build a [`RoleSet`] from anything role-like.
pub fn role_set<I, R>(roles: I) -> RoleSet
where
    I: IntoIterator<Item = R>,
    R: Into<Role>,
{
    roles.into_iter().map(Into::into).collect()
}

/// Read-only role membership query.
///
/// Implemented by session snapshots and by the session manager so navigation
/// code can ask "may the current user see this?" without owning a session.
pub trait RoleQuery {
    fn has_role(&self, role: &Role) -> bool;

    fn has_any_role<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a Role>,
        Self: Sized,
    {
        roles.into_iter().any(|r| self.has_role(r))
    }
}
