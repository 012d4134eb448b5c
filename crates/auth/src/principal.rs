use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{Role, RoleQuery, RoleSet};

/// Identifier of a principal as issued by the backend.
///
/// The backend may send numeric or string ids; both are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrincipalId {
    Numeric(i64),
    Text(String),
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PrincipalId::Numeric(n) => write!(f, "{n}"),
            PrincipalId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrincipalId {
    fn from(value: i64) -> Self {
        Self::Numeric(value)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrincipalError {
    #[error("principal has no roles")]
    NoRoles,

    #[error("principal has no username")]
    MissingUsername,
}

/// The authenticated identity attached to a session.
///
/// # Invariants
/// - `roles` is never empty and holds no blank role names.
/// - `username` is never empty.
///
/// Both are enforced by [`Principal::new`]; there is no other constructor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    id: Option<PrincipalId>,
    username: String,
    full_name: String,
    email: Option<String>,
    roles: RoleSet,
    /// Backend fields this layer does not interpret (department, roll number, ...).
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl Principal {
    pub fn new(
        id: Option<PrincipalId>,
        username: impl Into<String>,
        full_name: impl Into<String>,
        mut roles: RoleSet,
    ) -> Result<Self, PrincipalError> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(PrincipalError::MissingUsername);
        }
        roles.retain(|role| !role.as_str().trim().is_empty());
        if roles.is_empty() {
            return Err(PrincipalError::NoRoles);
        }

        Ok(Self {
            id,
            username,
            full_name: full_name.into(),
            email: None,
            roles,
            attributes: Map::new(),
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> Option<&PrincipalId> {
        self.id.as_ref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Name to show in headers: full name, falling back to the username.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

impl RoleQuery for Principal {
    fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}
