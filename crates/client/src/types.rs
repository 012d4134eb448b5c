//! Wire payloads exchanged with the campus auth endpoints.
//!
//! Field names follow the backend's camelCase JSON. Anything the session core
//! does not interpret is kept in `attributes` and passed through to the
//! principal.

use campus_auth::{BearerToken, Principal, PrincipalError, PrincipalId, role_set};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of the sign-in request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

impl SignInRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Identity record returned by sign-in (inline) and by "who am I".
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPayload {
    #[serde(default)]
    pub id: Option<PrincipalId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl IdentityPayload {
    /// Validate into a [`Principal`].
    ///
    /// `fallback_username` is used when the payload omits `username` (the
    /// sign-in response of some deployments only carries the token and roles).
    /// A legacy `name` attribute stands in for a missing `fullName`.
    pub fn into_principal(self, fallback_username: Option<&str>) -> Result<Principal, PrincipalError> {
        let username = self
            .username
            .filter(|u| !u.trim().is_empty())
            .or_else(|| fallback_username.map(str::to_string))
            .unwrap_or_default();

        let full_name = self
            .full_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| non_blank_str(&self.attributes, "name"))
            .unwrap_or_default();

        let principal = Principal::new(self.id, username, full_name, role_set(self.roles))?
        .with_attributes(self.attributes);

        Ok(match self.email {
            Some(email) if !email.trim().is_empty() => principal.with_email(email),
            _ => principal,
        })
    }
}

fn non_blank_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

/// Successful sign-in response: a token plus the identity, flattened.
///
/// `accessToken`/`tokenType` are read first; the legacy `token`/`type` keys
/// fill in when they are missing. Both legacy keys are always stripped from
/// the identity so the token never reaches principal attributes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSignInResponse")]
pub struct SignInResponse {
    pub access_token: String,
    pub token_type: String,
    pub identity: IdentityPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignInResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(flatten)]
    identity: IdentityPayload,
}

impl TryFrom<RawSignInResponse> for SignInResponse {
    type Error = String;

    fn try_from(raw: RawSignInResponse) -> Result<Self, Self::Error> {
        let RawSignInResponse {
            access_token,
            token_type,
            mut identity,
        } = raw;

        let legacy_token = identity.attributes.remove("token");
        let legacy_type = identity.attributes.remove("type");

        let access_token = access_token
            .filter(|t| !t.is_empty())
            .or_else(|| legacy_token.and_then(|v| v.as_str().map(str::to_string)))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "missing field `accessToken`".to_string())?;

        let token_type = token_type
            .or_else(|| legacy_type.and_then(|v| v.as_str().map(str::to_string)))
            .unwrap_or_else(|| "Bearer".to_string());

        Ok(Self {
            access_token,
            token_type,
            identity,
        })
    }
}

impl SignInResponse {
    pub fn token(&self) -> BearerToken {
        BearerToken::new(self.access_token.clone())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Body of the sign-up request.
///
/// Optional fields that are absent or empty are left out of the JSON body
/// entirely; the backend rejects e.g. an empty roll number.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "is_blank")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub roll_number: Option<String>,
    #[serde(skip_serializing_if = "is_blank")]
    pub department: Option<String>,
}

/// Error body shape used by the backend (`message` wins over `error`).
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Longest plain-text body surfaced as a reason.
const MAX_PLAIN_REASON: usize = 200;

/// Extract the most specific human-readable reason from an error body.
pub(crate) fn server_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed
            .message
            .or(parsed.error)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        // Only short single-line text is a reason; HTML pages and dumps are not.
        Err(_) if is_plain_reason(body) => Some(body.to_string()),
        Err(_) => None,
    }
}

fn is_plain_reason(body: &str) -> bool {
    !body.starts_with('{')
        && !body.starts_with('<')
        && !body.contains('\n')
        && body.chars().count() <= MAX_PLAIN_REASON
}
