//! HTTP plumbing shared by every outgoing request.
//!
//! [`BearerCredential`] is the one process-wide credential slot. [`ApiClient`]
//! reads it on every request it builds, so clearing the slot immediately stops
//! the token from being sent.

use std::sync::{Arc, PoisonError, RwLock};

use campus_auth::BearerToken;
use reqwest::{Client, Method, RequestBuilder};

/// Shared, clonable handle to the default bearer credential.
#[derive(Debug, Clone, Default)]
pub struct BearerCredential {
    inner: Arc<RwLock<Option<BearerToken>>>,
}

impl BearerCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<BearerToken> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn attach(&self, token: BearerToken) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub(crate) fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Thin wrapper over `reqwest` bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    bearer: BearerCredential,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, bearer: BearerCredential) -> Self {
        Self::with_client(Client::new(), base_url, bearer)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, bearer: BearerCredential) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            bearer,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn bearer(&self) -> &BearerCredential {
        &self.bearer
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Request without any credential (sign-in, sign-up).
    pub fn anonymous(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Request carrying the current default bearer credential, if any.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.anonymous(method, path);
        match self.bearer.current() {
            Some(token) => req.bearer_auth(token.as_str()),
            None => req,
        }
    }

    /// Request carrying an explicit token, ignoring the shared slot.
    pub fn request_with(&self, method: Method, path: &str, token: &BearerToken) -> RequestBuilder {
        self.anonymous(method, path).bearer_auth(token.as_str())
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }
}
