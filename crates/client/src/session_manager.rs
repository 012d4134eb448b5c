//! Session manager: owns the process-wide [`Session`].
//!
//! All mutations (restore, login, logout) run under one writer lock and
//! publish the new value through a `watch` channel. Network calls happen
//! outside the lock; results that were overtaken by a later login/logout are
//! dropped instead of applied.
//!
//! Every token change is mirrored into the [`TokenStore`] and the shared
//! [`BearerCredential`] before the lock is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use campus_auth::{
    BearerToken, Principal, PrincipalError, Role, RoleQuery, Session, SessionStatus,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, watch};

use crate::api::{ApiClient, BearerCredential};
use crate::config::ClientConfig;
use crate::credentials::{CredentialExchange, ExchangeError, HttpCredentialClient};
use crate::token_store::{TokenStore, TokenStoreError};
use crate::types::{SignInRequest, SignUpRequest};

pub const LOGIN_FAILED: &str = "Login failed";
pub const LOGIN_NOT_PERSISTED: &str = "Login failed: could not persist session";
pub const LOGIN_CANCELLED: &str = "Login cancelled by logout";
pub const REGISTRATION_FAILED: &str = "Registration failed";

/// Outcome of `login` / `register`, shaped for UI layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Why a restore attempt failed. Logged, never surfaced.
#[derive(Debug, thiserror::Error)]
enum RestoreError {
    #[error("token store: {0}")]
    Store(#[from] TokenStoreError),
    #[error("verification: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("invalid identity: {0}")]
    Identity(#[from] PrincipalError),
    #[error("verification timed out after {0:?}")]
    TimedOut(Duration),
}

pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    exchange: Arc<dyn CredentialExchange>,
    bearer: BearerCredential,
    state: watch::Sender<Session>,
    /// Serializes every mutation of `state`, `store` and `bearer`.
    writer: Mutex<()>,
    restore_started: AtomicBool,
    /// Bumped by every committed login or logout.
    epoch: AtomicU64,
    /// Bumped by every logout.
    logout_epoch: AtomicU64,
    restore_timeout: Option<Duration>,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .field("restore_timeout", &self.restore_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        exchange: Arc<dyn CredentialExchange>,
        bearer: BearerCredential,
    ) -> Self {
        let (state, _) = watch::channel(Session::Uninitialized);
        Self {
            store,
            exchange,
            bearer,
            state,
            writer: Mutex::new(()),
            restore_started: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            logout_epoch: AtomicU64::new(0),
            restore_timeout: None,
        }
    }

    /// Wire a manager to the HTTP backend described by `config`.
    pub fn from_config(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        let bearer = BearerCredential::new();
        let api = ApiClient::new(config.api_url.clone(), bearer.clone());
        let exchange = HttpCredentialClient::new(api, config.endpoints.clone());
        Self::new(store, Arc::new(exchange), bearer).with_restore_timeout(config.restore_timeout)
    }

    /// Bound the restore verification call. Expiry fails closed.
    pub fn with_restore_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.restore_timeout = timeout;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    /// True until the first restore has completed.
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.state.borrow().has_role(role)
    }

    /// Change feed for UI layers that re-evaluate the gate on every change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Credential slot used by outgoing requests.
    pub fn bearer(&self) -> &BearerCredential {
        &self.bearer
    }

    fn publish(&self, session: Session) -> SessionStatus {
        let previous = self.state.send_replace(session);
        previous.status()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Restore a persisted session, once per manager.
    ///
    /// Any failure purges the stored token and ends `Unauthenticated`.
    pub async fn initialize(&self) -> SessionStatus {
        if self.restore_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("session restore already performed");
            return self.status();
        }

        let (token, start_epoch) = {
            let _guard = self.writer.lock().await;
            if self.status() != SessionStatus::Uninitialized {
                // A login/logout already settled the session.
                return self.status();
            }

            let start_epoch = self.epoch.load(Ordering::SeqCst);
            match self.store.get().await {
                Ok(None) => {
                    self.publish(Session::Unauthenticated);
                    tracing::info!("no persisted session");
                    return SessionStatus::Unauthenticated;
                }
                Ok(Some(token)) => {
                    self.bearer.attach(token.clone());
                    self.publish(Session::Restoring);
                    tracing::info!("restoring persisted session");
                    (token, start_epoch)
                }
                Err(err) => {
                    self.fail_restore(RestoreError::Store(err)).await;
                    return SessionStatus::Unauthenticated;
                }
            }
        };

        let mut pending = PendingRestore { manager: self, armed: true };
        let verified = self.verify(&token).await;

        let _guard = self.writer.lock().await;
        pending.armed = false;
        if self.epoch.load(Ordering::SeqCst) != start_epoch {
            tracing::debug!("restore result superseded by a later login/logout");
            return self.status();
        }

        match verified {
            Ok(principal) => {
                tracing::info!(
                    username = %principal.username(),
                    roles = ?principal.roles(),
                    "session restored"
                );
                self.publish(Session::authenticated(token, principal, Utc::now()));
                SessionStatus::Authenticated
            }
            Err(err) => {
                self.fail_restore(err).await;
                SessionStatus::Unauthenticated
            }
        }
    }

    async fn verify(&self, token: &BearerToken) -> Result<Principal, RestoreError> {
        let call = self.exchange.who_am_i(token);
        let identity = match self.restore_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RestoreError::TimedOut(limit))??,
            None => call.await?,
        };
        Ok(identity.into_principal(None)?)
    }

    /// Caller must hold the writer lock.
    async fn fail_restore(&self, err: RestoreError) {
        match &err {
            RestoreError::Exchange(rejected) if rejected.is_rejection() => {
                tracing::info!(error = %err, "persisted token rejected; signing out");
            }
            _ => tracing::warn!(error = %err, "session restore failed; signing out"),
        }
        self.bearer.clear();
        if let Err(err) = self.store.clear().await {
            tracing::error!(error = %err, "failed to purge persisted token");
        }
        self.publish(Session::Unauthenticated);
    }

    /// Exchange credentials for a session.
    ///
    /// Never fails past this boundary; failures come back as `success: false`
    /// and leave the current session as it was.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult {
        let logout_epoch = self.logout_epoch.load(Ordering::SeqCst);
        let request = SignInRequest::new(username, password);

        let response = match self.exchange.sign_in(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(username, error = %err, "login rejected");
                return AuthResult::failed(err.server_message().unwrap_or(LOGIN_FAILED));
            }
        };

        let token = response.token();
        if token.as_str().trim().is_empty() {
            tracing::warn!(username, "login response carried an empty token");
            return AuthResult::failed(LOGIN_FAILED);
        }
        let principal = match response.identity.into_principal(Some(username)) {
            Ok(principal) => principal,
            Err(err) => {
                tracing::warn!(username, error = %err, "login response carried an invalid identity");
                return AuthResult::failed(LOGIN_FAILED);
            }
        };

        let _guard = self.writer.lock().await;
        if self.logout_epoch.load(Ordering::SeqCst) != logout_epoch {
            tracing::info!(username, "login discarded: logout happened while it was in flight");
            return AuthResult::failed(LOGIN_CANCELLED);
        }

        if let Err(err) = self.store.set(&token).await {
            tracing::error!(username, error = %err, "failed to persist token");
            return AuthResult::failed(LOGIN_NOT_PERSISTED);
        }

        self.bearer.attach(token.clone());
        self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            username = %principal.username(),
            roles = ?principal.roles(),
            "login succeeded"
        );
        self.publish(Session::authenticated(token, principal, Utc::now()));

        AuthResult::ok()
    }

    /// Submit a new account. The session is left untouched; sign in afterwards.
    pub async fn register(&self, request: &SignUpRequest) -> AuthResult {
        match self.exchange.sign_up(request).await {
            Ok(()) => {
                tracing::info!(username = %request.username, "registration accepted");
                AuthResult::ok()
            }
            Err(err) => {
                tracing::warn!(username = %request.username, error = %err, "registration rejected");
                AuthResult::failed(err.server_message().unwrap_or(REGISTRATION_FAILED))
            }
        }
    }

    /// End the session locally. Always succeeds and is idempotent.
    pub async fn logout(&self) {
        let _guard = self.writer.lock().await;
        self.logout_epoch.fetch_add(1, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);

        self.bearer.clear();
        if let Err(err) = self.store.clear().await {
            tracing::error!(error = %err, "failed to purge persisted token on logout");
        }

        let previous = self.publish(Session::Unauthenticated);
        if previous == SessionStatus::Authenticated {
            tracing::info!("logged out");
        } else {
            tracing::debug!(%previous, "logout with no active session");
        }
    }
}

/// Rolls back a restore whose `initialize` future was dropped mid-verification.
///
/// The session returns to `Uninitialized` with the unverified token detached
/// from the bearer slot, and the next `initialize` call retries. The stored
/// token is kept since purging it would need an await.
struct PendingRestore<'a> {
    manager: &'a SessionManager,
    armed: bool,
}

impl Drop for PendingRestore<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let m = self.manager;
        // A writer holding the lock is about to settle the session itself.
        let Ok(_writer) = m.writer.try_lock() else {
            tracing::debug!("restore cancelled while another mutation was in progress");
            return;
        };
        if m.status() != SessionStatus::Restoring {
            return;
        }

        m.bearer.clear();
        m.restore_started.store(false, Ordering::SeqCst);
        m.publish(Session::Uninitialized);
        tracing::warn!("session restore cancelled before verification finished");
    }
}

impl RoleQuery for SessionManager {
    fn has_role(&self, role: &Role) -> bool {
        SessionManager::has_role(self, role)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::token_store::InMemoryTokenStore;
    use crate::types::{IdentityPayload, SignInResponse};

    fn identity(username: &str, roles: &[&str]) -> IdentityPayload {
        IdentityPayload {
            id: Some(1.into()),
            username: Some(username.to_string()),
            full_name: Some(format!("{username} full")),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Scriptable backend double.
    #[derive(Default)]
    struct FakeExchange {
        /// (username, password) -> sign-in response
        accounts: HashMap<(String, String), SignInResponse>,
        /// token -> identity
        identities: HashMap<String, IdentityPayload>,
        sign_in_failure: Option<ExchangeError>,
        sign_up_failure: Option<ExchangeError>,
        /// When set, `who_am_i` / `sign_in` wait for a permit before answering.
        who_am_i_gate: Option<Arc<Notify>>,
        sign_in_gate: Option<Arc<Notify>>,
        /// Signalled when `sign_in` is entered.
        sign_in_entered: Arc<Notify>,
        hang_who_am_i: bool,
        who_am_i_calls: AtomicUsize,
        sign_ups: StdMutex<Vec<SignUpRequest>>,
    }

    impl FakeExchange {
        fn account(mut self, user: &str, password: &str, token: &str, roles: &[&str]) -> Self {
            self.accounts.insert(
                (user.to_string(), password.to_string()),
                SignInResponse {
                    access_token: token.to_string(),
                    token_type: "Bearer".to_string(),
                    identity: IdentityPayload {
                        roles: roles.iter().map(|r| r.to_string()).collect(),
                        ..Default::default()
                    },
                },
            );
            self
        }

        fn identity(mut self, token: &str, identity: IdentityPayload) -> Self {
            self.identities.insert(token.to_string(), identity);
            self
        }
    }

    #[async_trait]
    impl CredentialExchange for FakeExchange {
        async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, ExchangeError> {
            self.sign_in_entered.notify_one();
            if let Some(gate) = &self.sign_in_gate {
                gate.notified().await;
            }
            if let Some(err) = &self.sign_in_failure {
                return Err(err.clone());
            }
            self.accounts
                .get(&(request.username.clone(), request.password.clone()))
                .cloned()
                .ok_or(ExchangeError::Api {
                    status: 401,
                    message: None,
                })
        }

        async fn sign_up(&self, request: &SignUpRequest) -> Result<(), ExchangeError> {
            if let Some(err) = &self.sign_up_failure {
                return Err(err.clone());
            }
            self.sign_ups.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn who_am_i(&self, token: &BearerToken) -> Result<IdentityPayload, ExchangeError> {
            self.who_am_i_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_who_am_i {
                std::future::pending::<()>().await;
            }
            if let Some(gate) = &self.who_am_i_gate {
                gate.notified().await;
            }
            self.identities
                .get(token.as_str())
                .cloned()
                .ok_or(ExchangeError::Api {
                    status: 401,
                    message: Some("token expired".into()),
                })
        }
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl TokenStore for BrokenStore {
        async fn get(&self) -> Result<Option<BearerToken>, TokenStoreError> {
            Ok(None)
        }

        async fn set(&self, _token: &BearerToken) -> Result<(), TokenStoreError> {
            Err(TokenStoreError::Storage("disk full".into()))
        }

        async fn clear(&self) -> Result<(), TokenStoreError> {
            Err(TokenStoreError::Storage("disk full".into()))
        }
    }

    fn manager(store: Arc<InMemoryTokenStore>, exchange: FakeExchange) -> SessionManager {
        SessionManager::new(store, Arc::new(exchange), BearerCredential::new())
    }

    fn assert_consistent(m: &SessionManager) {
        let s = m.session();
        assert_eq!(s.token().is_some(), s.principal().is_some());
        assert_eq!(s.token().cloned(), m.bearer().current());
    }

    #[tokio::test]
    async fn restore_with_accepted_token_authenticates() {
        let store = Arc::new(InMemoryTokenStore::with_token("tok1"));
        let exchange = FakeExchange::default().identity("tok1", identity("alice", &["ROLE_STUDENT"]));
        let m = manager(store.clone(), exchange);

        assert!(m.is_loading());
        assert_eq!(m.initialize().await, SessionStatus::Authenticated);
        assert!(!m.is_loading());
        assert_eq!(m.principal().unwrap().username(), "alice");
        assert!(m.has_role(&Role::STUDENT));
        assert_eq!(store.snapshot(), Some(BearerToken::new("tok1")));
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn restore_with_rejected_token_purges_store() {
        let store = Arc::new(InMemoryTokenStore::with_token("stale"));
        let m = manager(store.clone(), FakeExchange::default());

        assert_eq!(m.initialize().await, SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
        assert!(!m.bearer().is_set());
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn restore_without_token_skips_verification() {
        let exchange = Arc::new(FakeExchange::default());
        let m = SessionManager::new(
            Arc::new(InMemoryTokenStore::new()),
            exchange.clone(),
            BearerCredential::new(),
        );

        assert_eq!(m.initialize().await, SessionStatus::Unauthenticated);
        assert_eq!(exchange.who_am_i_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restore_runs_once() {
        let exchange = Arc::new(
            FakeExchange::default().identity("tok1", identity("alice", &["ROLE_STUDENT"])),
        );
        let m = SessionManager::new(
            Arc::new(InMemoryTokenStore::with_token("tok1")),
            exchange.clone(),
            BearerCredential::new(),
        );

        m.initialize().await;
        m.initialize().await;
        assert_eq!(exchange.who_am_i_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restore_with_roleless_identity_fails_closed() {
        let store = Arc::new(InMemoryTokenStore::with_token("tok1"));
        let exchange = FakeExchange::default().identity("tok1", identity("ghost", &[]));
        let m = manager(store.clone(), exchange);

        assert_eq!(m.initialize().await, SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
    }

    /// Hardening: the bounded restore timeout is an addition, not source behavior.
    #[tokio::test]
    async fn restore_timeout_fails_closed() {
        let store = Arc::new(InMemoryTokenStore::with_token("tok1"));
        let exchange = FakeExchange {
            hang_who_am_i: true,
            ..Default::default()
        };
        let m = manager(store.clone(), exchange).with_restore_timeout(Some(Duration::from_millis(20)));

        assert_eq!(m.initialize().await, SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
        assert!(!m.bearer().is_set());
    }

    #[tokio::test]
    async fn cancelled_restore_rolls_back_and_can_retry() {
        let store = Arc::new(InMemoryTokenStore::with_token("tok1"));
        let gate = Arc::new(Notify::new());
        let exchange = FakeExchange {
            who_am_i_gate: Some(gate.clone()),
            ..FakeExchange::default().identity("tok1", identity("alice", &["ROLE_STUDENT"]))
        };
        let m = manager(store.clone(), exchange);

        let cancelled = tokio::time::timeout(Duration::from_millis(20), m.initialize()).await;
        assert!(cancelled.is_err());
        assert_eq!(m.status(), SessionStatus::Uninitialized);
        assert!(!m.bearer().is_set());
        assert_eq!(store.snapshot(), Some(BearerToken::new("tok1")));

        gate.notify_one();
        assert_eq!(m.initialize().await, SessionStatus::Authenticated);
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn login_persists_token_and_roles() {
        let store = Arc::new(InMemoryTokenStore::new());
        let exchange = FakeExchange::default().account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let m = manager(store.clone(), exchange);
        m.initialize().await;

        let result = m.login("alice", "secret").await;

        assert_eq!(result, AuthResult::ok());
        assert_eq!(store.snapshot(), Some(BearerToken::new("tok1")));
        assert_eq!(m.status(), SessionStatus::Authenticated);
        assert!(m.has_role(&Role::from("ROLE_STUDENT")));
        assert!(!m.has_role(&Role::from("ROLE_HOD")));
        assert_eq!(m.principal().unwrap().username(), "alice");
        assert_eq!(m.bearer().current(), Some(BearerToken::new("tok1")));
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn login_with_bad_credentials_leaves_store_untouched() {
        let store = Arc::new(InMemoryTokenStore::new());
        let exchange = FakeExchange::default().account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let m = manager(store.clone(), exchange);
        m.initialize().await;

        let result = m.login("alice", "wrong").await;

        assert_eq!(result, AuthResult::failed("Login failed"));
        assert!(store.snapshot().is_none());
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(!m.has_role(&Role::STUDENT));
    }

    #[tokio::test]
    async fn failed_login_keeps_existing_session_and_token() {
        let store = Arc::new(InMemoryTokenStore::new());
        let exchange = FakeExchange::default().account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let m = manager(store.clone(), exchange);
        m.initialize().await;
        assert!(m.login("alice", "secret").await.success);

        let result = m.login("alice", "wrong").await;

        assert_eq!(result, AuthResult::failed(LOGIN_FAILED));
        assert_eq!(store.snapshot(), Some(BearerToken::new("tok1")));
        assert_eq!(m.status(), SessionStatus::Authenticated);
        assert_eq!(m.principal().unwrap().username(), "alice");
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn failed_login_after_restore_keeps_persisted_token() {
        let store = Arc::new(InMemoryTokenStore::with_token("tok1"));
        let exchange = FakeExchange::default().identity("tok1", identity("alice", &["ROLE_STUDENT"]));
        let m = manager(store.clone(), exchange);
        assert_eq!(m.initialize().await, SessionStatus::Authenticated);

        assert!(!m.login("alice", "wrong").await.success);

        assert_eq!(store.snapshot(), Some(BearerToken::new("tok1")));
        assert_eq!(m.status(), SessionStatus::Authenticated);
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn login_surfaces_server_reason() {
        let exchange = FakeExchange {
            sign_in_failure: Some(ExchangeError::Api {
                status: 401,
                message: Some("Bad credentials".into()),
            }),
            ..Default::default()
        };
        let m = manager(Arc::new(InMemoryTokenStore::new()), exchange);

        assert_eq!(m.login("alice", "x").await, AuthResult::failed("Bad credentials"));
    }

    #[tokio::test]
    async fn login_transport_failure_is_generic() {
        let exchange = FakeExchange {
            sign_in_failure: Some(ExchangeError::Network("connection refused".into())),
            ..Default::default()
        };
        let m = manager(Arc::new(InMemoryTokenStore::new()), exchange);

        assert_eq!(m.login("alice", "x").await, AuthResult::failed(LOGIN_FAILED));
    }

    #[tokio::test]
    async fn login_with_roleless_identity_fails_closed() {
        let store = Arc::new(InMemoryTokenStore::new());
        let exchange = FakeExchange::default().account("eve", "pw", "tok9", &[]);
        let m = manager(store.clone(), exchange);
        m.initialize().await;

        assert_eq!(m.login("eve", "pw").await, AuthResult::failed(LOGIN_FAILED));
        assert!(store.snapshot().is_none());
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn login_fails_when_token_cannot_be_persisted() {
        let exchange = FakeExchange::default().account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let m = SessionManager::new(Arc::new(BrokenStore), Arc::new(exchange), BearerCredential::new());
        m.initialize().await;

        assert_eq!(m.login("alice", "secret").await, AuthResult::failed(LOGIN_NOT_PERSISTED));
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(!m.bearer().is_set());
    }

    #[tokio::test]
    async fn later_login_wins() {
        let exchange = FakeExchange::default()
            .account("alice", "a", "tok-a", &["ROLE_STUDENT"])
            .account("hod", "h", "tok-h", &["ROLE_HOD", "ROLE_FACULTY"]);
        let store = Arc::new(InMemoryTokenStore::new());
        let m = manager(store.clone(), exchange);
        m.initialize().await;

        assert!(m.login("alice", "a").await.success);
        assert!(m.login("hod", "h").await.success);

        assert_eq!(store.snapshot(), Some(BearerToken::new("tok-h")));
        assert!(m.has_role(&Role::HOD));
        assert!(!m.has_role(&Role::STUDENT));
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let store = Arc::new(InMemoryTokenStore::new());
        let exchange = FakeExchange::default().account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let m = manager(store.clone(), exchange);
        m.initialize().await;
        m.login("alice", "secret").await;

        m.logout().await;
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
        assert!(!m.bearer().is_set());

        m.logout().await;
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(!m.has_role(&Role::STUDENT));
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn logout_succeeds_even_if_store_fails() {
        let m = SessionManager::new(
            Arc::new(BrokenStore),
            Arc::new(FakeExchange::default()),
            BearerCredential::new(),
        );
        m.logout().await;
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn register_does_not_touch_session() {
        let exchange = Arc::new(FakeExchange::default());
        let store = Arc::new(InMemoryTokenStore::new());
        let m = SessionManager::new(store.clone(), exchange.clone(), BearerCredential::new());
        m.initialize().await;

        let request = SignUpRequest {
            username: "carol".into(),
            email: "carol@example.edu".into(),
            password: "pw".into(),
            full_name: "Carol".into(),
            ..Default::default()
        };

        assert_eq!(m.register(&request).await, AuthResult::ok());
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
        assert_eq!(exchange.sign_ups.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_failure_messages() {
        let request = SignUpRequest::default();

        let taken = FakeExchange {
            sign_up_failure: Some(ExchangeError::Api {
                status: 400,
                message: Some("Username is already taken!".into()),
            }),
            ..Default::default()
        };
        let m = manager(Arc::new(InMemoryTokenStore::new()), taken);
        assert_eq!(
            m.register(&request).await,
            AuthResult::failed("Username is already taken!")
        );

        let down = FakeExchange {
            sign_up_failure: Some(ExchangeError::Api {
                status: 502,
                message: Some("upstream".into()),
            }),
            ..Default::default()
        };
        let m = manager(Arc::new(InMemoryTokenStore::new()), down);
        assert_eq!(m.register(&request).await, AuthResult::failed(REGISTRATION_FAILED));
    }

    #[tokio::test]
    async fn login_during_restore_beats_stale_restore() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(InMemoryTokenStore::with_token("stale"));
        let exchange = FakeExchange {
            who_am_i_gate: Some(gate.clone()),
            ..Default::default()
        }
        .account("alice", "secret", "fresh", &["ROLE_STUDENT"]);
        let m = Arc::new(manager(store.clone(), exchange));

        let mut rx = m.subscribe();
        let restore = tokio::spawn({
            let m = m.clone();
            async move { m.initialize().await }
        });
        rx.wait_for(|s| s.status() == SessionStatus::Restoring).await.unwrap();

        assert!(m.login("alice", "secret").await.success);
        gate.notify_one();
        restore.await.unwrap();

        // The stale token's rejection must not purge the fresh session.
        assert_eq!(m.status(), SessionStatus::Authenticated);
        assert_eq!(store.snapshot(), Some(BearerToken::new("fresh")));
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn logout_during_restore_discards_result() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(InMemoryTokenStore::with_token("tok1"));
        let exchange = FakeExchange {
            who_am_i_gate: Some(gate.clone()),
            ..Default::default()
        }
        .identity("tok1", identity("alice", &["ROLE_STUDENT"]));
        let m = Arc::new(manager(store.clone(), exchange));

        let mut rx = m.subscribe();
        let restore = tokio::spawn({
            let m = m.clone();
            async move { m.initialize().await }
        });
        rx.wait_for(|s| s.status() == SessionStatus::Restoring).await.unwrap();
        assert!(m.is_loading());

        m.logout().await;
        gate.notify_one();
        restore.await.unwrap();

        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn logout_during_login_cancels_it() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(InMemoryTokenStore::new());
        let exchange = FakeExchange {
            sign_in_gate: Some(gate.clone()),
            ..Default::default()
        }
        .account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let entered = exchange.sign_in_entered.clone();
        let m = Arc::new(manager(store.clone(), exchange));
        m.initialize().await;

        let login = tokio::spawn({
            let m = m.clone();
            async move { m.login("alice", "secret").await }
        });
        entered.notified().await;
        m.logout().await;
        gate.notify_one();

        assert_eq!(login.await.unwrap(), AuthResult::failed(LOGIN_CANCELLED));
        assert_eq!(m.status(), SessionStatus::Unauthenticated);
        assert!(store.snapshot().is_none());
        assert_consistent(&m);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let exchange = FakeExchange::default().account("alice", "secret", "tok1", &["ROLE_STUDENT"]);
        let m = manager(Arc::new(InMemoryTokenStore::new()), exchange);
        let mut rx = m.subscribe();

        m.initialize().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status(), SessionStatus::Unauthenticated);

        m.login("alice", "secret").await;
        assert_eq!(rx.borrow_and_update().status(), SessionStatus::Authenticated);

        m.logout().await;
        assert_eq!(rx.borrow_and_update().status(), SessionStatus::Unauthenticated);
    }

    #[test]
    fn auth_result_json_shape() {
        let ok = serde_json::to_value(AuthResult::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true}));
        let failed = serde_json::to_value(AuthResult::failed("Login failed")).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "message": "Login failed"}));
    }
}
