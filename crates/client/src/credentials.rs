//! Credential exchange with the campus auth endpoints.

use async_trait::async_trait;
use campus_auth::BearerToken;
use reqwest::{Method, Response};

use crate::api::ApiClient;
use crate::config::Endpoints;
use crate::types::{IdentityPayload, SignInRequest, SignInResponse, SignUpRequest, server_message};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("API error ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Api { status: u16, message: Option<String> },
    #[error("parse error: {0}")]
    Parse(String),
}

impl ExchangeError {
    /// Reason worth showing to a user, if the server provided one.
    ///
    /// Transport failures and 5xx responses never leak details.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ExchangeError::Api { status, message } if *status < 500 => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ExchangeError::Api { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

/// The three auth calls the session core depends on.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Exchange raw credentials for a token and identity.
    async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, ExchangeError>;

    /// Submit new-account data. Success carries no payload.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), ExchangeError>;

    /// Resolve a token into the identity it belongs to.
    async fn who_am_i(&self, token: &BearerToken) -> Result<IdentityPayload, ExchangeError>;
}

/// [`CredentialExchange`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpCredentialClient {
    api: ApiClient,
    endpoints: Endpoints,
}

impl HttpCredentialClient {
    pub fn new(api: ApiClient, endpoints: Endpoints) -> Self {
        Self { api, endpoints }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    async fn check(resp: Response) -> Result<Response, ExchangeError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ExchangeError::Api {
            status: status.as_u16(),
            message: server_message(&body),
        })
    }
}

#[async_trait]
impl CredentialExchange for HttpCredentialClient {
    async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, ExchangeError> {
        tracing::debug!(username = %request.username, "sign-in request");
        let resp = self
            .api
            .anonymous(Method::POST, &self.endpoints.sign_in)
            .json(request)
            .send()
            .await?;

        let resp = Self::check(resp).await?;
        resp.json::<SignInResponse>()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), ExchangeError> {
        tracing::debug!(username = %request.username, "sign-up request");
        let resp = self
            .api
            .anonymous(Method::POST, &self.endpoints.sign_up)
            .json(request)
            .send()
            .await?;

        Self::check(resp).await?;
        Ok(())
    }

    async fn who_am_i(&self, token: &BearerToken) -> Result<IdentityPayload, ExchangeError> {
        let resp = self
            .api
            .request_with(Method::GET, &self.endpoints.who_am_i, token)
            .send()
            .await?;

        let resp = Self::check(resp).await?;
        resp.json::<IdentityPayload>()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))
    }
}
