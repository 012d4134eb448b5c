//! `campus-client`
//!
//! **Responsibility:** session lifecycle of the campus administration client.
//!
//! This crate provides:
//! - Durable token storage (SQLite, in-memory)
//! - The credential exchange boundary (sign-in, sign-up, "who am I")
//! - The session manager that restores, establishes and ends sessions
//! - The shared bearer credential attached to every outgoing request
//!
//! Access decisions live in `campus-auth`; this crate only feeds them.

pub mod api;
pub mod config;
pub mod credentials;
pub mod session_manager;
pub mod token_store;
pub mod types;

pub use api::{ApiClient, BearerCredential};
pub use config::{ClientConfig, ConfigError, Endpoints};
pub use credentials::{CredentialExchange, ExchangeError, HttpCredentialClient};
pub use session_manager::{AuthResult, SessionManager};
pub use token_store::{InMemoryTokenStore, SqliteTokenStore, TokenStore, TokenStoreError};
pub use types::{IdentityPayload, SignInRequest, SignInResponse, SignUpRequest};
