//! `campus-auth`: pure session model and authorization gate.
//!
//! This crate is intentionally decoupled from HTTP, storage and async runtimes.

pub mod gate;
pub mod navigation;
pub mod principal;
pub mod roles;
pub mod session;

pub use gate::{
    DenialNotice, GateExplanation, GuardView, LOGIN_PATH, Navigator, Outcome, ProtectedRoute,
    decide, explain,
};
pub use navigation::{NavItem, default_menu, primary_role, visible_items};
pub use principal::{Principal, PrincipalError, PrincipalId};
pub use roles::{Role, RoleQuery, RoleSet, role_set};
pub use session::{BearerToken, Session, SessionStatus, SessionView};
