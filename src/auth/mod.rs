//! Google OAuth authentication
//!
//! Handles:
//! - Google OAuth flow
//! - Session management
//! - Authentication middleware

mod middleware;
mod oauth;
pub mod session;

pub use middleware::{CurrentUser, MaybeUser};
pub use oauth::{GoogleClient, Identity, TokenResponse, auth_router};
pub use session::{CookieSessionStore, Session, SessionStore, seal_session, unseal_session};
