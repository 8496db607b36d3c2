//! Keyhole - a minimal HTTPS server gating a secret behind Google sign-in
//!
//! # Architecture
//!
//! ```text
//! request ──► TLS terminator (rustls)
//!         ──► security header middleware
//!         ──► session codec (sealed cookie)
//!         ──► OAuth delegate / access gate
//!         ──► route dispatcher
//! ```
//!
//! The sealed session cookie is the only server-side session state; there is
//! no session store. OAuth identity verification is delegated to Google.
//!
//! # Modules
//!
//! - `auth`: Google OAuth flow, session codec, authentication middleware
//! - `config`: Configuration management
//! - `error`: Error types
//! - `headers`: Fixed hardening header set
//! - `tls`: TLS credential loading

pub mod auth;
pub mod config;
pub mod error;
pub mod headers;
pub mod tls;

use std::sync::Arc;

use auth::{CurrentUser, MaybeUser};

/// Application state shared across all handlers
///
/// This struct is cloned for each request. Everything in it is read-only
/// after startup, so no cross-request coordination is needed.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Google OAuth client
    pub google: Arc<auth::GoogleClient>,

    /// HTTP client for the provider round trips
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent("Keyhole/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let google = auth::GoogleClient::new(
            &config.auth.google,
            &config.server.base_url(),
            http_client.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            google: Arc::new(google),
            http_client: Arc::new(http_client),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, routing::get};
    use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

    Router::new()
        .route("/", get(landing_page))
        .route("/secret", get(secret))
        .route("/failure", get(failure_page))
        .merge(auth::auth_router())
        .layer(axum::middleware::from_fn(headers::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .with_state(state)
}

/// GET /
///
/// Renders the static landing page. Anonymous visitors get a Google
/// sign-in link, authenticated ones a logout link.
async fn landing_page(MaybeUser(user): MaybeUser) -> axum::response::Html<String> {
    let action = match &user {
        Some(_) => {
            r#"<p>You are signed in.</p>
            <a href="/secret">View your secret</a>
            <a href="/auth/logout">Log out</a>"#
        }
        None => {
            r#"<p>Please sign in with Google</p>
            <a href="/auth/google">Sign in with Google</a>"#
        }
    };

    axum::response::Html(format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head><title>Keyhole</title></head>
        <body>
            <h1>Keyhole</h1>
            {action}
        </body>
        </html>
    "#
    ))
}

/// GET /secret
///
/// Gated by [`CurrentUser`]: without a valid session the extractor rejects
/// with 401 before this handler runs.
async fn secret(CurrentUser(session): CurrentUser) -> &'static str {
    tracing::debug!(user_id = %session.user_id, "Secret accessed");
    "Your personal secret value is 42"
}

/// GET /failure
async fn failure_page() -> &'static str {
    "Failed to login"
}
