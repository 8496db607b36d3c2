//! Google OAuth flow
//!
//! Implements the OAuth 2.0 authorization code flow with Google.
//!
//! Any provider error, state mismatch, or failed exchange redirects to
//! `/failure`; the dance never silently succeeds and never surfaces a 5xx.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use url::Url;

use super::session::{CookieSessionStore, SessionStore};
use crate::AppState;
use crate::config::GoogleOAuthConfig;
use crate::error::AppError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Requested permission scopes
const SCOPES: [&str; 2] = ["openid", "email"];

const STATE_COOKIE_NAME: &str = "oauth_state";

/// Create authentication router
///
/// Routes:
/// - GET /auth/google - Redirect to Google
/// - GET /auth/google/callback - OAuth callback
/// - GET /auth/logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_redirect))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/logout", get(logout))
}

// =============================================================================
// Google OAuth client
// =============================================================================

/// OAuth 2.0 client for Google's authorization code flow.
///
/// The token exchange and identity verification are delegated to Google's
/// endpoints over the shared HTTP client; nothing is reimplemented locally.
pub struct GoogleClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: Url,
    token_url: Url,
    userinfo_url: Url,
    http: reqwest::Client,
}

/// Token response from Google's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Resolved identity from Google's userinfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    /// Stable provider-assigned identifier
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl GoogleClient {
    /// Create a new Google OAuth client.
    ///
    /// `base_url` is the public base URL of this server; the registered
    /// callback is `<base_url>/auth/google/callback`.
    pub fn new(config: &GoogleOAuthConfig, base_url: &str, http: reqwest::Client) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: format!("{}/auth/google/callback", base_url),
            auth_url: GOOGLE_AUTH_URL.parse().expect("valid default URL"),
            token_url: GOOGLE_TOKEN_URL.parse().expect("valid default URL"),
            userinfo_url: GOOGLE_USERINFO_URL.parse().expect("valid default URL"),
            http,
        }
    }

    /// Build the authorization URL the user agent is redirected to.
    #[must_use]
    pub fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair("scope", &SCOPES.join(" "));
        url.into()
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// Returns [`AppError::HttpClient`] on network failure, or
    /// [`AppError::OAuth`] if the token endpoint returns an error.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Resolve the user's identity from an access token.
    ///
    /// # Errors
    /// Returns [`AppError::HttpClient`] on network failure, or
    /// [`AppError::OAuth`] if the userinfo endpoint returns an error.
    pub async fn verify_identity(&self, access_token: &str) -> Result<Identity, AppError> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        response.json::<Identity>().await.map_err(Into::into)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(AppError::OAuth { operation, detail })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /auth/google
///
/// Redirects user to Google's authorization page.
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in cookie
/// 3. Redirect to Google with client_id, redirect_uri, scope, state
async fn google_redirect(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let csrf_state = generate_csrf_state();
    let location = state.google.authorization_url(&csrf_state);

    let state_cookie = Cookie::build((STATE_COOKIE_NAME, csrf_state))
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .path("/auth")
        .max_age(time::Duration::minutes(10))
        .build();

    (jar.add(state_cookie), Redirect::to(&location))
}

/// Query parameters from the Google callback
#[derive(Debug, Deserialize)]
struct GoogleCallbackQuery {
    /// Authorization code (absent when the provider reports an error)
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Provider error code (e.g., "access_denied")
    error: Option<String>,
}

/// GET /auth/google/callback
///
/// Handles OAuth callback from Google.
///
/// # Steps
/// 1. Check for a provider error
/// 2. Verify CSRF state
/// 3. Exchange code for access token
/// 4. Verify identity against Google's userinfo endpoint
/// 5. Establish session and set cookie
/// 6. Redirect to home
async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<GoogleCallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let expected_state = jar
        .get(STATE_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned());
    let jar = jar.remove(clear_state_cookie());

    if let Some(error) = &query.error {
        tracing::warn!(%error, "Google reported an authorization error");
        return Ok((jar, Redirect::to("/failure")));
    }

    let Some(code) = &query.code else {
        tracing::warn!("Google callback arrived without an authorization code");
        return Ok((jar, Redirect::to("/failure")));
    };

    if !csrf_state_is_valid(query.state.as_deref(), expected_state.as_deref()) {
        tracing::warn!("OAuth state mismatch on Google callback");
        return Ok((jar, Redirect::to("/failure")));
    }

    let identity = match authenticate(&state, code).await {
        Ok(identity) => identity,
        Err(error) => {
            tracing::warn!(%error, "Google code exchange failed");
            return Ok((jar, Redirect::to("/failure")));
        }
    };

    tracing::info!(user_id = %identity.sub, "User logged in via Google");

    let mut store =
        CookieSessionStore::establish(identity.sub, state.config.auth.session_max_age);
    // Rotate internal state before issuance to rule out session fixation
    store.regenerate()?;
    store.save()?;
    let jar = store.flush(
        jar,
        &state.config.auth.cookie_key_1,
        state.config.should_use_secure_cookies(),
    )?;

    Ok((jar, Redirect::to("/")))
}

/// Exchange the authorization code and resolve the identity behind it.
async fn authenticate(state: &AppState, code: &str) -> Result<Identity, AppError> {
    let token = state.google.exchange_code(code).await?;
    state.google.verify_identity(&token.access_token).await
}

/// GET /auth/logout
///
/// Clears the session cookie and redirects to home. A failing clear
/// propagates to the generic error handler instead of redirecting.
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = jar
        .get(super::session::SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned());
    let mut store =
        CookieSessionStore::from_cookie(token.as_deref(), &state.config.auth.cookie_keys());

    if let Some(session) = store.get() {
        tracing::info!(user_id = %session.user_id, "User logged out");
    }

    store.clear()?;
    let jar = store.flush(
        jar,
        &state.config.auth.cookie_key_1,
        state.config.should_use_secure_cookies(),
    )?;

    Ok((jar, Redirect::to("/")))
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify CSRF state from the callback against the state cookie
fn csrf_state_is_valid(callback_state: Option<&str>, cookie_state: Option<&str>) -> bool {
    match (callback_state, cookie_state) {
        (Some(callback), Some(cookie)) => callback == cookie,
        _ => false,
    }
}

fn clear_state_cookie() -> Cookie<'static> {
    Cookie::build((STATE_COOKIE_NAME, ""))
        .path("/auth")
        .max_age(time::Duration::ZERO)
        .build()
}
