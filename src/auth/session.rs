//! Session management
//!
//! Uses HMAC-signed tokens stored in cookies.
//! No server-side session storage needed.
//!
//! Tokens are signed with the primary cookie key; the previous key is still
//! accepted for verification so old cookies survive a key rotation.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Name of the session cookie
pub const SESSION_COOKIE_NAME: &str = "session";

/// User session data
///
/// Stored in a signed cookie. Contains only the stable identifier the
/// identity provider assigned to the user, plus bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Provider-assigned stable user identifier
    pub user_id: String,
    /// Random session id, replaced on regenerate
    pub sid: String,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session for the given identifier
    pub fn new(user_id: impl Into<String>, max_age_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            sid: random_sid(),
            created_at: now,
            expires_at: now + Duration::seconds(max_age_seconds),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

fn random_sid() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `session` - Session data to encode
/// * `key` - HMAC signing key (the primary cookie key)
///
/// # Returns
/// Signed token string
pub fn seal_session(session: &Session, key: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload =
        serde_json::to_string(session).map_err(|e| AppError::Session(e.to_string()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::Session(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// The signature is checked against every configured key, primary first,
/// so cookies issued before a key rotation remain valid.
///
/// # Errors
/// Returns `AppError::Unauthorized` if the token is malformed, carries a
/// signature no key accepts, or has expired. Callers that should treat the
/// request as anonymous discard the error.
pub fn unseal_session(token: &str, keys: &[&str]) -> Result<Session, AppError> {
    use base64::{Engine as _, engine::general_purpose};

    let (payload_b64, signature_b64) = token
        .split_once('.')
        .filter(|(payload, signature)| !payload.is_empty() && !signature.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    if !keys
        .iter()
        .any(|key| signature_matches(key, payload_b64, &expected_signature))
    {
        return Err(AppError::Unauthorized);
    }

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;
    let session: Session =
        serde_json::from_slice(&payload_bytes).map_err(|_| AppError::Unauthorized)?;

    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}

fn signature_matches(key: &str, payload_b64: &str, expected: &[u8]) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(expected).is_ok()
}

// =============================================================================
// Session store adapter
// =============================================================================

/// Minimal session-store capability expected by store-shaped middleware.
///
/// The OAuth delegation chain assumes a persisted session store with
/// regenerate/save semantics. Backed by a sealed cookie there is nothing to
/// persist, so these operations only mark the in-memory state for
/// re-issuance. All of them are idempotent and safe to call repeatedly
/// within a request.
pub trait SessionStore {
    /// Current session, if any
    fn get(&self) -> Option<&Session>;

    /// Rotate the session's internal state without changing its identity
    fn regenerate(&mut self) -> Result<(), AppError>;

    /// Force cookie re-issuance on the next flush
    fn save(&mut self) -> Result<(), AppError>;

    /// Drop the session and instruct the client to discard its cookie
    fn clear(&mut self) -> Result<(), AppError>;
}

/// Request-scoped session store backed by the sealed cookie
#[derive(Debug, Clone)]
pub struct CookieSessionStore {
    session: Option<Session>,
    dirty: bool,
}

impl CookieSessionStore {
    /// Store with no session (anonymous request)
    pub fn empty() -> Self {
        Self {
            session: None,
            dirty: false,
        }
    }

    /// Store holding a freshly established session, pending issuance
    pub fn establish(user_id: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            session: Some(Session::new(user_id, max_age_seconds)),
            dirty: true,
        }
    }

    /// Reconstruct a store from an incoming cookie value.
    ///
    /// Absent, malformed, or expired cookies yield an anonymous store;
    /// no error reaches the route handler.
    pub fn from_cookie(value: Option<&str>, keys: &[&str]) -> Self {
        let session = value.and_then(|token| unseal_session(token, keys).ok());
        Self {
            session,
            dirty: false,
        }
    }

    /// Flush pending changes into the cookie jar.
    ///
    /// Issues a sealed cookie when a session is pending, a removal cookie
    /// when the session was cleared, and leaves the jar untouched otherwise.
    pub fn flush(self, jar: CookieJar, signing_key: &str, secure: bool) -> Result<CookieJar, AppError> {
        if !self.dirty {
            return Ok(jar);
        }

        match &self.session {
            Some(session) => {
                let token = seal_session(session, signing_key)?;
                let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
                let cookie = Cookie::build((SESSION_COOKIE_NAME, token))
                    .http_only(true)
                    .secure(secure)
                    .same_site(SameSite::Lax)
                    .path("/")
                    .max_age(time::Duration::seconds(max_age))
                    .build();
                Ok(jar.add(cookie))
            }
            None => {
                let removal = Cookie::build((SESSION_COOKIE_NAME, ""))
                    .path("/")
                    .max_age(time::Duration::ZERO)
                    .build();
                Ok(jar.add(removal))
            }
        }
    }
}

impl SessionStore for CookieSessionStore {
    fn get(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn regenerate(&mut self) -> Result<(), AppError> {
        if let Some(session) = &mut self.session {
            session.sid = random_sid();
            session.created_at = Utc::now();
            // expires_at is deliberately untouched: regeneration must not
            // extend a session's lifetime
            self.dirty = true;
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), AppError> {
        if self.session.is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), AppError> {
        self.session = None;
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_1: &str = "primary-cookie-key-32-bytes-long";
    const KEY_2: &str = "older---cookie-key-32-bytes-long";

    fn keys() -> Vec<&'static str> {
        vec![KEY_1, KEY_2]
    }

    #[test]
    fn round_trip_preserves_identifier() {
        let session = Session::new("108234567890", 86_400);
        let token = seal_session(&session, KEY_1).expect("seal");
        let decoded = unseal_session(&token, &keys()).expect("unseal");
        assert_eq!(decoded.user_id, "108234567890");
        assert_eq!(decoded.sid, session.sid);
    }

    #[test]
    fn cookie_signed_with_old_key_is_still_accepted() {
        let session = Session::new("rotated-user", 86_400);
        let token = seal_session(&session, KEY_2).expect("seal with old key");
        let decoded = unseal_session(&token, &keys()).expect("old key verifies");
        assert_eq!(decoded.user_id, "rotated-user");
    }

    #[test]
    fn cookie_signed_with_unknown_key_is_rejected() {
        let session = Session::new("intruder", 86_400);
        let token =
            seal_session(&session, "some-other-signing-key-32-bytes!").expect("seal");
        assert!(unseal_session(&token, &keys()).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let session = Session::new("victim", 86_400);
        let token = seal_session(&session, KEY_1).expect("seal");
        let (payload, signature) = token.split_once('.').unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes[0] ^= 0x01;
        let tampered = format!("{}.{}", String::from_utf8(bytes).unwrap(), signature);
        assert!(unseal_session(&tampered, &keys()).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "no-dot", ".", "a.", ".b", "!!!.###"] {
            assert!(unseal_session(token, &keys()).is_err(), "token: {token:?}");
        }
    }

    #[test]
    fn expiry_boundary() {
        let now = Utc::now();
        let mut session = Session::new("boundary", 86_400);

        // Just inside the 24h window
        session.expires_at = now + Duration::seconds(2);
        let token = seal_session(&session, KEY_1).expect("seal");
        assert!(unseal_session(&token, &keys()).is_ok());

        // Just past the 24h window
        session.expires_at = now - Duration::seconds(2);
        let token = seal_session(&session, KEY_1).expect("seal");
        assert!(unseal_session(&token, &keys()).is_err());
    }

    #[test]
    fn store_tolerates_absent_and_garbage_cookies() {
        assert!(CookieSessionStore::from_cookie(None, &keys()).get().is_none());
        assert!(
            CookieSessionStore::from_cookie(Some("garbage"), &keys())
                .get()
                .is_none()
        );
    }

    #[test]
    fn regenerate_rotates_sid_but_keeps_identity_and_expiry() {
        let mut store = CookieSessionStore::establish("stable-user", 86_400);
        let before = store.get().unwrap().clone();

        store.regenerate().expect("regenerate");
        store.regenerate().expect("regenerate is idempotent");

        let after = store.get().unwrap();
        assert_eq!(after.user_id, before.user_id);
        assert_ne!(after.sid, before.sid);
        assert_eq!(after.expires_at, before.expires_at);
    }

    #[test]
    fn regenerate_and_save_are_noops_without_a_session() {
        let mut store = CookieSessionStore::empty();
        store.regenerate().expect("no-op regenerate");
        store.save().expect("no-op save");
        assert!(store.get().is_none());

        let jar = store
            .flush(CookieJar::new(), KEY_1, true)
            .expect("flush clean store");
        assert!(jar.get(SESSION_COOKIE_NAME).is_none());
    }

    #[test]
    fn flush_issues_a_verifiable_cookie() {
        let store = CookieSessionStore::establish("cookie-user", 86_400);
        let jar = store
            .flush(CookieJar::new(), KEY_1, true)
            .expect("flush establishes cookie");

        let cookie = jar.get(SESSION_COOKIE_NAME).expect("session cookie set");
        let decoded = unseal_session(cookie.value(), &keys()).expect("cookie verifies");
        assert_eq!(decoded.user_id, "cookie-user");
    }

    #[test]
    fn clear_emits_a_removal_cookie() {
        let mut store = CookieSessionStore::establish("leaving-user", 86_400);
        store.clear().expect("clear");
        store.clear().expect("clear is idempotent");
        assert!(store.get().is_none());

        let jar = store
            .flush(CookieJar::new(), KEY_1, true)
            .expect("flush removal");
        let cookie = jar.get(SESSION_COOKIE_NAME).expect("removal cookie present");
        assert!(cookie.value().is_empty());
    }
}
