//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)
//!
//! The OAuth credentials and cookie-signing keys are also accepted from the
//! bare environment names `CLIENT_ID`, `CLIENT_SECRET`, `COOKIE_KEY_1` and
//! `COOKIE_KEY_2`, which take precedence over file values.

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (default: 3000)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "login.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    pub tls: TlsConfig,
}

impl ServerConfig {
    /// Get the base URL for the server
    ///
    /// # Returns
    /// Full URL like "https://login.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// TLS credential paths, read once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to PEM-encoded certificate chain
    pub cert_path: PathBuf,
    /// Path to PEM-encoded private key
    pub key_path: PathBuf,
}

/// Authentication configuration (Google OAuth + cookie sessions)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Primary cookie-signing key (32+ bytes); new cookies are signed with this
    pub cookie_key_1: String,
    /// Previous cookie-signing key, still accepted for verification
    pub cookie_key_2: Option<String>,
    /// Session max age in seconds (default: 86400 = 24 hours)
    pub session_max_age: i64,
    pub google: GoogleOAuthConfig,
}

impl AuthConfig {
    /// Signing keys in verification order, primary first
    pub fn cookie_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.cookie_key_1.as_str()];
        if let Some(key) = &self.cookie_key_2 {
            keys.push(key.as_str());
        }
        keys
    }
}

/// Google OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (KEYHOLE_*)
    /// 5. Bare credential names (CLIENT_ID, CLIENT_SECRET, COOKIE_KEY_1, COOKIE_KEY_2)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.domain", "localhost:3000")?
            .set_default("server.protocol", "https")?
            .set_default("server.tls.cert_path", "cert.pem")?
            .set_default("server.tls.key_path", "key.pem")?
            .set_default("auth.session_max_age", 86_400)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (KEYHOLE_*)
            .add_source(
                Environment::with_prefix("KEYHOLE")
                    .separator("__")
                    .try_parsing(true),
            )
            // Bare credential names win over everything else
            .set_override_option("auth.google.client_id", std::env::var("CLIENT_ID").ok())?
            .set_override_option(
                "auth.google.client_secret",
                std::env::var("CLIENT_SECRET").ok(),
            )?
            .set_override_option("auth.cookie_key_1", std::env::var("COOKIE_KEY_1").ok())?
            .set_override_option("auth.cookie_key_2", std::env::var("COOKIE_KEY_2").ok())?
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_COOKIE_KEY_BYTES: usize = 32;

        for (name, key) in [
            ("auth.cookie_key_1", Some(&self.auth.cookie_key_1)),
            ("auth.cookie_key_2", self.auth.cookie_key_2.as_ref()),
        ] {
            if let Some(key) = key {
                if key.as_bytes().len() < MIN_COOKIE_KEY_BYTES {
                    return Err(crate::error::AppError::Config(format!(
                        "{} must be at least {} bytes",
                        name, MIN_COOKIE_KEY_BYTES
                    )));
                }
            }
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.auth.google.client_id.is_empty() || self.auth.google.client_secret.is_empty() {
            return Err(crate::error::AppError::Config(
                "auth.google.client_id and auth.google.client_secret are required".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            tracing::warn!(
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        }

        Ok(())
    }
}
