//! Common test utilities for E2E tests

use keyhole::{AppState, config};
use tokio::net::TcpListener;

/// Primary cookie-signing key used by the test configuration
pub const TEST_COOKIE_KEY_1: &str = "test-primary-key-32-bytes-long!!";
/// Previous cookie-signing key, still accepted for verification
pub const TEST_COOKIE_KEY_2: &str = "test-rotated-key-32-bytes-long!!";

/// Test server instance
///
/// Serves the real router over plain HTTP on a random port; TLS loading is
/// covered by unit tests against the credential loader.
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let config = test_config();

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = keyhole::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// Create test configuration
pub fn test_config() -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "localhost:3000".to_string(),
            protocol: "http".to_string(),
            tls: config::TlsConfig {
                cert_path: "cert.pem".into(),
                key_path: "key.pem".into(),
            },
        },
        auth: config::AuthConfig {
            cookie_key_1: TEST_COOKIE_KEY_1.to_string(),
            cookie_key_2: Some(TEST_COOKIE_KEY_2.to_string()),
            session_max_age: 86_400,
            google: config::GoogleOAuthConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
            },
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Build a client that does not follow redirects, for asserting on 302s
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build no-redirect client")
}
