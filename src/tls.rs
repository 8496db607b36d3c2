//! TLS listener setup using rustls.
//!
//! The certificate and private key are static PEM files read from disk once
//! at startup. Unreadable or unparseable credentials are fatal.

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

/// Build a rustls server configuration from the configured PEM paths.
///
/// # Errors
///
/// Returns an error if either file cannot be read, or if the certificate or
/// private key cannot be parsed.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig> {
    RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .with_context(|| {
            format!(
                "failed to load TLS credentials from {} and {}",
                tls.cert_path.display(),
                tls.key_path.display()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[tokio::test]
    async fn rejects_missing_files() {
        let tls = TlsConfig {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        };
        assert!(load_tls_config(&tls).await.is_err());
    }

    #[tokio::test]
    async fn rejects_garbage_pem() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        let mut cert = std::fs::File::create(&cert_path).expect("create cert");
        cert.write_all(b"not a pem").expect("write cert");
        let mut key = std::fs::File::create(&key_path).expect("create key");
        key.write_all(b"also not a pem").expect("write key");

        let tls = TlsConfig {
            cert_path,
            key_path,
        };
        assert!(load_tls_config(&tls).await.is_err());
    }
}
