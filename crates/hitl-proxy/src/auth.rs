//! Bearer credential source.
//!
//! The OAuth login flow that produces the token is an external collaborator;
//! this module only reads its output: either the `HITL_OAUTH_TOKEN`
//! environment variable or the `token.json` file the login flow writes into
//! the config directory.

use std::path::PathBuf;

use serde::Deserialize;

use hitl_types::config::ProxyConfig;
use hitl_types::errors::ProxyError;
use hitl_types::traits::CredentialProvider;

/// Environment variable carrying a bearer token directly.
pub const ENV_OAUTH_TOKEN: &str = "HITL_OAUTH_TOKEN";

#[derive(Deserialize)]
struct TokenFile {
    access_token: String,
}

/// Credential provider backed by the environment or the stored token file.
///
/// The token is read on every call rather than cached: the login flow may
/// refresh the file underneath a long-lived proxy process.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    token_path: PathBuf,
}

impl StoredCredentials {
    /// Credentials located per the proxy configuration.
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            token_path: config.token_path(),
        }
    }

    /// Credentials backed by an explicit token file path.
    pub fn with_path(token_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
        }
    }
}

impl CredentialProvider for StoredCredentials {
    fn bearer_token(&self) -> Result<String, ProxyError> {
        if let Ok(token) = std::env::var(ENV_OAUTH_TOKEN) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }

        let raw = std::fs::read_to_string(&self.token_path).map_err(|_| {
            ProxyError::AuthenticationRequired(format!(
                "no bearer token in {ENV_OAUTH_TOKEN} or {}; log in first",
                self.token_path.display()
            ))
        })?;
        let file: TokenFile = serde_json::from_str(&raw).map_err(|e| {
            ProxyError::AuthenticationRequired(format!(
                "stored token file is unreadable: {e}"
            ))
        })?;
        if file.access_token.trim().is_empty() {
            return Err(ProxyError::AuthenticationRequired(
                "stored token file has an empty access_token".to_string(),
            ));
        }
        Ok(file.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_file_requires_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let creds = StoredCredentials::with_path(dir.path().join("token.json"));
        let err = creds.bearer_token().unwrap_err();
        assert!(matches!(err, ProxyError::AuthenticationRequired(_)));
    }

    #[test]
    fn token_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": "tok-123"}"#).unwrap();

        let creds = StoredCredentials::with_path(&path);
        assert_eq!(creds.bearer_token().unwrap(), "tok-123");
    }

    #[test]
    fn malformed_token_file_requires_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        let creds = StoredCredentials::with_path(&path);
        let err = creds.bearer_token().unwrap_err();
        assert!(matches!(err, ProxyError::AuthenticationRequired(_)));
    }

    #[test]
    fn empty_access_token_requires_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": ""}"#).unwrap();

        let creds = StoredCredentials::with_path(&path);
        let err = creds.bearer_token().unwrap_err();
        assert!(matches!(err, ProxyError::AuthenticationRequired(_)));
    }
}
