//! Device key directory client.
//!
//! Fetches the human's registered device public keys from the backend REST
//! surface and registers freshly generated agent keys, both authenticated
//! with the external bearer credential.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use hitl_types::config::ProxyConfig;
use hitl_types::errors::ProxyError;
use hitl_types::traits::{CredentialProvider, DeviceDirectory};

const DEVICE_KEYS_PATH: &str = "/api/v1/devices/public-keys";
const KEY_REGISTER_PATH: &str = "/api/v1/keys/register";
/// How much response body to keep in error messages.
const BODY_SNIPPET_LEN: usize = 256;

#[derive(Deserialize)]
struct PublicKeysResponse {
    #[serde(default)]
    public_keys: Vec<String>,
}

/// HTTP client for the backend's key directory endpoints.
pub struct DeviceKeyClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl DeviceKeyClient {
    /// A directory client for the configured backend.
    pub fn new(
        config: &ProxyConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.backend_base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Like [`DeviceKeyClient::new`] with an explicit base URL (tests).
    pub fn with_base_url(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Register the agent's public key with the backend.
    ///
    /// Best-effort: failures are logged and reported as `false`, never
    /// raised. A missing registration only means the human's devices cannot
    /// verify the agent yet; the next proxy start will retry.
    pub async fn register_public_key(&self, public_key_b64: &str) -> bool {
        let token = match self.credentials.bearer_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "skipping public key registration");
                return false;
            }
        };

        let url = format!("{}{KEY_REGISTER_PATH}", self.base_url);
        let body = serde_json::json!({
            "entity_type": "agent",
            "public_key": public_key_b64,
        });

        match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("registered agent public key with backend");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "public key registration rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "public key registration failed");
                false
            }
        }
    }
}

#[async_trait]
impl DeviceDirectory for DeviceKeyClient {
    /// Fetch the device public keys registered for the authenticated account.
    ///
    /// An empty list is returned as-is: zero registered devices is a
    /// legitimate account state, not a transport failure.
    async fn fetch_device_public_keys(&self) -> Result<Vec<String>, ProxyError> {
        // Fail before any network traffic when no credential is available.
        let token = self.credentials.bearer_token()?;

        let url = format!("{}{DEVICE_KEYS_PATH}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProxyError::DeviceKeyFetch {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProxyError::DeviceKeyFetch {
                status: status.as_u16(),
                body: body.chars().take(BODY_SNIPPET_LEN).collect(),
            });
        }

        let parsed: PublicKeysResponse =
            serde_json::from_str(&body).map_err(|e| ProxyError::DeviceKeyFetch {
                status: status.as_u16(),
                body: format!("unparseable device key response: {e}"),
            })?;
        Ok(parsed.public_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;

    struct FixedToken(&'static str);

    impl CredentialProvider for FixedToken {
        fn bearer_token(&self) -> Result<String, ProxyError> {
            Ok(self.0.to_string())
        }
    }

    struct NoToken;

    impl CredentialProvider for NoToken {
        fn bearer_token(&self) -> Result<String, ProxyError> {
            Err(ProxyError::AuthenticationRequired("not logged in".to_string()))
        }
    }

    async fn start_test_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> DeviceKeyClient {
        DeviceKeyClient::with_base_url(base_url, credentials, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_registered_keys() {
        let app = Router::new().route(
            "/api/v1/devices/public-keys",
            get(|| async {
                axum::Json(serde_json::json!({"public_keys": ["key-a", "key-b"]}))
            }),
        );
        let base = start_test_server(app).await;

        let keys = client(&base, Arc::new(FixedToken("tok")))
            .fetch_device_public_keys()
            .await
            .unwrap();
        assert_eq!(keys, vec!["key-a", "key-b"]);
    }

    #[tokio::test]
    async fn empty_key_list_is_ok_not_error() {
        let app = Router::new().route(
            "/api/v1/devices/public-keys",
            get(|| async { axum::Json(serde_json::json!({"public_keys": []})) }),
        );
        let base = start_test_server(app).await;

        let keys = client(&base, Arc::new(FixedToken("tok")))
            .fetch_device_public_keys()
            .await
            .unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_carries_code_and_body() {
        let app = Router::new().route(
            "/api/v1/devices/public-keys",
            get(|| async { (axum::http::StatusCode::UNAUTHORIZED, "token expired") }),
        );
        let base = start_test_server(app).await;

        let err = client(&base, Arc::new(FixedToken("tok")))
            .fetch_device_public_keys()
            .await
            .unwrap_err();
        match err {
            ProxyError::DeviceKeyFetch { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("token expired"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        static HITS: AtomicU32 = AtomicU32::new(0);
        let app = Router::new().route(
            "/api/v1/devices/public-keys",
            get(|| async {
                HITS.fetch_add(1, Ordering::SeqCst);
                axum::Json(serde_json::json!({"public_keys": []}))
            }),
        );
        let base = start_test_server(app).await;

        let err = client(&base, Arc::new(NoToken))
            .fetch_device_public_keys()
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::AuthenticationRequired(_)));
        assert_eq!(HITS.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn register_public_key_is_best_effort() {
        let ok_app = Router::new().route(
            "/api/v1/keys/register",
            post(|| async { axum::Json(serde_json::json!({"status": "ok"})) }),
        );
        let base = start_test_server(ok_app).await;
        assert!(client(&base, Arc::new(FixedToken("tok")))
            .register_public_key("pub-key")
            .await);

        let failing_app = Router::new().route(
            "/api/v1/keys/register",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = start_test_server(failing_app).await;
        assert!(!client(&base, Arc::new(FixedToken("tok")))
            .register_public_key("pub-key")
            .await);

        // No credential: skipped, not raised.
        assert!(!client(&base, Arc::new(NoToken)).register_public_key("pub-key").await);
    }
}
