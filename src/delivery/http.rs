//! HTTP delivery target
//!
//! A 409 is accepted only when the target reports the stored posting's
//! fingerprint, in the `Content-Fingerprint` header or a `fingerprint`
//! field of the JSON body, and it equals ours.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};

use crate::transform::TransformedPosting;

use super::classify::{conflict_outcome, outcome_for_status, parse_retry_after};
use super::errors::{DeliveryError, DeliveryResult};
use super::{DeliveryOutcome, DeliveryTarget};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const FINGERPRINT_HEADER: &str = "Content-Fingerprint";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTargetConfig {
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_endpoint() -> String {
    "/postings".to_string()
}

fn default_api_key_env() -> String {
    "CHRONOSYNC_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl HttpTargetConfig {
    pub fn validate(&self) -> DeliveryResult<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(DeliveryError::InvalidConfig(format!(
                "base_url must be http(s): '{}'",
                self.base_url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(DeliveryError::InvalidConfig(
                "timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Full posting URL
    pub fn url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            base.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }
}

pub struct HttpTarget {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTarget {
    pub fn new(config: &HttpTargetConfig, api_key: Option<String>) -> DeliveryResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("chronosync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url(),
            api_key,
        })
    }

    /// Build a target, reading the bearer token from `api_key_env`
    pub fn from_env(config: &HttpTargetConfig) -> DeliveryResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| DeliveryError::MissingCredential(config.api_key_env.clone()))?;
        Self::new(config, Some(api_key))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Fingerprint the target holds for a conflicting key, if it says
async fn echoed_fingerprint(response: reqwest::Response) -> Option<String> {
    if let Some(value) = response
        .headers()
        .get(FINGERPRINT_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(value.trim().to_string());
    }
    let body = response.text().await.ok()?;
    let json: serde_json::Value = serde_json::from_str(&body).ok()?;
    json.get("fingerprint")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[async_trait]
impl DeliveryTarget for HttpTarget {
    async fn deliver(&self, posting: &TransformedPosting) -> DeliveryOutcome {
        let mut request = self
            .client
            .post(&self.url)
            .header(IDEMPOTENCY_KEY_HEADER, posting.idempotency_key.as_str())
            .json(posting);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status().as_u16() == 409 => {
                let echoed = echoed_fingerprint(response).await;
                conflict_outcome(
                    &posting.idempotency_key,
                    &posting.fingerprint,
                    echoed.as_deref(),
                )
            }
            Ok(response) => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                outcome_for_status(response.status().as_u16(), retry_after)
            }
            Err(e) if e.is_builder() => {
                DeliveryOutcome::permanent(format!("request could not be built: {}", e))
            }
            Err(e) => DeliveryOutcome::retryable(format!("transport error: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> HttpTargetConfig {
        HttpTargetConfig {
            base_url: base_url.to_string(),
            endpoint: "/api/postings".to_string(),
            api_key_env: default_api_key_env(),
            timeout_ms: 2_000,
        }
    }

    fn posting() -> TransformedPosting {
        TransformedPosting::new("cases:1".into(), Position::new(1), BTreeMap::new(), vec![])
            .unwrap()
    }

    /// Serve one canned response and hand back the raw request
    async fn serve_once(
        response: impl Into<String>,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let response = response.into();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let body_len = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if received.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_url_joining() {
        assert_eq!(config("https://t.example/").url(), "https://t.example/api/postings");
        let mut c = config("https://t.example");
        c.endpoint = "v1/postings".into();
        assert_eq!(c.url(), "https://t.example/v1/postings");
    }

    #[test]
    fn test_validate() {
        assert!(config("ftp://t.example").validate().is_err());
        assert!(config("https://t.example").validate().is_ok());
    }

    #[tokio::test]
    async fn test_request_carries_idempotency_key_and_token() {
        let (base, server) =
            serve_once("HTTP/1.1 201 Created\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        let target = HttpTarget::new(&config(&base), Some("secret".into())).unwrap();

        let outcome = target.deliver(&posting()).await;
        let request = server.await.unwrap().to_lowercase();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(request.starts_with("post /api/postings"));
        assert!(request.contains("idempotency-key: cases:1"));
        assert!(request.contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_unavailable_with_retry_after() {
        let (base, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nretry-after: 7\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let target = HttpTarget::new(&config(&base), None).unwrap();

        let outcome = target.deliver(&posting()).await;
        server.await.unwrap();

        assert_eq!(
            outcome,
            DeliveryOutcome::RetryableFailure {
                reason: "target responded 503".into(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[tokio::test]
    async fn test_conflict_with_same_fingerprint_header_is_delivered() {
        let posting = posting();
        let (base, server) = serve_once(format!(
            "HTTP/1.1 409 Conflict\r\ncontent-fingerprint: {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            posting.fingerprint
        ))
        .await;
        let target = HttpTarget::new(&config(&base), None).unwrap();

        let outcome = target.deliver(&posting).await;
        server.await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_conflict_with_other_content_is_permanent() {
        let body = r#"{"fingerprint":"0000"}"#;
        let (base, server) = serve_once(format!(
            "HTTP/1.1 409 Conflict\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;
        let target = HttpTarget::new(&config(&base), None).unwrap();

        let outcome = target.deliver(&posting()).await;
        server.await.unwrap();
        match outcome {
            DeliveryOutcome::PermanentFailure { reason } => {
                assert!(reason.contains("different content"), "{}", reason)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bare_conflict_is_permanent() {
        let (base, server) =
            serve_once("HTTP/1.1 409 Conflict\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        let target = HttpTarget::new(&config(&base), None).unwrap();

        let outcome = target.deliver(&posting()).await;
        server.await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::PermanentFailure { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = HttpTarget::new(&config(&format!("http://{}", addr)), None).unwrap();
        let outcome = target.deliver(&posting()).await;
        assert!(matches!(outcome, DeliveryOutcome::RetryableFailure { .. }));
    }
}
