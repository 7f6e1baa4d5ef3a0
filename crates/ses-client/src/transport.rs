//! # HTTPS Transport
//!
//! The engine talks to the entitlement server through the [`Transport`]
//! trait so that the exchange logic can be exercised without a network.
//! [`HttpsTransport`] is the production implementation on top of
//! `reqwest`.
//!
//! ## Wire Behaviour
//!
//! Each round-trip is a single `POST` of a JSON array. The body is
//! gzip-compressed (`Content-Encoding: gzip`) and the client advertises
//! `Accept: application/json`. Gzip-encoded responses are decompressed
//! transparently. Any status other than `200 OK` is a transport failure; a
//! `Retry-After` header on such a response is kept for the caller.
//!
//! ## Sync Bridge
//!
//! The engine is blocking. `HttpsTransport::send` borrows the current Tokio
//! runtime handle and blocks on the request, so it must be called from a
//! thread that has entered a runtime but is not driving async tasks itself
//! (a `spawn_blocking` task or the entitlement worker thread). Retries are
//! NOT built into the transport.

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::config::{EntitlementConfig, DEFAULT_TIMEOUT_SECS};

/// One request to the entitlement server.
#[derive(Debug, Clone)]
pub struct EntitlementRequest {
    /// Server endpoint.
    pub url: Url,
    /// JSON array body.
    pub body: Value,
}

/// A `200 OK` response from the entitlement server.
#[derive(Debug, Clone, Default)]
pub struct EntitlementResponse {
    /// Decoded response body. Expected to be a JSON array but not checked here.
    pub body: String,
}

impl EntitlementResponse {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Carries one request to the server and returns its body.
pub trait Transport: Send + Sync {
    /// Perform a single round-trip.
    fn send(&self, request: &EntitlementRequest) -> Result<EntitlementResponse, TransportError>;

    /// Name used in log fields.
    fn transport_name(&self) -> &str;
}

/// Failure of a single HTTPS round-trip.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS, TLS or I/O failure.
    #[error("connection failed: {reason}")]
    Connect { reason: String },

    /// The request did not complete in time.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The server answered with a status other than 200.
    #[error("server returned HTTP {status}")]
    HttpStatus {
        status: u16,
        /// Raw `Retry-After` header value, if the server sent one.
        retry_after: Option<String>,
    },

    /// The response body could not be read.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// The request body could not be compressed.
    #[error("failed to encode request body: {reason}")]
    Encoding { reason: String },

    /// `send` was called outside a Tokio runtime.
    #[error("no async runtime available for HTTP request")]
    NoRuntime,
}

/// Configuration for [`HttpsTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl From<&EntitlementConfig> for TransportConfig {
    fn from(config: &EntitlementConfig) -> Self {
        Self {
            timeout_secs: config.timeout_secs,
        }
    }
}

/// `reqwest`-backed transport.
#[derive(Debug)]
pub struct HttpsTransport {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpsTransport {
    /// Build the underlying HTTP client.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Connect {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            timeout_ms: config.timeout_secs.saturating_mul(1000),
        })
    }

    async fn post(&self, request: &EntitlementRequest) -> Result<EntitlementResponse, TransportError> {
        let body = gzip(request.body.to_string().as_bytes())?;

        let resp = self
            .client
            .post(request.url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            tracing::debug!(
                status = status.as_u16(),
                retry_after = ?retry_after,
                "entitlement server rejected request"
            );
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    elapsed_ms: self.timeout_ms,
                }
            } else {
                TransportError::MalformedResponse {
                    reason: format!("failed to read body: {e}"),
                }
            }
        })?;

        Ok(EntitlementResponse { body })
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                elapsed_ms: self.timeout_ms,
            }
        } else {
            TransportError::Connect {
                reason: e.to_string(),
            }
        }
    }
}

impl Transport for HttpsTransport {
    fn send(&self, request: &EntitlementRequest) -> Result<EntitlementResponse, TransportError> {
        let rt = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        tracing::debug!(host = request.url.host_str().unwrap_or_default(), "POST entitlement request");
        rt.block_on(self.post(request))
    }

    fn transport_name(&self) -> &str {
        "https"
    }
}

/// Gzip-compress a request body.
pub(crate) fn gzip(bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
    let encoding_error = |e: std::io::Error| TransportError::Encoding {
        reason: e.to_string(),
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(encoding_error)?;
    encoder.finish().map_err(encoding_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn gzip_output_decodes_to_input() {
        let compressed = gzip(br#"[{"message-id":1}]"#).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, r#"[{"message-id":1}]"#);
    }

    #[test]
    fn default_config_uses_thirty_seconds() {
        assert_eq!(TransportConfig::default().timeout_secs, 30);
    }

    #[test]
    fn config_follows_entitlement_config() {
        let mut cfg = EntitlementConfig::new("https://ses.example.com").unwrap();
        cfg.timeout_secs = 5;
        assert_eq!(TransportConfig::from(&cfg).timeout_secs, 5);
    }

    #[test]
    fn send_outside_runtime_fails() {
        let transport = HttpsTransport::new(TransportConfig::default()).unwrap();
        let request = EntitlementRequest {
            url: Url::parse("https://ses.example.com").unwrap(),
            body: serde_json::json!([]),
        };
        let err = transport.send(&request).unwrap_err();
        assert!(matches!(err, TransportError::NoRuntime));
        assert_eq!(transport.transport_name(), "https");
    }

    #[test]
    fn http_status_display() {
        let err = TransportError::HttpStatus {
            status: 503,
            retry_after: Some("120".into()),
        };
        assert_eq!(err.to_string(), "server returned HTTP 503");
    }
}
