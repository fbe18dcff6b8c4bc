//! Push gateway client.
//!
//! The gateway is an opaque HTTP sink: one request per attempt, success or
//! failure. [`HttpGateway`] speaks the legacy GCM form protocol:
//!
//! ```text
//! POST <url>
//! Authorization: key=<api key>
//! Content-Type: application/x-www-form-urlencoded
//!
//! restricted_package_name=<pkg>&registration_id=<id>&data.payload=<base64 envelope>
//! ```
//!
//! A non-2xx status is a failure. So is a 2xx body whose first line starts
//! with `Error=`, which is how the gateway reports per-message errors.

use std::{future::Future, time::Duration};

use bnotify_proto::PAYLOAD_KEY;

use crate::error::GatewayError;

/// Sink for sealed, base64-encoded envelopes.
pub trait Gateway: Send + Sync + 'static {
    /// Deliver one payload. Every error is treated as transient.
    fn push(&self, payload: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Settings for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Endpoint to POST to
    pub url: String,
    /// Value sent as `Authorization: key=<api_key>`
    pub api_key: String,
    /// Target device registration
    pub registration_id: String,
    /// Application package allowed to receive the message
    pub restricted_package_name: String,
    /// Deadline for one request, including connect
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    /// Legacy GCM send endpoint.
    pub const DEFAULT_URL: &'static str = "https://android.googleapis.com/gcm/send";

    /// Package name of the receiving application.
    pub const DEFAULT_PACKAGE: &'static str = "cc.bran.bnotify";

    /// Default per-request deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Config with default URL, package, and timeout.
    pub fn new(api_key: impl Into<String>, registration_id: impl Into<String>) -> Self {
        Self {
            url: Self::DEFAULT_URL.to_string(),
            api_key: api_key.into(),
            registration_id: registration_id.into(),
            restricted_package_name: Self::DEFAULT_PACKAGE.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// [`Gateway`] backed by an HTTP form POST.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
}

impl HttpGateway {
    /// Build the HTTP client.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

impl Gateway for HttpGateway {
    fn push(&self, payload: &str) -> impl Future<Output = Result<(), GatewayError>> + Send {
        async move {
            let payload_field = format!("data.{PAYLOAD_KEY}");
            let form = [
                ("restricted_package_name", self.config.restricted_package_name.as_str()),
                ("registration_id", self.config.registration_id.as_str()),
                (payload_field.as_str(), payload),
            ];

            let response = self
                .client
                .post(&self.config.url)
                .header("Authorization", format!("key={}", self.config.api_key))
                .form(&form)
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GatewayError::Status { status: status.as_u16() });
            }

            let body = response.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
            check_body(&body)
        }
    }
}

/// Detect an application-level error in a successful response body.
fn check_body(body: &str) -> Result<(), GatewayError> {
    let first_line = body.lines().next().unwrap_or_default();
    match first_line.strip_prefix("Error=") {
        Some(reason) => Err(GatewayError::Rejected(reason.trim().to_string())),
        None => Ok(()),
    }
}
