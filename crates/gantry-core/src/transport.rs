//! Session transport boundary.
//!
//! The harness treats the remote automation protocol as an external
//! collaborator: open a session given a capability set, adjust its implicit
//! wait, close it by handle. [`SessionTransport`] captures exactly that
//! contract so the session manager can be exercised against a mock, and
//! [`WebDriverTransport`] is the shipped implementation speaking the W3C
//! WebDriver HTTP wire protocol that Appium-compatible servers expose.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gantry_core::capabilities::CapabilitySet;
//! use gantry_core::transport::{SessionTransport, WebDriverTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = WebDriverTransport::new("http://localhost:4723/wd/hub")?;
//!
//! let mut caps = CapabilitySet::new();
//! caps.set("platformName", "android");
//!
//! let handle = transport.open(&caps).await?;
//! transport.set_implicit_wait(&handle, Duration::from_secs(10)).await?;
//! transport.close(&handle).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::capabilities::CapabilitySet;

// ---------------------------------------------------------------------------
// Handle and errors
// ---------------------------------------------------------------------------

/// Opaque identifier of a live remote session, as issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Wrap a server-issued session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw session identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised at the transport boundary.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The configured endpoint is not a valid URL.
    #[error("invalid server endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The HTTP request itself failed (connection refused, timeout, ...).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status} for {operation}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The server's response body did not have the expected shape.
    #[error("malformed server response for {operation}: {reason}")]
    MalformedResponse {
        operation: &'static str,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Opens and closes remote automation sessions.
///
/// Implementations must be safe to share across execution contexts; the
/// session manager holds one transport behind an [`std::sync::Arc`] and calls
/// it concurrently from every context.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Open a session with the given capability set, returning its handle.
    async fn open(&self, capabilities: &CapabilitySet) -> Result<SessionHandle, TransportError>;

    /// Apply an implicit element-wait timeout to an open session.
    async fn set_implicit_wait(
        &self,
        handle: &SessionHandle,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Terminate a session at the server.
    async fn close(&self, handle: &SessionHandle) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// WebDriver implementation
// ---------------------------------------------------------------------------

/// W3C WebDriver HTTP transport for Appium-compatible servers.
///
/// Sessions are opened with `POST {base}/session` carrying the capability set
/// as `alwaysMatch`, and torn down with `DELETE {base}/session/{id}`. There is
/// no cancellation for an in-flight open beyond the HTTP client's own
/// connection handling.
#[derive(Debug, Clone)]
pub struct WebDriverTransport {
    http: reqwest::Client,
    base_url: String,
}

impl WebDriverTransport {
    /// Create a transport for the given server URL.
    ///
    /// Fails fast with [`TransportError::InvalidEndpoint`] if the URL does not
    /// parse, so a malformed endpoint is diagnosed before the first session
    /// request.
    pub fn new(server_url: impl Into<String>) -> Result<Self, TransportError> {
        let url = server_url.into();
        reqwest::Url::parse(&url).map_err(|e| TransportError::InvalidEndpoint {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    /// The server URL this transport targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the server's `GET /status` endpoint.
    pub async fn status(&self) -> Result<Value, TransportError> {
        let res = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        let res = check_status(res, "status").await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl SessionTransport for WebDriverTransport {
    async fn open(&self, capabilities: &CapabilitySet) -> Result<SessionHandle, TransportError> {
        debug!(endpoint = %self.base_url, "opening remote session");
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });
        let res = self
            .http
            .post(format!("{}/session", self.base_url))
            .json(&body)
            .send()
            .await?;
        let res = check_status(res, "session create").await?;

        let value: Value = res.json().await?;
        // W3C servers nest the id under "value"; older JSON Wire servers
        // report it at the top level.
        let session_id = value
            .pointer("/value/sessionId")
            .or_else(|| value.get("sessionId"))
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::MalformedResponse {
                operation: "session create",
                reason: "response carries no sessionId".to_string(),
            })?;

        debug!(session = session_id, "remote session opened");
        Ok(SessionHandle::new(session_id))
    }

    async fn set_implicit_wait(
        &self,
        handle: &SessionHandle,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let body = json!({ "implicit": timeout.as_millis() as u64 });
        let res = self
            .http
            .post(format!("{}/session/{}/timeouts", self.base_url, handle))
            .json(&body)
            .send()
            .await?;
        check_status(res, "set timeouts").await?;
        Ok(())
    }

    async fn close(&self, handle: &SessionHandle) -> Result<(), TransportError> {
        debug!(session = %handle, "closing remote session");
        let res = self
            .http
            .delete(format!("{}/session/{}", self.base_url, handle))
            .send()
            .await?;
        check_status(res, "session delete").await?;
        Ok(())
    }
}

/// Convert a non-success response into [`TransportError::UnexpectedStatus`],
/// capturing the body for diagnostics.
async fn check_status(
    res: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, TransportError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(TransportError::UnexpectedStatus {
        operation,
        status,
        body,
    })
}
