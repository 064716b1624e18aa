//! Shared test helpers for gantry-core integration tests.
//!
//! Provides a recording mock [`SessionTransport`] for session-lifecycle tests
//! and a canned-response HTTP server for exercising the WebDriver transport
//! over a real socket.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use gantry_core::capabilities::CapabilitySet;
use gantry_core::session::SessionManager;
use gantry_core::store::CapabilityStore;
use gantry_core::transport::{SessionHandle, SessionTransport, TransportError};

// ---------------------------------------------------------------------------
// Mock transport
// ---------------------------------------------------------------------------

/// Records every transport call and can be flipped into failure modes.
#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicU64,
    pub opened: Mutex<Vec<(SessionHandle, CapabilitySet)>>,
    pub implicit_waits: Mutex<Vec<(SessionHandle, Duration)>>,
    pub closed: Mutex<Vec<SessionHandle>>,
    pub fail_open: AtomicBool,
    pub fail_implicit_wait: AtomicBool,
    pub fail_close: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn mock_error(reason: &str) -> TransportError {
        TransportError::MalformedResponse {
            operation: "mock",
            reason: reason.to_string(),
        }
    }

    /// Handles of every session closed so far.
    pub fn closed_handles(&self) -> Vec<SessionHandle> {
        self.closed.lock().unwrap().clone()
    }

    /// Capability sets of every session opened so far.
    pub fn opened_capabilities(&self) -> Vec<CapabilitySet> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(_, caps)| caps.clone())
            .collect()
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn open(&self, capabilities: &CapabilitySet) -> Result<SessionHandle, TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Self::mock_error("open refused"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = SessionHandle::new(format!("mock-session-{id}"));
        self.opened
            .lock()
            .unwrap()
            .push((handle.clone(), capabilities.clone()));
        Ok(handle)
    }

    async fn set_implicit_wait(
        &self,
        handle: &SessionHandle,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        if self.fail_implicit_wait.load(Ordering::SeqCst) {
            return Err(Self::mock_error("timeouts refused"));
        }
        self.implicit_waits
            .lock()
            .unwrap()
            .push((handle.clone(), timeout));
        Ok(())
    }

    async fn close(&self, handle: &SessionHandle) -> Result<(), TransportError> {
        self.closed.lock().unwrap().push(handle.clone());
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(Self::mock_error("close refused"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manager fixtures
// ---------------------------------------------------------------------------

/// Capability document used by the lifecycle tests.
pub const TEST_DOCUMENT: &str = r#"{
    "android": {
        "capabilities": { "automationName": "UiAutomator2", "noReset": false },
        "devices": [
            { "name": "Pixel_4", "platformVersion": "11" },
            { "name": "Galaxy_S21", "platformVersion": "12", "locale": "en_GB" }
        ]
    },
    "ios": {
        "capabilities": { "automationName": "XCUITest" },
        "devices": [ { "name": "iPhone 12", "platformVersion": "16.4" } ]
    }
}"#;

/// A session manager wired to a fresh mock transport and the test document.
pub fn mock_manager() -> (SessionManager, Arc<MockTransport>) {
    let store = Arc::new(CapabilityStore::from_json(TEST_DOCUMENT).unwrap());
    let transport = MockTransport::new();
    let manager = SessionManager::new(store, transport.clone());
    (manager, transport)
}

// ---------------------------------------------------------------------------
// Canned-response HTTP server
// ---------------------------------------------------------------------------

/// One request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Start a minimal HTTP server that answers each request with the next canned
/// `(status, body)` pair and records what it received. Each response carries
/// `Connection: close`, so the client opens a fresh connection per request.
pub async fn mock_webdriver_server(
    responses: Vec<(u16, String)>,
) -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let remaining = Arc::new(Mutex::new(VecDeque::from(responses)));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let Some((status, body)) = remaining.lock().unwrap().pop_front() else {
                break;
            };

            // Read the request head, then as many body bytes as declared.
            let mut buf = Vec::new();
            let header_end = loop {
                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break None;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    break Some(pos);
                }
            };
            let Some(header_end) = header_end else {
                continue;
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = parse_content_length(&head);
            let total = header_end + 4 + content_length;
            while buf.len() < total {
                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let mut request_line = head.lines().next().unwrap_or_default().split(' ');
            recorded.lock().unwrap().push(RecordedRequest {
                method: request_line.next().unwrap_or_default().to_string(),
                path: request_line.next().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&buf[header_end + 4..total.min(buf.len())])
                    .to_string(),
            });

            let response = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len(),
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
        }
    });

    (addr, requests)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0)
}
