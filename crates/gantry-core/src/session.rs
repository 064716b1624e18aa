//! Per-context session lifecycle management.
//!
//! [`SessionManager`] owns the table of live remote sessions, keyed by an
//! opaque [`ContextId`] (one per concurrently running test). Each context
//! holds at most one session at a time:
//!
//! - [`create_session`](SessionManager::create_session) resolves the device's
//!   capability set through the store, opens a remote session, applies the
//!   fixed 10-second implicit wait, and registers the handle under the
//!   calling context's key.
//! - [`current_session`](SessionManager::current_session) returns the
//!   context's registered session, or `None` — absence is an expected state,
//!   not an error.
//! - [`close_session`](SessionManager::close_session) terminates the remote
//!   session best-effort and always clears the registration, so a failed
//!   remote close can never leak a stale table entry.
//!
//! Contexts are independent: the table is a concurrent map, and no ordering
//! holds across contexts. Within one context, `create_session` strictly
//! precedes any lookup that observes it.
//!
//! # Example
//!
//! ```no_run
//! use gantry_core::session::{ContextId, SessionManager};
//! use gantry_core::settings::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = SessionManager::from_settings(&Settings::load())?;
//! let ctx = ContextId::next();
//!
//! let session = manager.create_session(ctx, "android", "Pixel_4").await?;
//! println!("session {} on {}", session.handle(), session.device_name());
//!
//! manager.close_session(ctx).await;
//! assert!(manager.current_session(ctx).is_none());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::capabilities::{CapabilityError, CapabilitySet};
use crate::settings::Settings;
use crate::store::{self, CapabilityStore};
use crate::transport::{SessionHandle, SessionTransport, TransportError, WebDriverTransport};

/// Implicit element-wait timeout applied to every newly created session.
pub const IMPLICIT_WAIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the session manager.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Capability resolution failed (unknown platform/device, load failure).
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The transport could not open the session. Not retried here; retries
    /// are the caller's responsibility.
    #[error("failed to create session for device {device_name:?}: {source}")]
    Creation {
        device_name: String,
        #[source]
        source: TransportError,
    },

    /// The transport could not be constructed (malformed endpoint).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Execution contexts
// ---------------------------------------------------------------------------

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier of one concurrent test execution.
///
/// Contexts are allocated explicitly rather than derived from thread
/// identity, so the same scheme works for thread- and task-parallel runners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh, process-unique context identifier.
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Platform and ad-hoc device specs
// ---------------------------------------------------------------------------

/// Mobile platform a session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Lowercase identifier, matching the capability document's root keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// Canonical `platformName` capability value.
    pub fn platform_name(&self) -> &'static str {
        match self {
            Platform::Android => "Android",
            Platform::Ios => "iOS",
        }
    }

    /// Default automation backend for the platform.
    pub fn automation_name(&self) -> &'static str {
        match self {
            Platform::Android => "UiAutomator2",
            Platform::Ios => "XCUITest",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar description of a device not present in the capability document.
///
/// Used by [`SessionManager::create_session_with`] to build a capability set
/// directly: `app_identifier` is the Android application package or the iOS
/// bundle id, and `launch_target` is the Android activity to launch (ignored
/// on iOS).
#[derive(Debug, Clone)]
pub struct AdHocDevice {
    pub platform: Platform,
    pub device_name: String,
    pub platform_version: String,
    pub app_identifier: String,
    pub launch_target: Option<String>,
}

impl AdHocDevice {
    fn capability_set(&self) -> CapabilitySet {
        let mut caps = CapabilitySet::new();
        caps.set("deviceName", self.device_name.clone());
        caps.set("platformName", self.platform.platform_name());
        caps.set("platformVersion", self.platform_version.clone());
        match self.platform {
            Platform::Android => {
                caps.set("appPackage", self.app_identifier.clone());
                if let Some(activity) = &self.launch_target {
                    caps.set("appActivity", activity.clone());
                }
            }
            Platform::Ios => {
                caps.set("bundleId", self.app_identifier.clone());
            }
        }
        caps.set("automationName", self.platform.automation_name());
        caps.set("noReset", false);
        caps
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A live remote session and the metadata it was created with.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    platform: String,
    device_name: String,
    capabilities: CapabilitySet,
    created_at: DateTime<Utc>,
}

impl Session {
    /// The transport-issued session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Platform identifier the session was created for.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Device name the session was created for.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The capability set the session was opened with.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// When the session was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Creates, tracks, and tears down one remote session per execution context.
pub struct SessionManager {
    store: Arc<CapabilityStore>,
    transport: Arc<dyn SessionTransport>,
    sessions: DashMap<ContextId, Arc<Session>>,
}

impl SessionManager {
    /// Build a manager from an explicit store and transport.
    pub fn new(store: Arc<CapabilityStore>, transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            store,
            transport,
            sessions: DashMap::new(),
        }
    }

    /// Build a manager from settings: the shared capability store and a
    /// [`WebDriverTransport`] against the configured server URL.
    ///
    /// Loading the store here means a broken capability document aborts
    /// startup instead of failing the first test that asks for a session.
    pub fn from_settings(settings: &Settings) -> Result<Self, SessionError> {
        let store = store::shared()?;
        let transport = WebDriverTransport::new(settings.server_url())?;
        Ok(Self::new(store, Arc::new(transport)))
    }

    /// Open a session for a device declared in the capability document and
    /// register it under `ctx`.
    ///
    /// If `ctx` already holds a session, the prior session is closed first
    /// (best-effort, with a warning) rather than silently leaked.
    pub async fn create_session(
        &self,
        ctx: ContextId,
        platform: &str,
        device_name: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let capabilities = self.store.resolve_capabilities(platform, device_name)?;
        info!(%ctx, platform, device = device_name, "creating session");
        self.open_and_register(ctx, platform.to_string(), device_name.to_string(), capabilities)
            .await
    }

    /// Open a session for a device described ad hoc, bypassing the capability
    /// document. Registration, implicit wait, and failure semantics match
    /// [`create_session`](Self::create_session).
    pub async fn create_session_with(
        &self,
        ctx: ContextId,
        device: &AdHocDevice,
    ) -> Result<Arc<Session>, SessionError> {
        let capabilities = device.capability_set();
        info!(%ctx, platform = %device.platform, device = %device.device_name,
            "creating session with ad-hoc capabilities");
        self.open_and_register(
            ctx,
            device.platform.as_str().to_string(),
            device.device_name.clone(),
            capabilities,
        )
        .await
    }

    /// The session registered for `ctx`, if any.
    pub fn current_session(&self, ctx: ContextId) -> Option<Arc<Session>> {
        self.sessions.get(&ctx).map(|entry| Arc::clone(entry.value()))
    }

    /// Terminate and deregister the session for `ctx`, if any.
    ///
    /// The registration is removed before the remote close is attempted, so
    /// the table cannot retain a stale entry even when the server fails to
    /// terminate the session cleanly. Remote-close failures are logged and
    /// swallowed.
    pub async fn close_session(&self, ctx: ContextId) {
        let Some((_, session)) = self.sessions.remove(&ctx) else {
            return;
        };
        info!(%ctx, session = %session.handle(), "closing session");
        self.close_remote(&session).await;
    }

    /// Number of currently registered sessions, across all contexts.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    async fn open_and_register(
        &self,
        ctx: ContextId,
        platform: String,
        device_name: String,
        capabilities: CapabilitySet,
    ) -> Result<Arc<Session>, SessionError> {
        if let Some((_, prior)) = self.sessions.remove(&ctx) {
            warn!(%ctx, session = %prior.handle(),
                "context already holds a session; closing it before creating a new one");
            self.close_remote(&prior).await;
        }

        let handle = self
            .transport
            .open(&capabilities)
            .await
            .map_err(|source| SessionError::Creation {
                device_name: device_name.clone(),
                source,
            })?;

        if let Err(source) = self.transport.set_implicit_wait(&handle, IMPLICIT_WAIT).await {
            // The session opened but could not be configured; tear it down
            // rather than hand out a half-initialized handle.
            if let Err(e) = self.transport.close(&handle).await {
                warn!(session = %handle, error = %e,
                    "failed to close session after timeout configuration error");
            }
            return Err(SessionError::Creation {
                device_name,
                source,
            });
        }

        let session = Arc::new(Session {
            handle,
            platform,
            device_name,
            capabilities,
            created_at: Utc::now(),
        });
        self.sessions.insert(ctx, Arc::clone(&session));
        info!(%ctx, session = %session.handle(), "session registered");
        Ok(session)
    }

    async fn close_remote(&self, session: &Session) {
        if let Err(e) = self.transport.close(session.handle()).await {
            warn!(session = %session.handle(), error = %e,
                "remote session close failed; registration cleared anyway");
        }
    }
}
