//! # gantry-core
//!
//! Core library for mobile UI test-automation session management.
//!
//! This crate provides the two pieces a concurrent test harness needs to
//! drive Appium-compatible automation servers: per-platform capability
//! resolution from a shared JSON document, and per-execution-context
//! lifecycle management of remote sessions.
//!
//! ## Modules
//!
//! - [`capabilities`] - Capability document model, merging, and typed errors
//! - [`store`] - Process-wide, load-once capability store
//! - [`session`] - Session manager: one remote session per execution context
//! - [`transport`] - Session transport trait and the W3C WebDriver HTTP client
//! - [`settings`] - Persistent scalar settings (server URL, document path)
//!
//! ## Example
//!
//! ```no_run
//! use gantry_core::session::{ContextId, SessionManager};
//! use gantry_core::settings::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // One manager per process; one context per concurrent test.
//! let manager = SessionManager::from_settings(&Settings::load())?;
//! let ctx = ContextId::next();
//!
//! let session = manager.create_session(ctx, "android", "Pixel_4").await?;
//! assert!(manager.current_session(ctx).is_some());
//! println!("driving {}", session.device_name());
//!
//! manager.close_session(ctx).await;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;
