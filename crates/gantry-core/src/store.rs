//! Process-wide capability store.
//!
//! [`CapabilityStore`] wraps a parsed [`CapabilityDocument`] and serves all
//! capability lookups. The document is loaded at most once per process:
//! [`shared`] lazily reads the configured document path on first use behind a
//! [`once_cell::sync::OnceCell`], so concurrent first callers race on one
//! initialization and every reader observes the same immutable snapshot.
//!
//! A load failure is fatal to the caller that triggered it (and to every
//! later caller, which will retry the load); there is no silent fallback to
//! an empty document.
//!
//! # Example
//!
//! ```no_run
//! use gantry_core::store;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = store::shared()?;
//! for name in store.device_names("android")? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use tracing::info;

use crate::capabilities::{CapabilityDocument, CapabilityError, CapabilitySet};
use crate::settings::Settings;

static SHARED: OnceCell<Arc<CapabilityStore>> = OnceCell::new();

/// Serves capability lookups from one immutable document snapshot.
#[derive(Debug, Clone)]
pub struct CapabilityStore {
    document: CapabilityDocument,
}

impl CapabilityStore {
    /// Load a store from a capability document file.
    pub fn from_path(path: &Path) -> Result<Self, CapabilityError> {
        let json = std::fs::read_to_string(path).map_err(|source| CapabilityError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json(&json)?;
        info!(path = %path.display(), "loaded capability document");
        Ok(store)
    }

    /// Parse a store from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CapabilityError> {
        Ok(Self {
            document: CapabilityDocument::parse(json)?,
        })
    }

    /// The underlying document.
    pub fn document(&self) -> &CapabilityDocument {
        &self.document
    }

    /// See [`CapabilityDocument::resolve_capabilities`].
    pub fn resolve_capabilities(
        &self,
        platform: &str,
        device_name: &str,
    ) -> Result<CapabilitySet, CapabilityError> {
        self.document.resolve_capabilities(platform, device_name)
    }

    /// See [`CapabilityDocument::device_names`].
    pub fn device_names(&self, platform: &str) -> Result<Vec<String>, CapabilityError> {
        self.document.device_names(platform)
    }

    /// See [`CapabilityDocument::cloud_capabilities`].
    pub fn cloud_capabilities(
        &self,
        provider: &str,
    ) -> Result<Map<String, Value>, CapabilityError> {
        self.document.cloud_capabilities(provider)
    }
}

/// The process-wide store, loading the configured document on first use.
///
/// The document path comes from [`Settings::capabilities_path`]. Initialization
/// is exactly-once under concurrent callers; all successful callers share one
/// snapshot.
pub fn shared() -> Result<Arc<CapabilityStore>, CapabilityError> {
    SHARED
        .get_or_try_init(|| {
            let path = Settings::load().capabilities_path();
            CapabilityStore::from_path(&path).map(Arc::new)
        })
        .map(Arc::clone)
}
