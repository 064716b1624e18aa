//! Capability document model and per-device capability resolution.
//!
//! A capability document is a JSON file describing, per platform, the common
//! capabilities shared by every device plus an ordered list of device records.
//! A separate `cloud` section holds per-provider capability blocks for remote
//! device farms.
//!
//! ```json
//! {
//!   "android": {
//!     "capabilities": { "automationName": "UiAutomator2" },
//!     "devices": [ { "name": "Pixel_4", "platformVersion": "11" } ]
//!   },
//!   "cloud": {
//!     "browserstack": { "project": "smoke", "realMobile": true }
//!   }
//! }
//! ```
//!
//! Resolution merges a platform's common capabilities with the fields of one
//! device record into a [`CapabilitySet`]; device-specific keys overwrite
//! common keys with the same name. Resolution is atomic: it either yields a
//! complete set or fails with a [`CapabilityError`] naming the missing piece.
//!
//! # Example
//!
//! ```no_run
//! use gantry_core::capabilities::CapabilityDocument;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let json = std::fs::read_to_string("config/capabilities.json")?;
//! let document = CapabilityDocument::parse(&json)?;
//!
//! let caps = document.resolve_capabilities("android", "Pixel_4")?;
//! assert_eq!(caps.get("deviceName").and_then(|v| v.as_str()), Some("Pixel_4"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Root key of the cloud-provider section.
const CLOUD_KEY: &str = "cloud";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or querying a capability document.
///
/// Load failures are fatal to any caller that depends on capabilities; the
/// unknown-name variants are user configuration mistakes and are surfaced
/// immediately rather than silently defaulted.
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// The document file could not be read.
    #[error("failed to read capability document at {path}: {source}")]
    Read {
        /// Path the loader attempted to read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed JSON or violates the schema.
    #[error("capability document is not well-formed: {reason}")]
    Malformed { reason: String },

    /// The named platform has no section in the document.
    #[error("platform {platform:?} is not present in the capability document")]
    UnknownPlatform { platform: String },

    /// The named device is not declared in the platform's device list.
    #[error("device {device:?} is not declared for platform {platform:?}")]
    UnknownDevice { platform: String, device: String },

    /// The named cloud provider has no section in the document.
    #[error("cloud provider {provider:?} is not present in the capability document")]
    UnknownProvider { provider: String },
}

// ---------------------------------------------------------------------------
// CapabilitySet
// ---------------------------------------------------------------------------

/// An ordered mapping of capability key to JSON value.
///
/// Keys are case-sensitive. Insertion order is preserved, so the common
/// capabilities of a platform appear in document order followed by the
/// device-derived keys. Serializes as a plain JSON object, which is the
/// shape the session transport sends on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(Map<String, Value>);

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a capability, returning the previous value if the key was present.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a capability by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if the set contains the exact key.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy every entry of a JSON object into the set, overwriting on collision.
    pub fn extend_from_object(&mut self, object: &Map<String, Value>) {
        for (key, value) in object {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Number of capabilities in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set holds no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying JSON object.
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for CapabilitySet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// One device entry in a platform's device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device name, unique within its platform. Matched case-sensitively.
    pub name: String,

    /// OS version string for the device.
    #[serde(rename = "platformVersion")]
    pub platform_version: String,

    /// Optional locale override for the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// A platform's section of the document: common capabilities plus devices.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformSection {
    /// Capabilities shared by every device on this platform.
    #[serde(default)]
    pub capabilities: Map<String, Value>,

    /// Device records, in document order.
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

/// The parsed, immutable capability document.
///
/// Root keys other than `cloud` are platform identifiers. The document is
/// validated on parse: the root and every section must be a JSON object,
/// and device names must be unique within their platform.
#[derive(Debug, Clone)]
pub struct CapabilityDocument {
    platforms: HashMap<String, PlatformSection>,
    cloud: Map<String, Value>,
}

impl CapabilityDocument {
    /// Parse a document from JSON text.
    pub fn parse(json: &str) -> Result<Self, CapabilityError> {
        let root: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| CapabilityError::Malformed { reason: e.to_string() })?;

        let mut platforms = HashMap::new();
        let mut cloud = Map::new();

        for (key, value) in root {
            if key == CLOUD_KEY {
                let Value::Object(providers) = value else {
                    return Err(CapabilityError::Malformed {
                        reason: "cloud section must be a JSON object".to_string(),
                    });
                };
                for (provider, block) in &providers {
                    if !block.is_object() {
                        return Err(CapabilityError::Malformed {
                            reason: format!(
                                "cloud provider {provider:?} must map to a JSON object"
                            ),
                        });
                    }
                }
                cloud = providers;
            } else {
                let section: PlatformSection =
                    serde_json::from_value(value).map_err(|e| CapabilityError::Malformed {
                        reason: format!("platform section {key:?}: {e}"),
                    })?;
                validate_unique_device_names(&key, &section)?;
                platforms.insert(key, section);
            }
        }

        Ok(Self { platforms, cloud })
    }

    /// Look up a platform section by exact identifier.
    pub fn platform(&self, platform: &str) -> Result<&PlatformSection, CapabilityError> {
        self.platforms
            .get(platform)
            .ok_or_else(|| CapabilityError::UnknownPlatform {
                platform: platform.to_string(),
            })
    }

    /// Platform identifiers present in the document.
    pub fn platform_names(&self) -> impl Iterator<Item = &str> {
        self.platforms.keys().map(String::as_str)
    }

    /// Resolve the full capability set for one device on one platform.
    ///
    /// The platform's common capabilities are copied first, then the device
    /// record's fields (`deviceName`, `platformName`, `platformVersion`, and
    /// `locale` when present) are overlaid, so device-specific values win over
    /// common ones with the same key.
    pub fn resolve_capabilities(
        &self,
        platform: &str,
        device_name: &str,
    ) -> Result<CapabilitySet, CapabilityError> {
        let section = self.platform(platform)?;
        let device = section
            .devices
            .iter()
            .find(|d| d.name == device_name)
            .ok_or_else(|| CapabilityError::UnknownDevice {
                platform: platform.to_string(),
                device: device_name.to_string(),
            })?;

        let mut caps = CapabilitySet::new();
        caps.extend_from_object(&section.capabilities);
        caps.set("deviceName", device.name.clone());
        caps.set("platformName", platform);
        caps.set("platformVersion", device.platform_version.clone());
        if let Some(locale) = &device.locale {
            caps.set("locale", locale.clone());
        }
        Ok(caps)
    }

    /// Device names for a platform, in document order.
    pub fn device_names(&self, platform: &str) -> Result<Vec<String>, CapabilityError> {
        let section = self.platform(platform)?;
        Ok(section.devices.iter().map(|d| d.name.clone()).collect())
    }

    /// Deep copy of a cloud provider's capability block.
    ///
    /// Nested objects and lists come back as plain [`serde_json`] values, so
    /// callers can traverse them without knowing the document's own types.
    pub fn cloud_capabilities(&self, provider: &str) -> Result<Map<String, Value>, CapabilityError> {
        match self.cloud.get(provider) {
            Some(Value::Object(block)) => Ok(block.clone()),
            _ => Err(CapabilityError::UnknownProvider {
                provider: provider.to_string(),
            }),
        }
    }
}

fn validate_unique_device_names(
    platform: &str,
    section: &PlatformSection,
) -> Result<(), CapabilityError> {
    let mut seen = std::collections::HashSet::new();
    for device in &section.devices {
        if !seen.insert(device.name.as_str()) {
            return Err(CapabilityError::Malformed {
                reason: format!(
                    "duplicate device name {:?} for platform {platform:?}",
                    device.name
                ),
            });
        }
    }
    Ok(())
}
