//! Classifier configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```rust
//! use flagged_errors::ClassifierConfig;
//!
//! let config = ClassifierConfig::from_json_str(r#"{
//!     "trace_mode": "caller",
//!     "mapping": { "4": 404, "64": 409 },
//!     "flag_names": { "128": "rate limited" }
//! }"#).unwrap();
//! assert_eq!(config.default_status, 500);
//! ```
//!
//! Mapping and name keys are raw flag bits in decimal. A mapping key may carry
//! several bits; it is split like any other [`crate::StatusMapper::set_mapping`]
//! entry.

use crate::flags::ErrFlag;
use crate::stack::{CaptureOptions, TraceMode, DEFAULT_MAX_FRAMES};
use crate::status::{MappingError, STATUS_RANGE, STATUS_UNHANDLED};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field}: status {status} is outside the 100-599 range")]
    InvalidStatus { field: &'static str, status: u16 },

    #[error("max_frames must be at least 1")]
    ZeroFrames,

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Settings for a [`crate::ClassificationRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// How much stack to record per construction site.
    pub trace_mode: TraceMode,
    /// Frames recorded per capture.
    pub max_frames: usize,
    /// Path prefixes stripped from recorded frames.
    pub strip_prefixes: Vec<String>,
    /// Status for errors nothing classifies.
    pub default_status: u16,
    /// Status when merging two different client errors.
    pub client_conflict_status: u16,
    /// Keep trace data in outgoing payloads.
    pub expose_trace: bool,
    /// Replacement flag to status table; `None` keeps the default one.
    pub mapping: Option<BTreeMap<u32, u16>>,
    /// Flag name overrides.
    pub flag_names: BTreeMap<u32, String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            trace_mode: TraceMode::Full,
            max_frames: DEFAULT_MAX_FRAMES,
            strip_prefixes: Vec::new(),
            default_status: STATUS_UNHANDLED,
            client_conflict_status: STATUS_UNHANDLED,
            expose_trace: false,
            mapping: None,
            flag_names: BTreeMap::new(),
        }
    }
}

impl ClassifierConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed documents or unknown fields, the
    /// other variants for values that fail [`ClassifierConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every status is a valid HTTP status and frames are capped sanely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_status("default_status", self.default_status)?;
        check_status("client_conflict_status", self.client_conflict_status)?;
        if self.max_frames == 0 {
            return Err(ConfigError::ZeroFrames);
        }
        if let Some(mapping) = &self.mapping {
            for &status in mapping.values() {
                check_status("mapping", status)?;
            }
        }
        Ok(())
    }

    /// Mapping entries as flags, if a replacement table is configured.
    pub fn mapping_entries(&self) -> Option<Vec<(ErrFlag, u16)>> {
        self.mapping.as_ref().map(|mapping| {
            mapping
                .iter()
                .map(|(&bits, &status)| (ErrFlag::from_bits(bits), status))
                .collect()
        })
    }

    /// Capture options derived from the trace settings.
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            mode: self.trace_mode,
            max_frames: self.max_frames,
            strip_prefixes: self.strip_prefixes.clone(),
        }
    }
}

fn check_status(field: &'static str, status: u16) -> Result<(), ConfigError> {
    if STATUS_RANGE.contains(&status) {
        Ok(())
    } else {
        Err(ConfigError::InvalidStatus { field, status })
    }
}
