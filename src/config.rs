//! Engine configuration
//!
//! [`SnapshotConfig`] controls how snapshots are taken and how restores are
//! checked. It is plain serde data, stored by the CLI as `config.json` next
//! to the store state.
//!
//! ## Example
//!
//! ```rust
//! use treesnap::config::SnapshotConfigBuilder;
//! use treesnap::types::BumpPolicy;
//!
//! let config = SnapshotConfigBuilder::new()
//!     .bump_policy(BumpPolicy::Major)
//!     .checkin_comment("nightly")
//!     .max_depth(64)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_depth, 64);
//! ```

use crate::error::{Result, SnapshotError};
use crate::types::BumpPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default maximum tree depth walked by the builder and restore engine
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Settings shared by snapshot creation and restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Bump applied when the caller does not choose one
    pub default_bump_policy: BumpPolicy,
    /// Comment attached to every checkin the builder performs
    pub checkin_comment: Option<String>,
    /// Deeper trees are rejected with an invariant violation
    pub max_depth: usize,
    /// Compare live and snapshot content hashes after every restore
    pub verify_after_restore: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_bump_policy: BumpPolicy::Minor,
            checkin_comment: None,
            max_depth: DEFAULT_MAX_DEPTH,
            verify_after_restore: false,
        }
    }
}

impl SnapshotConfig {
    /// Check the settings are usable
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::InvalidConfiguration`] if `max_depth` is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(SnapshotError::InvalidConfiguration(
                "max_depth must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let config: SnapshotConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Fluent builder for [`SnapshotConfig`]
#[derive(Debug, Clone, Default)]
pub struct SnapshotConfigBuilder {
    config: SnapshotConfig,
}

impl SnapshotConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default bump policy
    pub fn bump_policy(mut self, policy: BumpPolicy) -> Self {
        self.config.default_bump_policy = policy;
        self
    }

    /// Attach a comment to every checkin
    pub fn checkin_comment(mut self, comment: impl Into<String>) -> Self {
        self.config.checkin_comment = Some(comment.into());
        self
    }

    /// Set the maximum tree depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Enable or disable the post-restore hash check
    pub fn verify_after_restore(mut self, enabled: bool) -> Self {
        self.config.verify_after_restore = enabled;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<SnapshotConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
