//! Configuration loading
//!
//! Shared settings for both sides of the system. Resolution follows the
//! usual priority order: explicit path argument, then environment
//! variable, then compiled defaults. Timer intervals are configuration
//! rather than constants so tests and constrained devices can tighten
//! or relax them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-user slot ownership policy.
///
/// Both behaviors exist on purpose; the choice is an explicit flag, not
/// an implicit code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Recording a contribution supersedes the user's prior entries:
    /// one active slot per email
    #[default]
    SingleSlot,
    /// Prior entries are kept; a user may hold several slots
    Permissive,
}

/// System-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    /// Ownership policy applied when recording contributions
    pub slot_policy: SlotPolicy,

    /// Periodic persisted-state reconciliation read interval
    pub reconcile_interval_ms: u64,

    /// Drift-correction tick interval
    pub drift_tick_ms: u64,

    /// Follower offset beyond which playback snaps to the reference
    pub drift_tolerance_s: f64,

    /// Active-take advance interval
    pub take_cycle_ms: u64,

    /// Bounded wait for full readiness before the fallback start
    pub ready_timeout_ms: u64,

    /// Final clips at or above this size are sent link-only
    pub attachment_ceiling_bytes: u64,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            slot_policy: SlotPolicy::SingleSlot,
            reconcile_interval_ms: 3_000,
            drift_tick_ms: 500,
            drift_tolerance_s: 0.25,
            take_cycle_ms: 4_000,
            ready_timeout_ms: 2_000,
            attachment_ceiling_bytes: 20 * 1024 * 1024,
        }
    }
}

impl MosaicConfig {
    /// Load configuration, trying in order:
    /// 1. Explicit path argument
    /// 2. Path named by the environment variable
    /// 3. Compiled defaults
    pub fn resolve(path_arg: Option<&Path>, env_var_name: &str) -> Result<Self> {
        if let Some(path) = path_arg {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(env_var_name) {
            return Self::from_file(Path::new(&path));
        }
        Ok(Self::default())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MosaicConfig::default();
        assert_eq!(config.slot_policy, SlotPolicy::SingleSlot);
        assert_eq!(config.reconcile_interval_ms, 3_000);
        assert_eq!(config.drift_tick_ms, 500);
        assert_eq!(config.drift_tolerance_s, 0.25);
        assert_eq!(config.take_cycle_ms, 4_000);
        assert_eq!(config.ready_timeout_ms, 2_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "slot_policy = \"permissive\"\ntake_cycle_ms = 6000").unwrap();

        let config = MosaicConfig::from_file(file.path()).unwrap();
        assert_eq!(config.slot_policy, SlotPolicy::Permissive);
        assert_eq!(config.take_cycle_ms, 6_000);
        // Unspecified keys keep their defaults
        assert_eq!(config.drift_tick_ms, 500);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = MosaicConfig::from_file(Path::new("/nonexistent/mosaic.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
