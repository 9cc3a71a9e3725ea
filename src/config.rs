//! Driver configuration, loadable from TOML.
//!
//! ```toml
//! capture_timeout_ms = 500
//! settle_frames = 10
//! stream_buffers = 4
//! rig_order = ["17220375", "17220381"]
//! require_hardware_sync = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The TOML is malformed or has wrongly typed fields.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables of a [`GenericCameraDriver`](crate::GenericCameraDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// How long a capture waits for a frame, in milliseconds.
    pub capture_timeout_ms: u64,
    /// Frames discarded by `make_set_effective_default`.
    pub settle_frames: u32,
    /// Frame buffers each adapter queues during acquisition.
    pub stream_buffers: u32,
    /// Serial numbers fixing the array order to physical rig positions.
    pub rig_order: Vec<String>,
    /// Refuse to initialize unless every camera supports hardware triggering.
    pub require_hardware_sync: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: 1000,
            settle_frames: 10,
            stream_buffers: 4,
            rig_order: Vec::new(),
            require_hardware_sync: false,
        }
    }
}

impl DriverConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the capture timeout.
    #[must_use]
    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the default number of frames discarded after a settings change.
    #[must_use]
    pub const fn with_settle_frames(mut self, frames: u32) -> Self {
        self.settle_frames = frames;
        self
    }

    /// Pin array order to these serial numbers.
    #[must_use]
    pub fn with_rig_order<S: Into<String>, I: IntoIterator<Item = S>>(mut self, serials: I) -> Self {
        self.rig_order = serials.into_iter().map(Into::into).collect();
        self
    }

    /// Capture timeout as a duration.
    pub const fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Reject values the driver cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture_timeout_ms must be positive".to_owned(),
            ));
        }
        if self.stream_buffers == 0 {
            return Err(ConfigError::Invalid(
                "stream_buffers must be positive".to_owned(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = self.rig_order.iter().find(|serial| !seen.insert(*serial)) {
            return Err(ConfigError::Invalid(format!(
                "serial {duplicate} listed twice in rig_order"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.capture_timeout(), Duration::from_secs(1));
        assert_eq!(config.settle_frames, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DriverConfig::from_toml_str(
            r#"
            capture_timeout_ms = 250
            rig_order = ["A", "B"]
            "#,
        )
        .expect("valid config");

        assert_eq!(config.capture_timeout(), Duration::from_millis(250));
        assert_eq!(config.rig_order, ["A", "B"]);
        assert_eq!(config.stream_buffers, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            DriverConfig::from_toml_str("capture_timeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str(r#"rig_order = ["A", "A"]"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("settle_frames = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("unknown_key = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DriverConfig::load("/nonexistent/gencam.toml").expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
