//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default match threshold.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.7;
/// Default enrollment window length.
pub const DEFAULT_ENROLLMENT_MS: u64 = 30_000;
/// Default interval between verification ticks.
pub const DEFAULT_VERIFICATION_PERIOD_MS: u64 = 5_000;
/// Default number of frames in one verification sample (about one second).
pub const DEFAULT_FRAMES_PER_SAMPLE: usize = 10;
/// Default capture frame size in samples.
pub const DEFAULT_FRAME_SIZE: usize = 4096;
/// Default interviewer panel size.
pub const DEFAULT_PANEL_SIZE: usize = 3;
/// Default delay between a question turn and the interviewer switch.
pub const DEFAULT_ROTATION_DELAY_MS: u64 = 2_000;

/// Settings consumed by [`CallSession`](crate::CallSession).
///
/// Every field has a default, so a partial YAML/JSON document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Access key for the biometric backend. Without one, speaker
    /// verification is disabled for the whole session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Optional backend model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// A tick matches when its best score is at least this value.
    pub match_threshold: f32,

    pub enrollment_ms: u64,
    pub verification_period_ms: u64,
    pub frames_per_sample: usize,
    pub frame_size: usize,
    pub panel_size: usize,
    pub rotation_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            model: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            enrollment_ms: DEFAULT_ENROLLMENT_MS,
            verification_period_ms: DEFAULT_VERIFICATION_PERIOD_MS,
            frames_per_sample: DEFAULT_FRAMES_PER_SAMPLE,
            frame_size: DEFAULT_FRAME_SIZE,
            panel_size: DEFAULT_PANEL_SIZE,
            rotation_delay_ms: DEFAULT_ROTATION_DELAY_MS,
        }
    }
}

impl EngineConfig {
    /// Sets the access key.
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    /// Returns the access key if one is configured and non-empty.
    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn enrollment_duration(&self) -> Duration {
        Duration::from_millis(self.enrollment_ms)
    }

    pub fn verification_period(&self) -> Duration {
        Duration::from_millis(self.verification_period_ms)
    }

    pub fn rotation_delay(&self) -> Duration {
        Duration::from_millis(self.rotation_delay_ms)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        if self.enrollment_ms == 0 {
            return Err(ConfigError::Zero("enrollment_ms"));
        }
        if self.verification_period_ms == 0 {
            return Err(ConfigError::Zero("verification_period_ms"));
        }
        if self.frames_per_sample == 0 {
            return Err(ConfigError::Zero("frames_per_sample"));
        }
        if self.frame_size == 0 {
            return Err(ConfigError::Zero("frame_size"));
        }
        if self.panel_size == 0 {
            return Err(ConfigError::Zero("panel_size"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.match_threshold, 0.7);
        assert_eq!(cfg.enrollment_duration(), Duration::from_secs(30));
        assert_eq!(cfg.verification_period(), Duration::from_secs(5));
        assert_eq!(cfg.rotation_delay(), Duration::from_secs(2));
        assert_eq!(cfg.frames_per_sample, 10);
        assert_eq!(cfg.frame_size, 4096);
        assert_eq!(cfg.panel_size, 3);
        assert!(cfg.access_key().is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn blank_access_key_counts_as_missing() {
        let cfg = EngineConfig::default().with_access_key("  ");
        assert!(cfg.access_key().is_none());
    }

    #[test]
    fn partial_document_uses_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"access_key":"k","match_threshold":0.8}"#).unwrap();
        assert_eq!(cfg.access_key(), Some("k"));
        assert_eq!(cfg.match_threshold, 0.8);
        assert_eq!(cfg.panel_size, 3);
        assert_eq!(cfg.enrollment_ms, 30_000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cfg = EngineConfig {
            match_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidThreshold(_))));

        let cfg = EngineConfig {
            panel_size: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("panel_size")));
    }
}
