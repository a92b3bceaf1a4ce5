//! Configuration for the depth user tracker.

use crate::sensor::types::SkeletonProfile;
use crate::tracking::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "depth-user-tracker";

/// Main configuration for the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared calibration file, written by the first successful calibration
    pub calibration_path: PathBuf,

    /// Path for storing the activity log
    pub data_path: PathBuf,

    /// Whether gesture dispatch starts enabled
    pub detect_gestures: bool,

    /// Skeleton profile requested from the sensor
    pub skeleton_profile: SkeletonProfile,

    /// Time between ticks (serialized in milliseconds)
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// How to retry connecting to the sensor
    pub bootstrap: RetryPolicy,

    /// Capacity of the lifecycle notification channel
    pub notification_capacity: usize,

    /// Named user handler to run when a user is found
    pub user_found_handler: Option<String>,

    /// Named user handler to run when a user is lost
    pub user_lost_handler: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            calibration_path: data_dir.join("calibration.dat"),
            data_path: data_dir,
            detect_gestures: true,
            skeleton_profile: SkeletonProfile::All,
            tick_interval: Duration::from_millis(16), // ~60 Hz
            bootstrap: RetryPolicy::default(),
            notification_capacity: 1024,
            user_found_handler: None,
            user_lost_handler: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Path of the persisted activity log.
    pub fn activity_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.calibration_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Settings for the user tracker.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            calibration_path: self.calibration_path.clone(),
            skeleton_profile: self.skeleton_profile,
            notification_capacity: self.notification_capacity,
            user_found_handler: self.user_found_handler.clone(),
            user_lost_handler: self.user_lost_handler.clone(),
        }
    }
}

/// Backoff for connecting to the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failure
    #[serde(with = "duration_serde")]
    pub initial_delay: Duration,

    /// Upper bound on the delay between attempts
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,

    /// Give up after this many attempts (`None` retries forever)
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the `failures`-th consecutive failure
    /// (1-based). Doubles each time, capped at `max_delay`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` attempts.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tick_interval, Duration::from_millis(16));
        assert!(config.detect_gestures);
        assert_eq!(config.skeleton_profile, SkeletonProfile::All);
        assert_eq!(config.notification_capacity, 1024);
        assert!(config.calibration_path.ends_with("calibration.dat"));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["tick_interval"], 16);
        assert_eq!(json["bootstrap"]["initial_delay"], 1000);
        assert_eq!(json["bootstrap"]["max_attempts"], serde_json::Value::Null);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "detect_gestures": false, "tick_interval": 33 }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.detect_gestures);
        assert_eq!(config.tick_interval, Duration::from_millis(33));
        assert_eq!(config.bootstrap, RetryPolicy::default());
    }

    #[test]
    fn test_user_handler_names_reach_tracker_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "user_found_handler": "Greet" }"#).unwrap();

        let tracker = Config::load_from(&path).unwrap().tracker_config();
        assert_eq!(tracker.user_found_handler.as_deref(), Some("Greet"));
        assert_eq!(tracker.user_lost_handler, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.skeleton_profile = SkeletonProfile::Upper;
        config.bootstrap.max_attempts = Some(3);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.skeleton_profile, SkeletonProfile::Upper);
        assert_eq!(loaded.bootstrap.max_attempts, Some(3));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(config.detect_gestures);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_retry_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert!(policy.allows(1_000));

        let limited = RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        };
        assert!(limited.allows(1));
        assert!(!limited.allows(2));
    }
}
