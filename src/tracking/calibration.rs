//! Shared calibration file.
//!
//! The first user to calibrate successfully has their calibration written to
//! a single file. Every user discovered afterwards is offered that file
//! before falling back to live pose detection. The contents are opaque to
//! this crate; only the sensor reads and writes them.

use crate::sensor::bridge::SensorBridge;
use crate::sensor::types::{SensorError, UserId};
use std::path::{Path, PathBuf};

/// Location and write-once policy of the shared calibration file.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a calibration has been saved.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the saved calibration into the sensor for `id`.
    pub fn restore(&self, sensor: &dyn SensorBridge, id: UserId) -> Result<(), SensorError> {
        sensor.load_calibration_data(id, &self.path)
    }

    /// Save `id`'s calibration unless a file already exists.
    ///
    /// Returns whether the file was written.
    pub fn persist_first(&self, sensor: &dyn SensorBridge, id: UserId) -> Result<bool, SensorError> {
        if self.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SensorError::Status(format!("{}: {e}", parent.display())))?;
            }
        }

        sensor.save_calibration_data(id, &self.path)?;
        Ok(true)
    }

    /// Delete the saved calibration. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, std::io::Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
