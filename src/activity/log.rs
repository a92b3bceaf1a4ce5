//! Activity counters for a tracking session.
//!
//! Records how many users came and went, how calibrations turned out and how
//! many gesture handlers ran. No joint data or positions are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lock-free session counters.
#[derive(Debug)]
pub struct ActivityLog {
    /// Number of ticks processed
    ticks: AtomicU64,
    /// Number of users discovered
    users_found: AtomicU64,
    /// Number of users lost
    users_lost: AtomicU64,
    /// Number of live calibrations requested
    calibrations_started: AtomicU64,
    /// Number of calibrations that reached tracking
    calibrations_succeeded: AtomicU64,
    /// Number of calibrations that went back to pose detection
    calibrations_failed: AtomicU64,
    /// Number of users calibrated from the saved file
    calibrations_reused: AtomicU64,
    /// Number of gesture handler invocations
    gestures_dispatched: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            users_found: AtomicU64::new(0),
            users_lost: AtomicU64::new(0),
            calibrations_started: AtomicU64::new(0),
            calibrations_succeeded: AtomicU64::new(0),
            calibrations_failed: AtomicU64::new(0),
            calibrations_reused: AtomicU64::new(0),
            gestures_dispatched: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that saves to, and resumes from, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous activity stats: {e}");
        }

        log
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_user_found(&self) {
        self.users_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_user_lost(&self) {
        self.users_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_calibration_started(&self) {
        self.calibrations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_calibration_succeeded(&self) {
        self.calibrations_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_calibration_failed(&self) {
        self.calibrations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_calibration_reused(&self) {
        self.calibrations_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gestures_dispatched(&self, count: u64) {
        self.gestures_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            users_found: self.users_found.load(Ordering::Relaxed),
            users_lost: self.users_lost.load(Ordering::Relaxed),
            calibrations_started: self.calibrations_started.load(Ordering::Relaxed),
            calibrations_succeeded: self.calibrations_succeeded.load(Ordering::Relaxed),
            calibrations_failed: self.calibrations_failed.load(Ordering::Relaxed),
            calibrations_reused: self.calibrations_reused.load(Ordering::Relaxed),
            gestures_dispatched: self.gestures_dispatched.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json =
                serde_json::to_string_pretty(&self.stats()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load counters saved by an earlier session.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: ActivityStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.ticks.store(persisted.ticks, Ordering::Relaxed);
                self.users_found
                    .store(persisted.users_found, Ordering::Relaxed);
                self.users_lost.store(persisted.users_lost, Ordering::Relaxed);
                self.calibrations_started
                    .store(persisted.calibrations_started, Ordering::Relaxed);
                self.calibrations_succeeded
                    .store(persisted.calibrations_succeeded, Ordering::Relaxed);
                self.calibrations_failed
                    .store(persisted.calibrations_failed, Ordering::Relaxed);
                self.calibrations_reused
                    .store(persisted.calibrations_reused, Ordering::Relaxed);
                self.gestures_dispatched
                    .store(persisted.gestures_dispatched, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.users_found,
            &self.users_lost,
            &self.calibrations_started,
            &self.calibrations_succeeded,
            &self.calibrations_failed,
            &self.calibrations_reused,
            &self.gestures_dispatched,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStats {
    pub ticks: u64,
    pub users_found: u64,
    pub users_lost: u64,
    pub calibrations_started: u64,
    pub calibrations_succeeded: u64,
    pub calibrations_failed: u64,
    pub calibrations_reused: u64,
    pub gestures_dispatched: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl ActivityStats {
    /// Read stats persisted by [`ActivityLog::save`].
    pub fn load(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    pub fn summary(&self) -> String {
        format!(
            "Session Statistics:\n\
             - Ticks processed: {}\n\
             - Users found: {}\n\
             - Users lost: {}\n\
             - Calibrations started: {}\n\
             - Calibrations succeeded: {}\n\
             - Calibrations failed: {}\n\
             - Calibrations reused from file: {}\n\
             - Gesture handlers run: {}\n\
             - Session duration: {} seconds",
            self.ticks,
            self.users_found,
            self.users_lost,
            self.calibrations_started,
            self.calibrations_succeeded,
            self.calibrations_failed,
            self.calibrations_reused,
            self.gestures_dispatched,
            self.session_duration_secs
        )
    }
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

/// Create a new shared activity log.
pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

/// Create a new shared activity log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}
