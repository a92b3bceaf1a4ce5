//! User tracking for the depth user tracker.
//!
//! This module contains:
//! - The user registry shared by sensor callbacks and the per-tick sync
//! - The calibration state machine and the shared calibration file
//! - Per-tick joint synchronization

pub mod calibration;
pub mod hooks;
pub mod joints;
pub mod registry;
pub mod tracker;
pub mod types;

// Re-export commonly used types
pub use calibration::CalibrationStore;
pub use hooks::{LifecycleObserver, UserHandler, UserHandlerResolver, UserHandlerTable};
pub use joints::{rotation_from_orientation, sync_tracked_users, JointReading};
pub use registry::UserRegistry;
pub use tracker::{TrackerConfig, UserTracker};
pub use types::{CalibrationState, Joint, LifecycleEvent, TrackingError, User};
