//! Sensor access for the depth user tracker.
//!
//! The tracking core only talks to the device through the [`SensorBridge`]
//! trait. [`SimulatedSensor`] is an in-memory implementation used by tests
//! and by the replay command.

pub mod bridge;
pub mod script;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use bridge::{EventHandler, SensorBridge, Subscription, SubscriptionId};
pub use script::{ScriptError, ScriptFrame, SimulationScript};
pub use simulated::{FlakyConnector, SensorCall, SimulatedSensor, DEFAULT_CALIBRATION_POSE};
pub use types::{
    CalibrationStatus, JointKind, JointOrientation, JointTransform, Point3, SensorError,
    SensorEvent, SensorEventKind, SkeletonProfile, UserId,
};
