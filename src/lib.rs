//! Depth User Tracker - user lifecycle and gesture dispatch for depth sensors.
//!
//! This library tracks the people a depth sensor detects. It walks each
//! person through calibration, keeps their skeleton joints current once
//! tracked, and routes recognized gestures to handlers supplied by the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TrackingSession                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   events    ┌─────────────┐                │
//! │  │   Sensor    │────────────▶│ UserTracker │──▶ Lifecycle    │
//! │  │   Bridge    │             │ (registry,  │    notifications│
//! │  └─────────────┘             │ calibration)│                │
//! │     │      │                 └─────────────┘                │
//! │     │      │ joints                 ▲                        │
//! │     │      └────────────────────────┘ per tick               │
//! │     │ gestures                                               │
//! │     ▼                                                        │
//! │  ┌─────────────┐   resolve   ┌─────────────┐                │
//! │  │  Gesture    │────────────▶│  Handler    │                │
//! │  │ Dispatcher  │             │  Resolver   │                │
//! │  └─────────────┘             └─────────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use depth_user_tracker::{
//!     activity, config::Config, gesture::HandlerTable, sensor::SimulatedSensor,
//!     TrackingSession,
//! };
//! use std::sync::Arc;
//!
//! let handlers = Arc::new(HandlerTable::new());
//! handlers.register("OnWave", |g: &depth_user_tracker::Gesture| {
//!     println!("{} at {:?}", g.name, g.end_position);
//! });
//!
//! let session = TrackingSession::new(
//!     Arc::new(SimulatedSensor::with_gestures(["Wave"])),
//!     &Config::default(),
//!     handlers,
//!     activity::create_shared_log(),
//! )
//! .expect("Failed to start session");
//!
//! session.add_listener("Wave", "OnWave").expect("Failed to add listener");
//! session.update().expect("Sensor poll failed");
//! ```

pub mod activity;
pub mod config;
pub mod gesture;
pub mod sensor;
pub mod session;
pub mod tracking;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use config::{Config, ConfigError, RetryPolicy};
pub use gesture::{
    Gesture, GestureDispatcher, GestureError, GestureHandler, HandlerResolver, HandlerTable,
};
pub use sensor::{JointKind, SensorBridge, SensorError, SensorEvent, SimulatedSensor, UserId};
pub use session::{connect_with_retry, TrackingSession};
pub use tracking::{
    CalibrationState, Joint, LifecycleEvent, TrackerConfig, TrackingError, User, UserHandler,
    UserHandlerResolver, UserHandlerTable, UserTracker,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
