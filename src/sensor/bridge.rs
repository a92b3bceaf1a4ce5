//! The sensor SDK seen as a black box.
//!
//! A [`SensorBridge`] exposes the context lifecycle, the per-frame poll and
//! the user/skeleton/pose/gesture capabilities. Events are delivered to
//! subscribed handlers synchronously from inside
//! [`SensorBridge::wait_and_update_all`]; handlers may call back into the
//! bridge, so implementations must not hold internal locks while invoking
//! them.

use crate::sensor::types::{
    JointKind, JointTransform, SensorError, SensorEvent, SensorEventKind, SkeletonProfile, UserId,
};
use std::path::Path;
use std::sync::{Arc, Weak};

/// Callback invoked for every event of the subscribed kind.
pub type EventHandler = Arc<dyn Fn(&SensorEvent) + Send + Sync>;

/// Identifier of a registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Depth sensor context with its user, skeleton, pose and gesture capabilities.
pub trait SensorBridge: Send + Sync {
    // Context lifecycle

    /// Block until the next frame is available and update every generator.
    ///
    /// Pending events are delivered to subscribers before this returns.
    fn wait_and_update_all(&self) -> Result<(), SensorError>;

    /// Release the context. Further polling fails with [`SensorError::Released`].
    fn shutdown(&self) -> Result<(), SensorError>;

    // Event subscription

    fn subscribe(&self, kind: SensorEventKind, handler: EventHandler) -> SubscriptionId;

    /// Remove a handler. Returns whether it was registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    // User generator

    fn start_user_generation(&self) -> Result<(), SensorError>;
    fn release_user_generator(&self) -> Result<(), SensorError>;

    // Skeleton capability

    /// Name of the pose users must hold to be calibrated.
    fn calibration_pose(&self) -> String;
    fn set_skeleton_profile(&self, profile: SkeletonProfile) -> Result<(), SensorError>;
    fn start_tracking(&self, id: UserId) -> Result<(), SensorError>;
    fn stop_tracking(&self, id: UserId) -> Result<(), SensorError>;
    fn is_tracking(&self, id: UserId) -> bool;
    fn is_joint_active(&self, joint: JointKind) -> bool;
    fn is_joint_available(&self, joint: JointKind) -> bool;
    fn skeleton_joint(&self, id: UserId, joint: JointKind) -> Result<JointTransform, SensorError>;
    fn save_calibration_data(&self, id: UserId, path: &Path) -> Result<(), SensorError>;

    /// Fails with [`SensorError::CalibrationData`] when the file is corrupt
    /// or was recorded by an incompatible device.
    fn load_calibration_data(&self, id: UserId, path: &Path) -> Result<(), SensorError>;

    // Pose detection capability

    fn start_pose_detection(&self, pose: &str, id: UserId) -> Result<(), SensorError>;
    fn stop_pose_detection(&self, id: UserId) -> Result<(), SensorError>;
    fn is_calibrating(&self, id: UserId) -> bool;
    fn request_calibration(&self, id: UserId, force_restart: bool) -> Result<(), SensorError>;

    // Gesture generator

    fn is_gesture_available(&self, gesture: &str) -> bool;
    fn add_gesture(&self, gesture: &str) -> Result<(), SensorError>;
    fn remove_gesture(&self, gesture: &str) -> Result<(), SensorError>;
    fn start_gesture_generation(&self) -> Result<(), SensorError>;
    fn stop_gesture_generation(&self) -> Result<(), SensorError>;
    fn release_gesture_generator(&self) -> Result<(), SensorError>;
}

/// Owned registration of an event handler.
///
/// The handler is removed from the sensor exactly once: either by
/// [`Subscription::release`] or when the handle is dropped.
pub struct Subscription {
    id: SubscriptionId,
    kind: SensorEventKind,
    sensor: Weak<dyn SensorBridge>,
    active: bool,
}

impl Subscription {
    /// Register `handler` for events of `kind`.
    pub fn register(
        sensor: &Arc<dyn SensorBridge>,
        kind: SensorEventKind,
        handler: EventHandler,
    ) -> Self {
        let id = sensor.subscribe(kind, handler);
        Self {
            id,
            kind,
            sensor: Arc::downgrade(sensor),
            active: true,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> SensorEventKind {
        self.kind
    }

    /// Unregister the handler.
    pub fn release(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(sensor) = self.sensor.upgrade() {
            if !sensor.unsubscribe(self.id) {
                tracing::debug!("Subscription {:?} ({:?}) was already gone", self.id, self.kind);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.active)
            .finish()
    }
}
