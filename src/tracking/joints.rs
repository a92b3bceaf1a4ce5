//! Per-tick joint synchronization.
//!
//! Readings are taken from the sensor without holding the registry lock, then
//! applied to every user that is still Tracking in one pass. Each tick
//! replaces the previous snapshot outright: there is no smoothing or
//! interpolation.

use crate::sensor::bridge::SensorBridge;
use crate::sensor::types::{JointKind, JointOrientation, JointTransform, UserId};
use crate::tracking::registry::UserRegistry;
use crate::tracking::types::Joint;
use nalgebra::Matrix3;
use std::collections::HashMap;

/// What the sensor reported for one joint during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointReading {
    pub kind: JointKind,
    pub is_active: bool,
    pub is_available: bool,
    /// Present only when the joint is available and the read succeeded
    pub transform: Option<JointTransform>,
}

/// Convert the sensor's orientation basis into the host's rotation matrix.
///
/// The rows are the sensor's X and Y axes followed by the negated Z axis:
/// the sensor reports a forward vector, the host stores a backward one.
pub fn rotation_from_orientation(orientation: &JointOrientation) -> Matrix3<f32> {
    let backward = -orientation.z_axis;
    Matrix3::new(
        orientation.x_axis.x,
        orientation.x_axis.y,
        orientation.x_axis.z,
        orientation.y_axis.x,
        orientation.y_axis.y,
        orientation.y_axis.z,
        backward.x,
        backward.y,
        backward.z,
    )
}

/// Read every joint of a tracked user.
pub fn read_skeleton(sensor: &dyn SensorBridge, id: UserId) -> Vec<JointReading> {
    JointKind::ALL
        .iter()
        .map(|&kind| {
            let is_active = sensor.is_joint_active(kind);
            let is_available = sensor.is_joint_available(kind);

            let transform = if is_available {
                match sensor.skeleton_joint(id, kind) {
                    Ok(transform) => Some(transform),
                    Err(e) => {
                        tracing::debug!("Skipping {kind} for user {id}: {e}");
                        None
                    }
                }
            } else {
                None
            };

            JointReading {
                kind,
                is_active,
                is_available,
                transform,
            }
        })
        .collect()
}

/// Overwrite a joint with a reading.
pub fn apply_reading(joint: &mut Joint, reading: &JointReading) {
    joint.is_active = reading.is_active;
    joint.is_available = reading.is_available;

    if let Some(transform) = reading.transform {
        joint.position = transform.position;
        joint.position_confidence = transform.position_confidence;
        joint.rotation = rotation_from_orientation(&transform.orientation);
        joint.rotation_confidence = transform.orientation.confidence;
    }
}

/// Pull joint data for every Tracking user. Returns how many users were
/// updated.
///
/// Users that are not Tracking, or that the sensor has stopped tracking, are
/// left as they were.
pub fn sync_tracked_users(sensor: &dyn SensorBridge, registry: &UserRegistry) -> usize {
    let frames: HashMap<UserId, Vec<JointReading>> = registry
        .tracked_ids()
        .into_iter()
        .filter(|&id| sensor.is_tracking(id))
        .map(|id| (id, read_skeleton(sensor, id)))
        .collect();

    if frames.is_empty() {
        return 0;
    }

    let mut updated = 0;
    registry.for_each_tracked_user(|user| {
        let Some(readings) = frames.get(&user.id()) else {
            return;
        };
        for reading in readings {
            if let Some(joint) = user.joint_mut(reading.kind) {
                apply_reading(joint, reading);
            }
        }
        updated += 1;
    });
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::types::Point3;

    #[test]
    fn test_rotation_negates_forward_axis() {
        let orientation = JointOrientation {
            x_axis: Point3::new(1.0, 0.0, 0.0),
            y_axis: Point3::new(0.0, 1.0, 0.0),
            z_axis: Point3::new(0.0, 0.0, 1.0),
            confidence: 1.0,
        };
        let rotation = rotation_from_orientation(&orientation);

        assert_eq!(rotation.row(0).transpose(), Point3::new(1.0, 0.0, 0.0));
        assert_eq!(rotation.row(1).transpose(), Point3::new(0.0, 1.0, 0.0));
        assert_eq!(rotation.row(2).transpose(), Point3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_apply_unavailable_reading_keeps_position() {
        let mut joint = Joint::new(JointKind::LeftHand);
        joint.position = Point3::new(1.0, 2.0, 3.0);

        apply_reading(
            &mut joint,
            &JointReading {
                kind: JointKind::LeftHand,
                is_active: true,
                is_available: false,
                transform: None,
            },
        );

        assert!(joint.is_active);
        assert!(!joint.is_available);
        assert_eq!(joint.position, Point3::new(1.0, 2.0, 3.0));
    }
}
