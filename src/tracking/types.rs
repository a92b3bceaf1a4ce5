//! Users, joints and lifecycle notifications.

use crate::sensor::types::{JointKind, Point3, UserId};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a user is in the calibration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    /// Just reported by the sensor
    Discovered,
    /// Waiting for the user to hold the calibration pose
    PoseDetecting,
    /// Pose confirmed, sensor is calibrating
    Calibrating,
    /// Calibrated; joint data is live
    Tracking,
    /// The sensor lost the user
    Lost,
}

impl std::fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CalibrationState::Discovered => "discovered",
            CalibrationState::PoseDetecting => "pose detecting",
            CalibrationState::Calibrating => "calibrating",
            CalibrationState::Tracking => "tracking",
            CalibrationState::Lost => "lost",
        };
        f.write_str(name)
    }
}

/// Last known state of one skeletal joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    kind: JointKind,
    /// Whether the sensor supports this joint in the current session
    pub is_available: bool,
    /// Whether the sensor's skeleton profile includes this joint
    pub is_active: bool,
    /// Position in sensor real-world coordinates
    pub position: Point3,
    /// Confidence in the position (0-1)
    pub position_confidence: f32,
    /// Orientation, rows are right, up and backward
    pub rotation: Matrix3<f32>,
    /// Confidence in the orientation (0-1)
    pub rotation_confidence: f32,
}

impl Joint {
    pub fn new(kind: JointKind) -> Self {
        Self {
            kind,
            is_available: false,
            is_active: false,
            position: Point3::zeros(),
            position_confidence: 0.0,
            rotation: Matrix3::identity(),
            rotation_confidence: 0.0,
        }
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    /// Whether the rotation is trustworthy enough to drive a bone.
    pub fn has_authoritative_rotation(&self) -> bool {
        self.rotation_confidence >= 1.0
    }
}

/// A person detected by the sensor.
///
/// Values handed out by the tracker are snapshots; the live copy is owned by
/// the registry and only changes on lifecycle events and joint sync.
/// Deserialized users get a default joint for every kind the input omits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserRecord")]
pub struct User {
    id: UserId,
    is_calibrated: bool,
    state: CalibrationState,
    joints: BTreeMap<JointKind, Joint>,
}

impl User {
    /// Create a freshly discovered user with every joint populated.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            is_calibrated: false,
            state: CalibrationState::Discovered,
            joints: JointKind::ALL
                .iter()
                .map(|&kind| (kind, Joint::new(kind)))
                .collect(),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn is_calibrated(&self) -> bool {
        self.is_calibrated
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == CalibrationState::Tracking
    }

    pub fn joints(&self) -> &BTreeMap<JointKind, Joint> {
        &self.joints
    }

    pub fn joint(&self, kind: JointKind) -> &Joint {
        // Every kind is inserted in `new` and never removed.
        &self.joints[&kind]
    }

    pub(crate) fn joint_mut(&mut self, kind: JointKind) -> Option<&mut Joint> {
        self.joints.get_mut(&kind)
    }

    /// Move to `state`. Reaching Tracking marks the user calibrated; losing
    /// the user clears it.
    pub(crate) fn set_state(&mut self, state: CalibrationState) {
        self.state = state;
        match state {
            CalibrationState::Tracking => self.is_calibrated = true,
            CalibrationState::Lost => self.is_calibrated = false,
            _ => {}
        }
    }
}

/// Serialized form of [`User`]; the joint map may be partial.
#[derive(Deserialize)]
struct UserRecord {
    id: UserId,
    is_calibrated: bool,
    state: CalibrationState,
    #[serde(default)]
    joints: BTreeMap<JointKind, Joint>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        let mut user = User::new(record.id);
        user.is_calibrated = record.is_calibrated;
        user.state = record.state;
        for (kind, joint) in record.joints {
            if joint.kind == kind {
                user.joints.insert(kind, joint);
            }
        }
        user
    }
}

/// Notifications about user lifecycle and calibration progress.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    UserFound(User),
    UserLost(User),
    CalibrationStarted(User),
    CalibrationEnded { user: User, failed: bool },
    SkeletonReady(User),
    PoseDetected { user: User, pose: String },
}

impl LifecycleEvent {
    /// The user this notification is about.
    pub fn user(&self) -> &User {
        match self {
            LifecycleEvent::UserFound(user)
            | LifecycleEvent::UserLost(user)
            | LifecycleEvent::CalibrationStarted(user)
            | LifecycleEvent::SkeletonReady(user) => user,
            LifecycleEvent::CalibrationEnded { user, .. }
            | LifecycleEvent::PoseDetected { user, .. } => user,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::UserFound(_) => "user_found",
            LifecycleEvent::UserLost(_) => "user_lost",
            LifecycleEvent::CalibrationStarted(_) => "calibration_started",
            LifecycleEvent::CalibrationEnded { .. } => "calibration_ended",
            LifecycleEvent::SkeletonReady(_) => "skeleton_ready",
            LifecycleEvent::PoseDetected { .. } => "pose_detected",
        }
    }
}

/// Errors from the user registry.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingError {
    DuplicateUser(UserId),
}

impl std::fmt::Display for TrackingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingError::DuplicateUser(id) => write!(f, "User {id} is already registered"),
        }
    }
}

impl std::error::Error for TrackingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_has_every_joint() {
        let user = User::new(7);
        assert_eq!(user.id(), 7);
        assert_eq!(user.state(), CalibrationState::Discovered);
        assert!(!user.is_calibrated());
        assert_eq!(user.joints().len(), JointKind::ALL.len());

        let head = user.joint(JointKind::Head);
        assert_eq!(head.kind(), JointKind::Head);
        assert_eq!(head.position, Point3::zeros());
        assert_eq!(head.rotation, Matrix3::identity());
    }

    #[test]
    fn test_calibrated_flag_follows_state() {
        let mut user = User::new(1);
        user.set_state(CalibrationState::PoseDetecting);
        user.set_state(CalibrationState::Calibrating);
        assert!(!user.is_calibrated());

        user.set_state(CalibrationState::Tracking);
        assert!(user.is_calibrated());

        // A recalibration keeps the earlier result
        user.set_state(CalibrationState::Calibrating);
        assert!(user.is_calibrated());

        user.set_state(CalibrationState::Lost);
        assert!(!user.is_calibrated());
    }

    #[test]
    fn test_deserialized_user_has_every_joint() {
        let mut user = User::new(3);
        user.set_state(CalibrationState::Tracking);
        user.joint_mut(JointKind::Head).unwrap().position = Point3::new(1.0, 2.0, 3.0);

        let mut json = serde_json::to_value(&user).unwrap();
        let joints = json["joints"].as_object_mut().unwrap();
        joints.retain(|kind, _| kind == "Head");
        joints.insert("Neck".into(), serde_json::to_value(Joint::new(JointKind::Torso)).unwrap());

        let restored: User = serde_json::from_value(json).unwrap();
        assert_eq!(restored.joints().len(), JointKind::ALL.len());
        assert_eq!(restored.state(), CalibrationState::Tracking);
        assert!(restored.is_calibrated());
        assert_eq!(
            restored.joint(JointKind::Head).position,
            Point3::new(1.0, 2.0, 3.0)
        );
        assert_eq!(restored.joint(JointKind::Neck).kind(), JointKind::Neck);
        assert_eq!(restored.joint(JointKind::LeftFoot), &Joint::new(JointKind::LeftFoot));
    }

    #[test]
    fn test_authoritative_rotation_gate() {
        let mut joint = Joint::new(JointKind::Neck);
        joint.rotation_confidence = 0.5;
        assert!(!joint.has_authoritative_rotation());
        joint.rotation_confidence = 1.0;
        assert!(joint.has_authoritative_rotation());
    }
}
