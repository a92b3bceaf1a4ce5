//! Sensor-level types shared between the bridge and the tracking core.
//!
//! These mirror what a depth sensor SDK reports: user ids, joint kinds, joint
//! transforms, calibration statuses and the discrete events it raises while
//! polling for frames.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the sensor to a detected user.
///
/// Unique among currently tracked users; the sensor may hand the same id to
/// a different person after the original one is lost.
pub type UserId = u32;

/// A point or direction in sensor real-world coordinates (millimetres).
pub type Point3 = Vector3<f32>;

/// Skeletal joint locations reported by the sensor.
///
/// The SDK numbers joints from 1; raw id 0 is its "invalid" sentinel and has
/// no variant here (see [`JointKind::from_raw`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointKind {
    Head,
    Neck,
    Torso,
    Waist,
    LeftCollar,
    LeftShoulder,
    LeftElbow,
    LeftWrist,
    LeftHand,
    LeftFingertip,
    RightCollar,
    RightShoulder,
    RightElbow,
    RightWrist,
    RightHand,
    RightFingertip,
    LeftHip,
    LeftKnee,
    LeftAnkle,
    LeftFoot,
    RightHip,
    RightKnee,
    RightAnkle,
    RightFoot,
}

impl JointKind {
    /// Every joint kind, in SDK order.
    pub const ALL: [JointKind; 24] = [
        JointKind::Head,
        JointKind::Neck,
        JointKind::Torso,
        JointKind::Waist,
        JointKind::LeftCollar,
        JointKind::LeftShoulder,
        JointKind::LeftElbow,
        JointKind::LeftWrist,
        JointKind::LeftHand,
        JointKind::LeftFingertip,
        JointKind::RightCollar,
        JointKind::RightShoulder,
        JointKind::RightElbow,
        JointKind::RightWrist,
        JointKind::RightHand,
        JointKind::RightFingertip,
        JointKind::LeftHip,
        JointKind::LeftKnee,
        JointKind::LeftAnkle,
        JointKind::LeftFoot,
        JointKind::RightHip,
        JointKind::RightKnee,
        JointKind::RightAnkle,
        JointKind::RightFoot,
    ];

    /// The SDK's numeric id for this joint (1-based).
    pub fn raw(self) -> u8 {
        self as u8 + 1
    }

    /// Map an SDK joint id to a kind. The invalid sentinel (0) and
    /// out-of-range ids yield `None`.
    pub fn from_raw(raw: u8) -> Option<JointKind> {
        match raw {
            0 => None,
            n => Self::ALL.get(usize::from(n) - 1).copied(),
        }
    }

    /// Human-readable name, as the SDK spells it.
    pub fn name(self) -> &'static str {
        match self {
            JointKind::Head => "Head",
            JointKind::Neck => "Neck",
            JointKind::Torso => "Torso",
            JointKind::Waist => "Waist",
            JointKind::LeftCollar => "LeftCollar",
            JointKind::LeftShoulder => "LeftShoulder",
            JointKind::LeftElbow => "LeftElbow",
            JointKind::LeftWrist => "LeftWrist",
            JointKind::LeftHand => "LeftHand",
            JointKind::LeftFingertip => "LeftFingertip",
            JointKind::RightCollar => "RightCollar",
            JointKind::RightShoulder => "RightShoulder",
            JointKind::RightElbow => "RightElbow",
            JointKind::RightWrist => "RightWrist",
            JointKind::RightHand => "RightHand",
            JointKind::RightFingertip => "RightFingertip",
            JointKind::LeftHip => "LeftHip",
            JointKind::LeftKnee => "LeftKnee",
            JointKind::LeftAnkle => "LeftAnkle",
            JointKind::LeftFoot => "LeftFoot",
            JointKind::RightHip => "RightHip",
            JointKind::RightKnee => "RightKnee",
            JointKind::RightAnkle => "RightAnkle",
            JointKind::RightFoot => "RightFoot",
        }
    }
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Orientation of a joint as three basis vectors in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointOrientation {
    /// X basis (X1, X2, X3)
    pub x_axis: Point3,
    /// Y basis (Y1, Y2, Y3)
    pub y_axis: Point3,
    /// Z basis (Z1, Z2, Z3), pointing forward out of the sensor's view
    pub z_axis: Point3,
    /// Confidence in the orientation (0-1)
    pub confidence: f32,
}

impl Default for JointOrientation {
    fn default() -> Self {
        Self {
            x_axis: Point3::x(),
            y_axis: Point3::y(),
            z_axis: Point3::z(),
            confidence: 0.0,
        }
    }
}

/// A single joint reading as returned by the skeleton capability.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTransform {
    /// Position in real-world coordinates
    pub position: Point3,
    /// Confidence in the position (0-1)
    pub position_confidence: f32,
    /// Joint orientation
    pub orientation: JointOrientation,
}

/// Which parts of the body the skeleton capability should track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonProfile {
    None,
    #[default]
    All,
    Upper,
    Lower,
    HeadHands,
}

/// Outcome reported by the sensor when a calibration attempt finishes.
///
/// Only [`CalibrationStatus::PoseConfirmed`] counts as success; every other
/// status sends the user back to pose detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    PoseConfirmed,
    NoUser,
    Arm,
    Leg,
    Head,
    Torso,
    TopFov,
    Side,
    ManualAbort,
    ManualReset,
    Timeout,
}

impl CalibrationStatus {
    pub fn is_success(self) -> bool {
        matches!(self, CalibrationStatus::PoseConfirmed)
    }
}

/// Discrete events raised by the sensor while polling for frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    NewUser {
        id: UserId,
    },
    LostUser {
        id: UserId,
    },
    PoseDetected {
        id: UserId,
        pose: String,
    },
    CalibrationComplete {
        id: UserId,
        status: CalibrationStatus,
    },
    GestureRecognized {
        gesture: String,
        identified_position: Point3,
        end_position: Point3,
    },
    GestureProgress {
        gesture: String,
        position: Point3,
        progress: f32,
    },
}

impl SensorEvent {
    /// The subscription channel this event is delivered on.
    pub fn kind(&self) -> SensorEventKind {
        match self {
            SensorEvent::NewUser { .. } => SensorEventKind::NewUser,
            SensorEvent::LostUser { .. } => SensorEventKind::LostUser,
            SensorEvent::PoseDetected { .. } => SensorEventKind::PoseDetected,
            SensorEvent::CalibrationComplete { .. } => SensorEventKind::CalibrationComplete,
            SensorEvent::GestureRecognized { .. } => SensorEventKind::GestureRecognized,
            SensorEvent::GestureProgress { .. } => SensorEventKind::GestureProgress,
        }
    }
}

/// Event channels a component can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorEventKind {
    NewUser,
    LostUser,
    PoseDetected,
    CalibrationComplete,
    GestureRecognized,
    GestureProgress,
}

/// Errors reported by the sensor SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// The device is not ready yet; bootstrap may retry.
    Unavailable(String),
    /// A permanent failure; bootstrap must give up.
    Fatal(String),
    /// A generic status failure from a capability call.
    Status(String),
    /// Stored calibration data is corrupt or incompatible with this device.
    CalibrationData(String),
    /// The context or generator has already been released.
    Released,
}

impl SensorError {
    /// Whether bootstrap should try connecting again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SensorError::Unavailable(_))
    }
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::Unavailable(e) => write!(f, "Sensor unavailable: {e}"),
            SensorError::Fatal(e) => write!(f, "Sensor failure: {e}"),
            SensorError::Status(e) => write!(f, "Sensor status error: {e}"),
            SensorError::CalibrationData(e) => write!(f, "Invalid calibration data: {e}"),
            SensorError::Released => write!(f, "Sensor context has been released"),
        }
    }
}

impl std::error::Error for SensorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_kind_raw_ids() {
        assert_eq!(JointKind::Head.raw(), 1);
        assert_eq!(JointKind::RightFoot.raw(), 24);
        assert_eq!(JointKind::from_raw(0), None);
        assert_eq!(JointKind::from_raw(25), None);

        for kind in JointKind::ALL {
            assert_eq!(JointKind::from_raw(kind.raw()), Some(kind));
        }
    }

    #[test]
    fn test_only_pose_status_is_success() {
        assert!(CalibrationStatus::PoseConfirmed.is_success());
        assert!(!CalibrationStatus::Timeout.is_success());
        assert!(!CalibrationStatus::ManualAbort.is_success());
    }

    #[test]
    fn test_event_kind() {
        let event = SensorEvent::PoseDetected {
            id: 3,
            pose: "Psi".to_string(),
        };
        assert_eq!(event.kind(), SensorEventKind::PoseDetected);
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"type":"calibration_complete","id":2,"status":"pose_confirmed"}"#;
        let event: SensorEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            SensorEvent::CalibrationComplete {
                id: 2,
                status: CalibrationStatus::PoseConfirmed
            }
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SensorError::Unavailable("no device".into()).is_retryable());
        assert!(!SensorError::Fatal("driver".into()).is_retryable());
    }
}
