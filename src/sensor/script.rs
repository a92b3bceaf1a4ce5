//! Replay scripts for the simulated sensor.
//!
//! A script is a JSON document listing which gestures the device offers,
//! which listeners to register, and a sequence of frames. Each frame queues
//! its events and joint readings before the corresponding tick.

use crate::sensor::simulated::SimulatedSensor;
use crate::sensor::types::{JointKind, JointOrientation, JointTransform, Point3, SensorEvent, UserId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A recorded or hand-written sensor session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationScript {
    /// Gesture names the device reports as available
    #[serde(default)]
    pub available_gestures: Vec<String>,
    /// Pose users must hold for calibration (sensor default if absent)
    #[serde(default)]
    pub calibration_pose: Option<String>,
    /// Listeners to register before the first frame
    #[serde(default)]
    pub listeners: Vec<ScriptListener>,
    /// Frames in playback order
    #[serde(default)]
    pub frames: Vec<ScriptFrame>,
}

/// A (gesture, handler) pair registered before playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptListener {
    pub gesture: String,
    pub handler: String,
}

/// Everything the sensor reports during a single frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptFrame {
    #[serde(default)]
    pub events: Vec<SensorEvent>,
    #[serde(default)]
    pub joints: Vec<ScriptJoint>,
}

/// A joint reading for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptJoint {
    pub user: UserId,
    pub joint: JointKind,
    pub position: Point3,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    /// Orientation basis; identity when omitted
    #[serde(default)]
    pub orientation: Option<JointOrientation>,
}

fn full_confidence() -> f32 {
    1.0
}

impl SimulationScript {
    /// Load a script from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ScriptError::IoError(e.to_string()))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(json).map_err(|e| ScriptError::ParseError(e.to_string()))
    }

    /// Build a sensor configured with the script's gestures and pose.
    pub fn sensor(&self) -> SimulatedSensor {
        let sensor = SimulatedSensor::with_gestures(self.available_gestures.iter().cloned());
        if let Some(ref pose) = self.calibration_pose {
            sensor.set_calibration_pose(pose.clone());
        }
        sensor
    }
}

impl ScriptFrame {
    /// Queue this frame's events and readings on the sensor.
    pub fn apply(&self, sensor: &SimulatedSensor) {
        for joint in &self.joints {
            let orientation = joint.orientation.unwrap_or(JointOrientation {
                confidence: joint.confidence,
                ..JointOrientation::default()
            });
            sensor.set_joint(
                joint.user,
                joint.joint,
                JointTransform {
                    position: joint.position,
                    position_confidence: joint.confidence,
                    orientation,
                },
            );
        }
        sensor.push_events(self.events.iter().cloned());
    }
}

/// Script loading errors.
#[derive(Debug)]
pub enum ScriptError {
    IoError(String),
    ParseError(String),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::IoError(e) => write!(f, "IO error: {e}"),
            ScriptError::ParseError(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorBridge;

    const SCRIPT: &str = r#"{
        "available_gestures": ["Wave", "Click"],
        "calibration_pose": "Psi",
        "listeners": [{ "gesture": "Wave", "handler": "OnWave" }],
        "frames": [
            { "events": [{ "type": "new_user", "id": 1 }] },
            {
                "joints": [
                    { "user": 1, "joint": "Head", "position": [0.0, 400.0, 2000.0] }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_script_parsing() {
        let script = SimulationScript::from_json(SCRIPT).unwrap();
        assert_eq!(script.available_gestures.len(), 2);
        assert_eq!(script.listeners[0].handler, "OnWave");
        assert_eq!(script.frames.len(), 2);
        assert_eq!(script.frames[0].events, vec![SensorEvent::NewUser { id: 1 }]);
        assert_eq!(script.frames[1].joints[0].confidence, 1.0);
    }

    #[test]
    fn test_script_sensor_setup() {
        let script = SimulationScript::from_json(SCRIPT).unwrap();
        let sensor = script.sensor();
        assert!(sensor.is_gesture_available("Click"));
        assert!(!sensor.is_gesture_available("Swipe"));
        assert_eq!(sensor.calibration_pose(), "Psi");
    }

    #[test]
    fn test_bad_script() {
        assert!(matches!(
            SimulationScript::from_json("{ not json"),
            Err(ScriptError::ParseError(_))
        ));
    }
}
