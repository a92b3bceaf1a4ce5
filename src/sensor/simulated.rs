//! In-memory sensor implementation.
//!
//! This exists so the crate (tests and the replay command) can run without a
//! physical device or vendor SDK. Events are queued with
//! [`SimulatedSensor::push_event`] and delivered on the next
//! [`SensorBridge::wait_and_update_all`], the same way a real context
//! delivers callbacks from inside its poll.

use crate::sensor::bridge::{EventHandler, SensorBridge, SubscriptionId};
use crate::sensor::types::{
    JointKind, JointTransform, SensorError, SensorEvent, SensorEventKind, SkeletonProfile, UserId,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pose the simulated skeleton capability asks users to hold.
pub const DEFAULT_CALIBRATION_POSE: &str = "Psi";

/// Header written at the start of every simulated calibration file.
const CALIBRATION_MAGIC: &[u8] = b"SIMCAL1\n";

/// A capability call made against the simulated sensor, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorCall {
    SetSkeletonProfile(SkeletonProfile),
    StartUserGeneration,
    ReleaseUserGenerator,
    StartTracking(UserId),
    StopTracking(UserId),
    SaveCalibration(UserId),
    LoadCalibration(UserId),
    StartPoseDetection { id: UserId, pose: String },
    StopPoseDetection(UserId),
    RequestCalibration { id: UserId, force_restart: bool },
    AddGesture(String),
    RemoveGesture(String),
    StartGestureGeneration,
    StopGestureGeneration,
    ReleaseGestureGenerator,
    Shutdown,
}

#[derive(Debug)]
struct SimState {
    pending: VecDeque<SensorEvent>,
    calibration_pose: String,
    profile: SkeletonProfile,
    available_gestures: BTreeSet<String>,
    active_gestures: BTreeSet<String>,
    tracking: HashSet<UserId>,
    pose_detecting: HashMap<UserId, String>,
    calibrating: HashSet<UserId>,
    joints: HashMap<(UserId, JointKind), JointTransform>,
    unavailable_joints: HashSet<JointKind>,
    inactive_joints: HashSet<JointKind>,
    refuse_tracking: HashSet<UserId>,
    generating_users: bool,
    generating_gestures: bool,
    shut_down: bool,
    frames: u64,
    calls: Vec<SensorCall>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            calibration_pose: DEFAULT_CALIBRATION_POSE.to_string(),
            profile: SkeletonProfile::None,
            available_gestures: BTreeSet::new(),
            active_gestures: BTreeSet::new(),
            tracking: HashSet::new(),
            pose_detecting: HashMap::new(),
            calibrating: HashSet::new(),
            joints: HashMap::new(),
            unavailable_joints: HashSet::new(),
            inactive_joints: HashSet::new(),
            refuse_tracking: HashSet::new(),
            generating_users: false,
            generating_gestures: false,
            shut_down: false,
            frames: 0,
            calls: Vec::new(),
        }
    }
}

impl SimState {
    fn ensure_open(&self) -> Result<(), SensorError> {
        if self.shut_down {
            Err(SensorError::Released)
        } else {
            Ok(())
        }
    }

    /// Apply the sensor-side effects of an event and decide whether it is
    /// raised at all. Events from generators that are not running are
    /// swallowed, as are gestures nobody activated.
    fn admit(&mut self, event: &SensorEvent) -> bool {
        match event {
            SensorEvent::NewUser { .. } => self.generating_users,
            SensorEvent::LostUser { id } => {
                self.calibrating.remove(id);
                self.generating_users
            }
            SensorEvent::PoseDetected { .. } => self.generating_users,
            SensorEvent::CalibrationComplete { id, .. } => {
                self.calibrating.remove(id);
                self.generating_users
            }
            SensorEvent::GestureRecognized { gesture, .. }
            | SensorEvent::GestureProgress { gesture, .. } => {
                self.generating_gestures && self.active_gestures.contains(gesture)
            }
        }
    }
}

/// A scriptable sensor that keeps everything in memory.
pub struct SimulatedSensor {
    state: Mutex<SimState>,
    handlers: Mutex<Vec<(SubscriptionId, SensorEventKind, EventHandler)>>,
    next_subscription: AtomicU64,
}

impl SimulatedSensor {
    /// Create a sensor with no available gestures.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            handlers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Create a sensor that recognizes the given gesture names.
    pub fn with_gestures<I, S>(gestures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sensor = Self::new();
        {
            let mut state = sensor.state.lock();
            state.available_gestures = gestures.into_iter().map(Into::into).collect();
        }
        sensor
    }

    /// Queue an event for delivery on the next poll.
    pub fn push_event(&self, event: SensorEvent) {
        self.state.lock().pending.push_back(event);
    }

    /// Queue several events, delivered in order on the next poll.
    pub fn push_events<I: IntoIterator<Item = SensorEvent>>(&self, events: I) {
        self.state.lock().pending.extend(events);
    }

    /// Set the reading returned for a user's joint.
    pub fn set_joint(&self, id: UserId, joint: JointKind, transform: JointTransform) {
        self.state.lock().joints.insert((id, joint), transform);
    }

    pub fn set_joint_available(&self, joint: JointKind, available: bool) {
        let mut state = self.state.lock();
        if available {
            state.unavailable_joints.remove(&joint);
        } else {
            state.unavailable_joints.insert(joint);
        }
    }

    pub fn set_joint_active(&self, joint: JointKind, active: bool) {
        let mut state = self.state.lock();
        if active {
            state.inactive_joints.remove(&joint);
        } else {
            state.inactive_joints.insert(joint);
        }
    }

    pub fn set_calibration_pose(&self, pose: impl Into<String>) {
        self.state.lock().calibration_pose = pose.into();
    }

    /// Add or withdraw a gesture from the available set.
    pub fn set_gesture_available(&self, gesture: &str, available: bool) {
        let mut state = self.state.lock();
        if available {
            state.available_gestures.insert(gesture.to_string());
        } else {
            state.available_gestures.remove(gesture);
        }
    }

    /// Make `start_tracking` fail for a user.
    pub fn refuse_tracking(&self, id: UserId) {
        self.state.lock().refuse_tracking.insert(id);
    }

    /// Every capability call made so far.
    pub fn calls(&self) -> Vec<SensorCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Gestures currently activated for recognition.
    pub fn active_gestures(&self) -> Vec<String> {
        self.state.lock().active_gestures.iter().cloned().collect()
    }

    pub fn is_gesture_active(&self, gesture: &str) -> bool {
        self.state.lock().active_gestures.contains(gesture)
    }

    /// The pose a user is being watched for, if any.
    pub fn pose_detection_for(&self, id: UserId) -> Option<String> {
        self.state.lock().pose_detecting.get(&id).cloned()
    }

    pub fn skeleton_profile(&self) -> SkeletonProfile {
        self.state.lock().profile
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn frame_count(&self) -> u64 {
        self.state.lock().frames
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    fn record(&self, call: SensorCall) -> Result<(), SensorError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.push(call);
        Ok(())
    }

    fn handlers_for(&self, kind: SensorEventKind) -> Vec<EventHandler> {
        self.handlers
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, handler)| handler.clone())
            .collect()
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBridge for SimulatedSensor {
    fn wait_and_update_all(&self) -> Result<(), SensorError> {
        let events: Vec<SensorEvent> = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            state.frames += 1;
            let pending: Vec<SensorEvent> = state.pending.drain(..).collect();
            pending.into_iter().filter(|e| state.admit(e)).collect()
        };

        // No lock is held here: handlers call straight back into the sensor.
        for event in &events {
            for handler in self.handlers_for(event.kind()) {
                handler(event);
            }
        }

        Ok(())
    }

    fn shutdown(&self) -> Result<(), SensorError> {
        self.record(SensorCall::Shutdown)?;
        let mut state = self.state.lock();
        state.shut_down = true;
        state.pending.clear();
        Ok(())
    }

    fn subscribe(&self, kind: SensorEventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.handlers.lock().push((id, kind, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(sub, _, _)| *sub != id);
        handlers.len() != before
    }

    fn start_user_generation(&self) -> Result<(), SensorError> {
        self.record(SensorCall::StartUserGeneration)?;
        self.state.lock().generating_users = true;
        Ok(())
    }

    fn release_user_generator(&self) -> Result<(), SensorError> {
        self.record(SensorCall::ReleaseUserGenerator)?;
        let mut state = self.state.lock();
        state.generating_users = false;
        state.pose_detecting.clear();
        state.calibrating.clear();
        Ok(())
    }

    fn calibration_pose(&self) -> String {
        self.state.lock().calibration_pose.clone()
    }

    fn set_skeleton_profile(&self, profile: SkeletonProfile) -> Result<(), SensorError> {
        self.record(SensorCall::SetSkeletonProfile(profile))?;
        self.state.lock().profile = profile;
        Ok(())
    }

    fn start_tracking(&self, id: UserId) -> Result<(), SensorError> {
        self.record(SensorCall::StartTracking(id))?;
        let mut state = self.state.lock();
        if state.refuse_tracking.contains(&id) {
            return Err(SensorError::Status(format!("cannot track user {id}")));
        }
        state.tracking.insert(id);
        Ok(())
    }

    fn stop_tracking(&self, id: UserId) -> Result<(), SensorError> {
        self.record(SensorCall::StopTracking(id))?;
        self.state.lock().tracking.remove(&id);
        Ok(())
    }

    fn is_tracking(&self, id: UserId) -> bool {
        self.state.lock().tracking.contains(&id)
    }

    fn is_joint_active(&self, joint: JointKind) -> bool {
        !self.state.lock().inactive_joints.contains(&joint)
    }

    fn is_joint_available(&self, joint: JointKind) -> bool {
        !self.state.lock().unavailable_joints.contains(&joint)
    }

    fn skeleton_joint(&self, id: UserId, joint: JointKind) -> Result<JointTransform, SensorError> {
        let state = self.state.lock();
        state.ensure_open()?;
        if !state.tracking.contains(&id) {
            return Err(SensorError::Status(format!("user {id} is not tracked")));
        }
        Ok(state.joints.get(&(id, joint)).copied().unwrap_or_default())
    }

    fn save_calibration_data(&self, id: UserId, path: &Path) -> Result<(), SensorError> {
        self.record(SensorCall::SaveCalibration(id))?;
        let profile = self.state.lock().profile;

        let mut blob = CALIBRATION_MAGIC.to_vec();
        blob.extend_from_slice(format!("user={id} profile={profile:?}\n").as_bytes());

        std::fs::write(path, blob).map_err(|e| SensorError::Status(e.to_string()))
    }

    fn load_calibration_data(&self, id: UserId, path: &Path) -> Result<(), SensorError> {
        self.record(SensorCall::LoadCalibration(id))?;

        let blob = std::fs::read(path).map_err(|e| SensorError::Status(e.to_string()))?;
        if !blob.starts_with(CALIBRATION_MAGIC) {
            return Err(SensorError::CalibrationData(format!(
                "{} is not a calibration file for this device",
                path.display()
            )));
        }
        Ok(())
    }

    fn start_pose_detection(&self, pose: &str, id: UserId) -> Result<(), SensorError> {
        self.record(SensorCall::StartPoseDetection {
            id,
            pose: pose.to_string(),
        })?;
        self.state.lock().pose_detecting.insert(id, pose.to_string());
        Ok(())
    }

    fn stop_pose_detection(&self, id: UserId) -> Result<(), SensorError> {
        self.record(SensorCall::StopPoseDetection(id))?;
        self.state.lock().pose_detecting.remove(&id);
        Ok(())
    }

    fn is_calibrating(&self, id: UserId) -> bool {
        self.state.lock().calibrating.contains(&id)
    }

    fn request_calibration(&self, id: UserId, force_restart: bool) -> Result<(), SensorError> {
        self.record(SensorCall::RequestCalibration { id, force_restart })?;
        self.state.lock().calibrating.insert(id);
        Ok(())
    }

    fn is_gesture_available(&self, gesture: &str) -> bool {
        self.state.lock().available_gestures.contains(gesture)
    }

    fn add_gesture(&self, gesture: &str) -> Result<(), SensorError> {
        self.record(SensorCall::AddGesture(gesture.to_string()))?;
        let mut state = self.state.lock();
        if !state.available_gestures.contains(gesture) {
            return Err(SensorError::Status(format!("unknown gesture '{gesture}'")));
        }
        state.active_gestures.insert(gesture.to_string());
        Ok(())
    }

    fn remove_gesture(&self, gesture: &str) -> Result<(), SensorError> {
        self.record(SensorCall::RemoveGesture(gesture.to_string()))?;
        self.state.lock().active_gestures.remove(gesture);
        Ok(())
    }

    fn start_gesture_generation(&self) -> Result<(), SensorError> {
        self.record(SensorCall::StartGestureGeneration)?;
        self.state.lock().generating_gestures = true;
        Ok(())
    }

    fn stop_gesture_generation(&self) -> Result<(), SensorError> {
        self.record(SensorCall::StopGestureGeneration)?;
        self.state.lock().generating_gestures = false;
        Ok(())
    }

    fn release_gesture_generator(&self) -> Result<(), SensorError> {
        self.record(SensorCall::ReleaseGestureGenerator)?;
        let mut state = self.state.lock();
        state.generating_gestures = false;
        state.active_gestures.clear();
        Ok(())
    }
}

/// Connection factory that fails a scripted number of times before
/// handing out a sensor. Used to exercise bootstrap retry handling.
pub struct FlakyConnector {
    failures: VecDeque<SensorError>,
    attempts: usize,
}

impl FlakyConnector {
    pub fn new<I: IntoIterator<Item = SensorError>>(failures: I) -> Self {
        Self {
            failures: failures.into_iter().collect(),
            attempts: 0,
        }
    }

    /// Try to open the sensor.
    pub fn connect(&mut self) -> Result<SimulatedSensor, SensorError> {
        self.attempts += 1;
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(SimulatedSensor::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_events_are_delivered_on_poll() {
        let sensor = SimulatedSensor::new();
        sensor.start_user_generation().unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        sensor.subscribe(
            SensorEventKind::NewUser,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sensor.push_event(SensorEvent::NewUser { id: 1 });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        sensor.wait_and_update_all().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(sensor.frame_count(), 1);
    }

    #[test]
    fn test_user_events_need_generation() {
        let sensor = SimulatedSensor::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        sensor.subscribe(
            SensorEventKind::NewUser,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sensor.push_event(SensorEvent::NewUser { id: 1 });
        sensor.wait_and_update_all().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handlers_can_reenter() {
        let sensor = Arc::new(SimulatedSensor::new());
        sensor.start_user_generation().unwrap();

        let inner = Arc::downgrade(&sensor);
        sensor.subscribe(
            SensorEventKind::NewUser,
            Arc::new(move |event| {
                if let (Some(sensor), SensorEvent::NewUser { id }) = (inner.upgrade(), event) {
                    sensor.start_pose_detection("Psi", *id).unwrap();
                }
            }),
        );

        sensor.push_event(SensorEvent::NewUser { id: 4 });
        sensor.wait_and_update_all().unwrap();
        assert_eq!(sensor.pose_detection_for(4), Some("Psi".to_string()));
    }

    #[test]
    fn test_unsubscribe() {
        let sensor = SimulatedSensor::new();
        let id = sensor.subscribe(SensorEventKind::LostUser, Arc::new(|_| {}));
        assert_eq!(sensor.subscriber_count(), 1);
        assert!(sensor.unsubscribe(id));
        assert!(!sensor.unsubscribe(id));
        assert_eq!(sensor.subscriber_count(), 0);
    }

    #[test]
    fn test_calibration_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.dat");
        let sensor = SimulatedSensor::new();

        assert!(matches!(
            sensor.load_calibration_data(1, &path),
            Err(SensorError::Status(_))
        ));

        sensor.save_calibration_data(1, &path).unwrap();
        sensor.load_calibration_data(2, &path).unwrap();

        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            sensor.load_calibration_data(2, &path),
            Err(SensorError::CalibrationData(_))
        ));
    }

    #[test]
    fn test_shutdown_rejects_polling() {
        let sensor = SimulatedSensor::new();
        sensor.shutdown().unwrap();
        assert_eq!(sensor.wait_and_update_all(), Err(SensorError::Released));
        assert!(sensor.is_shut_down());
    }

    #[test]
    fn test_flaky_connector() {
        let mut connector = FlakyConnector::new([SensorError::Unavailable("busy".into())]);
        assert!(connector.connect().is_err());
        assert!(connector.connect().is_ok());
        assert_eq!(connector.attempts(), 2);
    }
}
