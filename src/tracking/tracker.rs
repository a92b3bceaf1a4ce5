//! User lifecycle and calibration state machine.
//!
//! [`UserTracker`] subscribes to the sensor's user, pose and calibration
//! events and walks each user through
//!
//! ```text
//! Discovered ──▶ PoseDetecting ──▶ Calibrating ──▶ Tracking
//!      │              ▲                 │
//!      │              └─── failure ─────┘
//!      └──── saved calibration ────────────────────▶ Tracking
//!
//! any state ── user lost ──▶ Lost (removed)
//! ```
//!
//! Sensor failures for one user are logged and recovered by going back to
//! pose detection; they never stop processing for other users.

use crate::activity::SharedActivityLog;
use crate::sensor::bridge::{EventHandler, SensorBridge, Subscription};
use crate::sensor::types::{
    CalibrationStatus, SensorError, SensorEvent, SensorEventKind, SkeletonProfile, UserId,
};
use crate::tracking::calibration::CalibrationStore;
use crate::tracking::hooks::{LifecycleObserver, UserHandlerResolver};
use crate::tracking::joints;
use crate::tracking::registry::UserRegistry;
use crate::tracking::types::{CalibrationState, LifecycleEvent, User};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings for a [`UserTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Shared calibration file
    pub calibration_path: PathBuf,
    /// Skeleton profile requested from the sensor
    pub skeleton_profile: SkeletonProfile,
    /// Capacity of the notification channel
    pub notification_capacity: usize,
    /// User handler to run when a user is found
    pub user_found_handler: Option<String>,
    /// User handler to run when a user is lost
    pub user_lost_handler: Option<String>,
}

impl TrackerConfig {
    pub fn new(calibration_path: impl Into<PathBuf>) -> Self {
        Self {
            calibration_path: calibration_path.into(),
            skeleton_profile: SkeletonProfile::All,
            notification_capacity: 1024,
            user_found_handler: None,
            user_lost_handler: None,
        }
    }
}

/// State shared between the tracker and its sensor callbacks.
struct TrackerCore {
    sensor: Arc<dyn SensorBridge>,
    registry: UserRegistry,
    calibration: CalibrationStore,
    calibration_pose: String,
    enabled: AtomicBool,
    notifications: Sender<LifecycleEvent>,
    observers: RwLock<Vec<LifecycleObserver>>,
    user_handlers: RwLock<Option<Arc<dyn UserHandlerResolver>>>,
    user_found_handler: Option<String>,
    user_lost_handler: Option<String>,
    activity: SharedActivityLog,
}

impl TrackerCore {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Deliver `event` to observers and named user handlers, then queue it on
    /// the notification channel. Called with no registry lock held.
    fn notify(&self, event: LifecycleEvent) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer(&event);
        }

        self.run_user_handler(&event);

        // Don't block the sensor poll if nobody is draining notifications
        if let Err(TrySendError::Full(event)) = self.notifications.try_send(event) {
            debug!(
                "Notification channel full, dropping {} for user {}",
                event.name(),
                event.user().id()
            );
        }
    }

    fn run_user_handler(&self, event: &LifecycleEvent) {
        let (name, user) = match event {
            LifecycleEvent::UserFound(user) => (self.user_found_handler.as_deref(), user),
            LifecycleEvent::UserLost(user) => (self.user_lost_handler.as_deref(), user),
            _ => return,
        };
        let Some(name) = name else {
            return;
        };

        let resolver = self.user_handlers.read().clone();
        match resolver.and_then(|r| r.resolve(name)) {
            Some(handler) => handler.execute(user),
            None => debug!("No user handler named '{name}' for user {}", user.id()),
        }
    }

    fn on_new_user(&self, id: UserId) {
        if !self.is_enabled() || self.registry.contains(id) {
            return;
        }

        let user = match self.registry.add_user(id) {
            Ok(user) => user,
            Err(e) => {
                debug!("Ignoring new user event: {e}");
                return;
            }
        };

        info!("Found user: {id}");
        self.activity.record_user_found();
        self.notify(LifecycleEvent::UserFound(user));

        // The first saved calibration is reused for everyone
        if self.calibration.exists() {
            match self.reuse_calibration(id) {
                Ok(()) => {
                    self.activity.record_calibration_reused();
                    if let Some(user) = self.registry.set_state(id, CalibrationState::Tracking) {
                        info!("Skeleton ready for user {id} (saved calibration)");
                        self.notify(LifecycleEvent::SkeletonReady(user));
                    }
                    return;
                }
                Err(e) => {
                    warn!("Could not reuse saved calibration for user {id}: {e}");
                }
            }
        }

        self.begin_pose_detection(id);
    }

    fn reuse_calibration(&self, id: UserId) -> Result<(), SensorError> {
        self.calibration.restore(self.sensor.as_ref(), id)?;
        self.sensor.start_tracking(id)
    }

    fn begin_pose_detection(&self, id: UserId) {
        if let Err(e) = self.sensor.start_pose_detection(&self.calibration_pose, id) {
            warn!("Could not start pose detection for user {id}: {e}");
        }
        self.registry.set_state(id, CalibrationState::PoseDetecting);
    }

    fn on_pose_detected(&self, id: UserId, pose: &str) {
        if !self.is_enabled() {
            return;
        }

        let Some(user) = self.registry.find_user(id) else {
            debug!("Pose '{pose}' detected for unknown user {id}");
            return;
        };

        info!("Pose '{pose}' detected for user: {id}");
        let already_calibrating =
            user.state() == CalibrationState::Calibrating || self.sensor.is_calibrating(id);
        self.notify(LifecycleEvent::PoseDetected {
            user,
            pose: pose.to_string(),
        });

        if already_calibrating {
            return;
        }

        if let Err(e) = self.sensor.stop_pose_detection(id) {
            debug!("Could not stop pose detection for user {id}: {e}");
        }

        if let Err(e) = self.sensor.request_calibration(id, true) {
            warn!("Calibration request failed for user {id}: {e}");
            self.begin_pose_detection(id);
            return;
        }

        self.activity.record_calibration_started();
        if let Some(user) = self.registry.set_state(id, CalibrationState::Calibrating) {
            info!("Calibration started for user: {id}");
            self.notify(LifecycleEvent::CalibrationStarted(user));
        }
    }

    fn on_calibration_complete(&self, id: UserId, status: CalibrationStatus) {
        if !self.is_enabled() {
            return;
        }

        if !self.registry.contains(id) {
            debug!("Calibration finished ({status:?}) for unknown user {id}");
            return;
        }

        if status.is_success() {
            match self.sensor.start_tracking(id) {
                Ok(()) => {
                    self.finish_calibration(id);
                    return;
                }
                Err(e) => warn!("Could not start tracking user {id}: {e}"),
            }
        } else {
            info!("Calibration failed for user {id} ({status:?}), searching for pose");
        }

        self.activity.record_calibration_failed();
        self.begin_pose_detection(id);
        if let Some(user) = self.registry.find_user(id) {
            self.notify(LifecycleEvent::CalibrationEnded { user, failed: true });
        }
    }

    fn finish_calibration(&self, id: UserId) {
        match self.calibration.persist_first(self.sensor.as_ref(), id) {
            Ok(true) => info!(
                "Saved calibration from user {id} to {}",
                self.calibration.path().display()
            ),
            Ok(false) => {}
            Err(e) => warn!("Could not save calibration from user {id}: {e}"),
        }

        self.activity.record_calibration_succeeded();
        if let Some(user) = self.registry.set_state(id, CalibrationState::Tracking) {
            info!("Calibration completed for user: {id}");
            self.notify(LifecycleEvent::SkeletonReady(user.clone()));
            self.notify(LifecycleEvent::CalibrationEnded {
                user,
                failed: false,
            });
        }
    }

    fn on_lost_user(&self, id: UserId) {
        if !self.is_enabled() {
            return;
        }

        if !self.registry.contains(id) {
            debug!("Lost unknown user {id}");
            return;
        }

        if let Err(e) = self.sensor.stop_pose_detection(id) {
            debug!("Could not stop pose detection for lost user {id}: {e}");
        }
        if self.sensor.is_tracking(id) {
            if let Err(e) = self.sensor.stop_tracking(id) {
                debug!("Could not stop tracking lost user {id}: {e}");
            }
        }

        if let Some(mut user) = self.registry.remove_user(id) {
            user.set_state(CalibrationState::Lost);
            info!("Lost user: {id}");
            self.activity.record_user_lost();
            self.notify(LifecycleEvent::UserLost(user));
        }
    }
}

/// Wrap a tracker callback so the sensor only holds a weak reference.
fn handler<F>(core: &Arc<TrackerCore>, f: F) -> EventHandler
where
    F: Fn(&TrackerCore, &SensorEvent) + Send + Sync + 'static,
{
    let core = Arc::downgrade(core);
    Arc::new(move |event| {
        if let Some(core) = core.upgrade() {
            f(&core, event);
        }
    })
}

/// Tracks users reported by the sensor and calibrates their skeletons.
pub struct UserTracker {
    core: Arc<TrackerCore>,
    receiver: Receiver<LifecycleEvent>,
    subscriptions: Vec<Subscription>,
    disposed: bool,
}

impl UserTracker {
    /// Subscribe to the sensor and start user generation.
    pub fn new(
        sensor: Arc<dyn SensorBridge>,
        config: TrackerConfig,
        activity: SharedActivityLog,
    ) -> Result<Self, SensorError> {
        // Use a bounded channel to prevent unbounded memory growth
        let (sender, receiver) = bounded(config.notification_capacity.max(1));

        let core = Arc::new(TrackerCore {
            calibration_pose: sensor.calibration_pose(),
            sensor: sensor.clone(),
            registry: UserRegistry::new(),
            calibration: CalibrationStore::new(config.calibration_path),
            enabled: AtomicBool::new(true),
            notifications: sender,
            observers: RwLock::new(Vec::new()),
            user_handlers: RwLock::new(None),
            user_found_handler: config.user_found_handler,
            user_lost_handler: config.user_lost_handler,
            activity,
        });

        let subscriptions = vec![
            Subscription::register(
                &sensor,
                SensorEventKind::NewUser,
                handler(&core, |core, event| {
                    if let SensorEvent::NewUser { id } = event {
                        core.on_new_user(*id);
                    }
                }),
            ),
            Subscription::register(
                &sensor,
                SensorEventKind::LostUser,
                handler(&core, |core, event| {
                    if let SensorEvent::LostUser { id } = event {
                        core.on_lost_user(*id);
                    }
                }),
            ),
            Subscription::register(
                &sensor,
                SensorEventKind::PoseDetected,
                handler(&core, |core, event| {
                    if let SensorEvent::PoseDetected { id, pose } = event {
                        core.on_pose_detected(*id, pose);
                    }
                }),
            ),
            Subscription::register(
                &sensor,
                SensorEventKind::CalibrationComplete,
                handler(&core, |core, event| {
                    if let SensorEvent::CalibrationComplete { id, status } = event {
                        core.on_calibration_complete(*id, *status);
                    }
                }),
            ),
        ];

        sensor.set_skeleton_profile(config.skeleton_profile)?;
        sensor.start_user_generation()?;

        Ok(Self {
            core,
            receiver,
            subscriptions,
            disposed: false,
        })
    }

    /// Copy the latest joint readings into every Tracking user.
    ///
    /// Returns how many users were updated. Does nothing while disabled.
    pub fn update(&self) -> usize {
        if self.disposed || !self.core.is_enabled() {
            return 0;
        }
        joints::sync_tracked_users(self.core.sensor.as_ref(), &self.core.registry)
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    /// Enable or disable event handling. Subscriptions stay registered.
    pub fn set_enabled(&self, enabled: bool) {
        self.core.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Snapshot of one user.
    pub fn user(&self, id: UserId) -> Option<User> {
        self.core.registry.find_user(id)
    }

    /// Snapshot of every user, ordered by id.
    pub fn users(&self) -> Vec<User> {
        self.core.registry.snapshot()
    }

    pub fn user_count(&self) -> usize {
        self.core.registry.len()
    }

    /// Pose users must hold to calibrate.
    pub fn calibration_pose(&self) -> &str {
        &self.core.calibration_pose
    }

    pub fn calibration_path(&self) -> &Path {
        self.core.calibration.path()
    }

    /// Call `observer` synchronously for every lifecycle notification.
    ///
    /// Observers run on the polling thread before the notification is queued,
    /// so they see every event even when the channel is full.
    pub fn on_event<F>(&self, observer: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.core.observers.write().push(Arc::new(observer));
    }

    /// Resolve the configured found/lost user handlers through `resolver`.
    pub fn set_user_handlers(&self, resolver: Arc<dyn UserHandlerResolver>) {
        *self.core.user_handlers.write() = Some(resolver);
    }

    /// Receiver for lifecycle notifications.
    ///
    /// The channel is bounded; when it is full new notifications are dropped.
    /// Use [`UserTracker::on_event`] for delivery that cannot be lost.
    pub fn notifications(&self) -> &Receiver<LifecycleEvent> {
        &self.receiver
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Option<LifecycleEvent> {
        self.receiver.try_recv().ok()
    }

    /// Tear down: unsubscribe, stop tracking every user, clear the registry
    /// and release the user generator, in that order. Errors are logged and
    /// otherwise ignored. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        for subscription in self.subscriptions.drain(..) {
            subscription.release();
        }

        let sensor = self.core.sensor.as_ref();
        for id in self.core.registry.ids() {
            if sensor.is_tracking(id) {
                if let Err(e) = sensor.stop_tracking(id) {
                    debug!("Could not stop tracking user {id} during dispose: {e}");
                }
            }
        }

        self.core.registry.drain();

        if let Err(e) = sensor.release_user_generator() {
            debug!("Could not release user generator: {e}");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for UserTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::create_shared_log;
    use crate::sensor::simulated::{SensorCall, SimulatedSensor};

    fn setup(dir: &tempfile::TempDir) -> (Arc<SimulatedSensor>, UserTracker) {
        let sensor = Arc::new(SimulatedSensor::new());
        let tracker = UserTracker::new(
            sensor.clone(),
            TrackerConfig::new(dir.path().join("calibration.dat")),
            create_shared_log(),
        )
        .unwrap();
        (sensor, tracker)
    }

    #[test]
    fn test_construction_configures_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let (sensor, tracker) = setup(&dir);

        assert_eq!(sensor.subscriber_count(), 4);
        assert_eq!(sensor.skeleton_profile(), SkeletonProfile::All);
        assert!(sensor.calls().contains(&SensorCall::StartUserGeneration));
        assert_eq!(tracker.calibration_pose(), "Psi");
    }

    #[test]
    fn test_duplicate_new_user_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (sensor, tracker) = setup(&dir);

        sensor.push_events([SensorEvent::NewUser { id: 1 }, SensorEvent::NewUser { id: 1 }]);
        sensor.wait_and_update_all().unwrap();

        assert_eq!(tracker.user_count(), 1);
        let found = tracker
            .notifications()
            .try_iter()
            .filter(|e| matches!(e, LifecycleEvent::UserFound(_)))
            .count();
        assert_eq!(found, 1);
    }

    #[test]
    fn test_disabled_tracker_ignores_events() {
        let dir = tempfile::tempdir().unwrap();
        let (sensor, tracker) = setup(&dir);

        tracker.set_enabled(false);
        sensor.push_event(SensorEvent::NewUser { id: 1 });
        sensor.wait_and_update_all().unwrap();

        assert_eq!(tracker.user_count(), 0);
        assert!(tracker.try_recv().is_none());
        assert_eq!(sensor.subscriber_count(), 4);
    }

    #[test]
    fn test_failed_tracking_start_returns_to_pose_detection() {
        let dir = tempfile::tempdir().unwrap();
        let (sensor, tracker) = setup(&dir);
        sensor.refuse_tracking(2);

        sensor.push_event(SensorEvent::NewUser { id: 2 });
        sensor.wait_and_update_all().unwrap();
        sensor.push_event(SensorEvent::PoseDetected {
            id: 2,
            pose: "Psi".into(),
        });
        sensor.wait_and_update_all().unwrap();
        sensor.push_event(SensorEvent::CalibrationComplete {
            id: 2,
            status: CalibrationStatus::PoseConfirmed,
        });
        sensor.wait_and_update_all().unwrap();

        let user = tracker.user(2).unwrap();
        assert_eq!(user.state(), CalibrationState::PoseDetecting);
        assert!(!user.is_calibrated());
        assert!(!tracker.calibration_path().exists());
    }

    #[test]
    fn test_full_channel_drops_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = Arc::new(SimulatedSensor::new());
        let mut config = TrackerConfig::new(dir.path().join("calibration.dat"));
        config.notification_capacity = 1;
        let tracker = UserTracker::new(sensor.clone(), config, create_shared_log()).unwrap();

        sensor.push_events([SensorEvent::NewUser { id: 1 }, SensorEvent::NewUser { id: 2 }]);
        sensor.wait_and_update_all().unwrap();

        assert_eq!(tracker.user_count(), 2);
        assert_eq!(tracker.notifications().len(), 1);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (sensor, mut tracker) = setup(&dir);

        tracker.dispose();
        tracker.dispose();
        drop(tracker);

        let releases = sensor
            .calls()
            .into_iter()
            .filter(|c| *c == SensorCall::ReleaseUserGenerator)
            .count();
        assert_eq!(releases, 1);
        assert_eq!(sensor.subscriber_count(), 0);
    }
}
