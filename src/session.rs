//! The host-facing tracking session.
//!
//! A [`TrackingSession`] owns the sensor handle, the [`UserTracker`] and the
//! [`GestureDispatcher`]. The host calls [`TrackingSession::update`] once per
//! tick; everything else happens inside that call.

use crate::activity::SharedActivityLog;
use crate::config::{Config, RetryPolicy};
use crate::gesture::{GestureDispatcher, GestureError, HandlerResolver};
use crate::sensor::bridge::SensorBridge;
use crate::sensor::types::SensorError;
use crate::tracking::{UserHandlerResolver, UserTracker};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Open a sensor context, retrying retryable failures with exponential
/// backoff.
///
/// [`SensorError::Fatal`] (or any other non-retryable error) is returned
/// immediately. If the policy has an attempt limit, the last error is
/// returned once it is reached.
pub fn connect_with_retry<S, F>(policy: &RetryPolicy, mut connect: F) -> Result<S, SensorError>
where
    F: FnMut() -> Result<S, SensorError>,
{
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match connect() {
            Ok(sensor) => {
                if attempts > 1 {
                    info!("Sensor connected after {attempts} attempts");
                }
                return Ok(sensor);
            }
            Err(e) if !e.is_retryable() => {
                warn!("Sensor initialisation failed: {e}");
                return Err(e);
            }
            Err(e) => {
                if !policy.allows(attempts) {
                    warn!("Giving up on sensor after {attempts} attempts: {e}");
                    return Err(e);
                }
                let delay = policy.delay_for(attempts);
                warn!("Sensor not available ({e}), retrying in {delay:?}");
                thread::sleep(delay);
            }
        }
    }
}

/// Users and gestures driven by one sensor context.
pub struct TrackingSession {
    sensor: Arc<dyn SensorBridge>,
    users: UserTracker,
    gestures: GestureDispatcher,
    activity: SharedActivityLog,
    disposed: bool,
}

impl TrackingSession {
    /// Build the user tracker and gesture dispatcher on top of `sensor`.
    pub fn new(
        sensor: Arc<dyn SensorBridge>,
        config: &Config,
        resolver: Arc<dyn HandlerResolver>,
        activity: SharedActivityLog,
    ) -> Result<Self, SensorError> {
        let users = UserTracker::new(sensor.clone(), config.tracker_config(), activity.clone())?;
        let gestures = GestureDispatcher::new(sensor.clone(), resolver, activity.clone())?;
        gestures.set_enabled(config.detect_gestures);

        info!(
            "Context initialised (calibration pose '{}', gestures {})",
            users.calibration_pose(),
            if config.detect_gestures { "on" } else { "off" }
        );

        Ok(Self {
            sensor,
            users,
            gestures,
            activity,
            disposed: false,
        })
    }

    /// Run one tick: wait for the next frame (delivering any pending sensor
    /// events), then copy joint data into tracked users.
    ///
    /// Returns how many users had their joints updated.
    pub fn update(&self) -> Result<usize, SensorError> {
        if self.disposed {
            return Err(SensorError::Released);
        }

        self.sensor.wait_and_update_all()?;
        let synced = self.users.update();
        self.activity.record_tick();
        Ok(synced)
    }

    /// See [`GestureDispatcher::add_listener`].
    pub fn add_listener(&self, gesture: &str, handler: &str) -> Result<(), GestureError> {
        self.gestures.add_listener(gesture, handler)
    }

    /// See [`GestureDispatcher::remove_listener`].
    pub fn remove_listener(&self, gesture: &str, handler: &str) {
        self.gestures.remove_listener(gesture, handler)
    }

    pub fn set_detect_gestures(&self, enabled: bool) {
        self.gestures.set_enabled(enabled);
    }

    /// Resolve the configured user found/lost handlers through `resolver`.
    pub fn set_user_handlers(&self, resolver: Arc<dyn UserHandlerResolver>) {
        self.users.set_user_handlers(resolver);
    }

    pub fn users(&self) -> &UserTracker {
        &self.users
    }

    pub fn gestures(&self) -> &GestureDispatcher {
        &self.gestures
    }

    pub fn activity(&self) -> &SharedActivityLog {
        &self.activity
    }

    /// Dispose gestures, then users, then shut the sensor context down.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.gestures.dispose();
        self.users.dispose();

        if let Err(e) = self.sensor.shutdown() {
            debug!("Could not shut down sensor context: {e}");
        }
        info!("Context shut down");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::create_shared_log;
    use crate::gesture::HandlerTable;
    use crate::sensor::simulated::{FlakyConnector, SensorCall, SimulatedSensor};
    use crate::sensor::types::SensorEvent;
    use std::time::Duration;

    fn fast_policy(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts,
        }
    }

    #[test]
    fn test_retry_until_available() {
        let mut connector = FlakyConnector::new([
            SensorError::Unavailable("no device".into()),
            SensorError::Unavailable("no device".into()),
        ]);

        let result = connect_with_retry(&fast_policy(None), || connector.connect());
        assert!(result.is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let mut connector = FlakyConnector::new([SensorError::Fatal("bad config".into())]);

        let result = connect_with_retry(&fast_policy(None), || connector.connect());
        assert!(matches!(result, Err(SensorError::Fatal(_))));
        assert_eq!(connector.attempts(), 1);
    }

    #[test]
    fn test_attempt_limit() {
        let mut connector =
            FlakyConnector::new((0..5).map(|_| SensorError::Unavailable("no device".into())));

        let result = connect_with_retry(&fast_policy(Some(2)), || connector.connect());
        assert!(matches!(result, Err(SensorError::Unavailable(_))));
        assert_eq!(connector.attempts(), 2);
    }

    #[test]
    fn test_detect_gestures_flag() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = Arc::new(SimulatedSensor::new());
        let config = Config {
            calibration_path: dir.path().join("calibration.dat"),
            detect_gestures: false,
            ..Config::default()
        };

        let session = TrackingSession::new(
            sensor,
            &config,
            Arc::new(HandlerTable::new()),
            create_shared_log(),
        )
        .unwrap();
        assert!(!session.gestures().is_enabled());

        session.set_detect_gestures(true);
        assert!(session.gestures().is_enabled());
    }

    #[test]
    fn test_update_after_dispose_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = Arc::new(SimulatedSensor::new());
        let config = Config {
            calibration_path: dir.path().join("calibration.dat"),
            ..Config::default()
        };
        let mut session = TrackingSession::new(
            sensor.clone(),
            &config,
            Arc::new(HandlerTable::new()),
            create_shared_log(),
        )
        .unwrap();

        sensor.push_event(SensorEvent::NewUser { id: 1 });
        session.update().unwrap();
        assert_eq!(session.users().user_count(), 1);
        assert_eq!(session.activity().stats().ticks, 1);

        session.dispose();
        assert!(matches!(session.update(), Err(SensorError::Released)));
        assert_eq!(sensor.calls().last(), Some(&SensorCall::Shutdown));
    }
}
