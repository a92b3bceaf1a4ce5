//! Integration tests for the tracking session

use depth_user_tracker::activity::create_shared_log;
use depth_user_tracker::config::{Config, RetryPolicy};
use depth_user_tracker::gesture::{Gesture, HandlerTable};
use depth_user_tracker::sensor::{
    FlakyConnector, JointKind, Point3, SensorCall, SensorError, SensorEvent, SimulatedSensor,
    SimulationScript,
};
use depth_user_tracker::tracking::CalibrationState;
use depth_user_tracker::{connect_with_retry, TrackingSession};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn test_config(dir: &tempfile::TempDir) -> Config {
    Config {
        calibration_path: dir.path().join("calibration.dat"),
        data_path: dir.path().to_path_buf(),
        tick_interval: Duration::ZERO,
        bootstrap: RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: Some(5),
        },
        ..Config::default()
    }
}

fn demo_script() -> SimulationScript {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join("wave_session.json");
    SimulationScript::load(&path).expect("Failed to load demo script")
}

#[test]
fn test_bootstrap_retries_until_sensor_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let mut connector = FlakyConnector::new([
        SensorError::Unavailable("device busy".into()),
        SensorError::Unavailable("device busy".into()),
        SensorError::Unavailable("device busy".into()),
    ]);

    let sensor = connect_with_retry(&config.bootstrap, || connector.connect()).unwrap();
    assert_eq!(connector.attempts(), 4);

    let session = TrackingSession::new(
        Arc::new(sensor),
        &config,
        Arc::new(HandlerTable::new()),
        create_shared_log(),
    );
    assert!(session.is_ok());
}

#[test]
fn test_bootstrap_stops_on_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let mut connector = FlakyConnector::new([
        SensorError::Unavailable("device busy".into()),
        SensorError::Fatal("unsupported device".into()),
    ]);

    let result = connect_with_retry(&config.bootstrap, || connector.connect());

    assert_eq!(
        result.err(),
        Some(SensorError::Fatal("unsupported device".into()))
    );
    assert_eq!(connector.attempts(), 2);
}

#[test]
fn test_demo_replay() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let script = demo_script();

    let received = Arc::new(Mutex::new(Vec::new()));
    let handlers = Arc::new(HandlerTable::new());
    for name in ["OnWave", "LogWave", "OnClick"] {
        let received = received.clone();
        handlers.register(name, move |g: &Gesture| {
            received.lock().push((name, g.progress));
        });
    }

    let sensor = Arc::new(script.sensor());
    let activity = create_shared_log();
    let mut session =
        TrackingSession::new(sensor.clone(), &config, handlers, activity.clone()).unwrap();

    let mut rejected = Vec::new();
    for listener in &script.listeners {
        if session
            .add_listener(&listener.gesture, &listener.handler)
            .is_err()
        {
            rejected.push(listener.gesture.clone());
        }
    }
    assert_eq!(rejected, vec!["Swipe"]);

    for (index, frame) in script.frames.iter().enumerate() {
        frame.apply(&sensor);
        session.update().unwrap();

        match index {
            2 => assert_eq!(
                session.users().user(1).unwrap().state(),
                CalibrationState::PoseDetecting
            ),
            4 => assert!(config.calibration_path.exists()),
            5 => {
                let user = session.users().user(1).unwrap();
                assert!(user.is_calibrated());
                assert_eq!(
                    user.joint(JointKind::Head).position,
                    Point3::new(12.0, 640.0, 2100.0)
                );
                assert_eq!(user.joint(JointKind::RightHand).position_confidence, 0.5);
            }
            8 => assert_eq!(
                session.users().user(2).unwrap().state(),
                CalibrationState::Tracking
            ),
            _ => {}
        }
    }

    assert_eq!(session.users().user_count(), 0);
    assert_eq!(
        *received.lock(),
        vec![
            ("OnWave", 50.0),
            ("LogWave", 50.0),
            ("OnWave", 100.0),
            ("LogWave", 100.0)
        ]
    );

    let stats = activity.stats();
    assert_eq!(stats.ticks, script.frames.len() as u64);
    assert_eq!(stats.users_found, 2);
    assert_eq!(stats.users_lost, 2);
    assert_eq!(stats.calibrations_started, 2);
    assert_eq!(stats.calibrations_failed, 1);
    assert_eq!(stats.calibrations_succeeded, 1);
    assert_eq!(stats.calibrations_reused, 1);
    assert_eq!(stats.gestures_dispatched, 4);

    session.dispose();
    assert!(sensor.is_shut_down());
}

#[test]
fn test_dispose_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let sensor = Arc::new(SimulatedSensor::with_gestures(["Wave"]));
    let mut session = TrackingSession::new(
        sensor.clone(),
        &config,
        Arc::new(HandlerTable::new()),
        create_shared_log(),
    )
    .unwrap();

    sensor.push_event(SensorEvent::NewUser { id: 1 });
    session.update().unwrap();
    sensor.clear_calls();

    session.dispose();
    session.dispose();

    assert_eq!(
        sensor.calls(),
        vec![
            SensorCall::StopGestureGeneration,
            SensorCall::ReleaseGestureGenerator,
            SensorCall::ReleaseUserGenerator,
            SensorCall::Shutdown,
        ]
    );
    assert_eq!(sensor.subscriber_count(), 0);
    assert!(session.is_disposed());
}

#[test]
fn test_drop_disposes_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let sensor = Arc::new(SimulatedSensor::new());
    let session = TrackingSession::new(
        sensor.clone(),
        &config,
        Arc::new(HandlerTable::new()),
        create_shared_log(),
    )
    .unwrap();

    drop(session);

    assert_eq!(sensor.subscriber_count(), 0);
    assert!(sensor.is_shut_down());
}
