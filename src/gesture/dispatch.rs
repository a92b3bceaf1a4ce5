//! Gesture listener registration and dispatch.

use crate::activity::SharedActivityLog;
use crate::gesture::registry::GestureRegistry;
use crate::gesture::types::{Gesture, GestureError, HandlerResolver};
use crate::sensor::bridge::{EventHandler, SensorBridge, Subscription};
use crate::sensor::types::{SensorError, SensorEvent, SensorEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct DispatchCore {
    sensor: Arc<dyn SensorBridge>,
    registry: GestureRegistry,
    resolver: Arc<dyn HandlerResolver>,
    enabled: AtomicBool,
    activity: SharedActivityLog,
}

impl DispatchCore {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Run every resolvable handler for `gesture`. Returns how many ran.
    fn dispatch(&self, gesture: &Gesture) -> usize {
        let mut executed = 0;
        self.registry.for_each_handler(&gesture.name, |name| {
            match self.resolver.resolve(name) {
                Some(handler) => {
                    handler.execute(gesture);
                    executed += 1;
                }
                None => debug!("No handler named '{name}' for gesture '{}'", gesture.name),
            }
        });

        self.activity.record_gestures_dispatched(executed as u64);
        executed
    }

    fn on_gesture_event(&self, event: &SensorEvent) {
        if !self.is_enabled() {
            return;
        }

        match event {
            SensorEvent::GestureRecognized {
                gesture,
                identified_position,
                end_position,
            } => {
                self.dispatch(&Gesture::recognized(
                    gesture.clone(),
                    *identified_position,
                    *end_position,
                ));
                info!("Gesture '{gesture}' recognised");
            }
            SensorEvent::GestureProgress {
                gesture,
                position,
                progress,
            } => {
                self.dispatch(&Gesture::in_progress(gesture.clone(), *position, *progress));
                info!("Gesture '{gesture}' progress {progress}");
            }
            _ => {}
        }
    }
}

/// Routes recognized gestures to host handlers.
///
/// Handlers run synchronously on the thread polling the sensor, with the
/// listener lock held. A handler must not add or remove listeners.
pub struct GestureDispatcher {
    core: Arc<DispatchCore>,
    subscriptions: Vec<Subscription>,
    disposed: bool,
}

impl GestureDispatcher {
    /// Subscribe to gesture events and start gesture generation.
    pub fn new(
        sensor: Arc<dyn SensorBridge>,
        resolver: Arc<dyn HandlerResolver>,
        activity: SharedActivityLog,
    ) -> Result<Self, SensorError> {
        let core = Arc::new(DispatchCore {
            sensor: sensor.clone(),
            registry: GestureRegistry::new(),
            resolver,
            enabled: AtomicBool::new(true),
            activity,
        });

        let subscriptions = vec![
            Subscription::register(&sensor, SensorEventKind::GestureRecognized, handler(&core)),
            Subscription::register(&sensor, SensorEventKind::GestureProgress, handler(&core)),
        ];

        sensor.start_gesture_generation()?;

        Ok(Self {
            core,
            subscriptions,
            disposed: false,
        })
    }

    /// Register `handler` for `gesture` and activate recognition.
    pub fn add_listener(&self, gesture: &str, handler: &str) -> Result<(), GestureError> {
        if self.disposed {
            return Err(GestureError::Sensor(SensorError::Released));
        }

        if !self.core.sensor.is_gesture_available(gesture) {
            return Err(GestureError::InvalidGesture(gesture.to_string()));
        }

        let sensor = self.core.sensor.as_ref();
        self.core
            .registry
            .add(gesture, handler, || Ok(sensor.add_gesture(gesture)?))?;

        debug!("Handler '{handler}' listening for gesture '{gesture}'");
        Ok(())
    }

    /// Unregister `handler` from `gesture`.
    ///
    /// This deactivates recognition of `gesture` even if other handlers are
    /// still registered for it. Unknown gestures are ignored.
    pub fn remove_listener(&self, gesture: &str, handler: &str) {
        let sensor = self.core.sensor.as_ref();
        self.core.registry.remove(gesture, handler, || {
            if let Err(e) = sensor.remove_gesture(gesture) {
                debug!("Could not deactivate gesture '{gesture}': {e}");
            }
        });
    }

    /// Handler ids registered for `gesture`, in registration order.
    pub fn listeners(&self, gesture: &str) -> Vec<String> {
        self.core.registry.handlers(gesture)
    }

    /// Gestures that have (or had) listeners.
    pub fn gestures(&self) -> Vec<String> {
        self.core.registry.gestures()
    }

    pub fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    /// Enable or disable dispatch. Disabled dispatchers drop every event.
    pub fn set_enabled(&self, enabled: bool) {
        self.core.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Unsubscribe, stop gesture generation and release the generator.
    /// Errors are logged and otherwise ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        for subscription in self.subscriptions.drain(..) {
            subscription.release();
        }

        let sensor = self.core.sensor.as_ref();
        if let Err(e) = sensor.stop_gesture_generation() {
            debug!("Could not stop gesture generation: {e}");
        }
        if let Err(e) = sensor.release_gesture_generator() {
            debug!("Could not release gesture generator: {e}");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for GestureDispatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn handler(core: &Arc<DispatchCore>) -> EventHandler {
    let core = Arc::downgrade(core);
    Arc::new(move |event| {
        if let Some(core) = core.upgrade() {
            core.on_gesture_event(event);
        }
    })
}
