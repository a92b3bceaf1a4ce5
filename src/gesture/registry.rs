//! Gesture name → handler id bindings.

use crate::gesture::types::GestureError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Listener bindings guarded by a single lock.
///
/// Sensor activation callbacks passed to [`GestureRegistry::add`] and
/// [`GestureRegistry::remove`] run under the lock, so registration and the
/// matching sensor call cannot interleave with another registration or with
/// dispatch.
#[derive(Debug, Default)]
pub struct GestureRegistry {
    bindings: Mutex<HashMap<String, Vec<String>>>,
}

impl GestureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to `gesture`'s listeners.
    ///
    /// `activate` runs once the pair is known not to be a duplicate; if it
    /// fails nothing is recorded.
    pub fn add<F>(&self, gesture: &str, handler: &str, activate: F) -> Result<(), GestureError>
    where
        F: FnOnce() -> Result<(), GestureError>,
    {
        let mut bindings = self.bindings.lock();

        if let Some(handlers) = bindings.get(gesture) {
            if handlers.iter().any(|h| h == handler) {
                return Err(GestureError::DuplicateHandler {
                    gesture: gesture.to_string(),
                    handler: handler.to_string(),
                });
            }
        }

        activate()?;

        bindings
            .entry(gesture.to_string())
            .or_default()
            .push(handler.to_string());
        Ok(())
    }

    /// Remove `handler` from `gesture` and run `deactivate`.
    ///
    /// Returns `false` without calling `deactivate` if the gesture was never
    /// registered. The binding itself is kept even when it has no handlers
    /// left.
    pub fn remove<F>(&self, gesture: &str, handler: &str, deactivate: F) -> bool
    where
        F: FnOnce(),
    {
        let mut bindings = self.bindings.lock();
        let Some(handlers) = bindings.get_mut(gesture) else {
            return false;
        };

        handlers.retain(|h| h != handler);
        deactivate();
        true
    }

    /// Call `f` with each handler id bound to `gesture`, in registration
    /// order, while holding the lock. Returns the number of ids visited.
    ///
    /// `f` must not call back into the registry.
    pub fn for_each_handler<F>(&self, gesture: &str, mut f: F) -> usize
    where
        F: FnMut(&str),
    {
        let bindings = self.bindings.lock();
        let Some(handlers) = bindings.get(gesture) else {
            return 0;
        };

        for handler in handlers {
            f(handler);
        }
        handlers.len()
    }

    /// Handler ids bound to `gesture`, in registration order.
    pub fn handlers(&self, gesture: &str) -> Vec<String> {
        self.bindings
            .lock()
            .get(gesture)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_gesture(&self, gesture: &str) -> bool {
        self.bindings.lock().contains_key(gesture)
    }

    /// Registered gesture names, sorted.
    pub fn gestures(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }
}
