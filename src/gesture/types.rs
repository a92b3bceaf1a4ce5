//! Gesture values and the host's handler lookup capability.

use crate::sensor::types::{Point3, SensorError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Progress reported for a fully recognized gesture.
pub const COMPLETE_PROGRESS: f32 = 100.0;

/// A gesture occurrence handed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    /// Gesture name, as the sensor knows it
    pub name: String,
    /// Completion percentage (0-100)
    pub progress: f32,
    /// Where the gesture was first identified
    pub start_position: Point3,
    /// Where the gesture ended (or currently is, while in progress)
    pub end_position: Point3,
}

impl Gesture {
    /// A completed gesture.
    pub fn recognized(name: impl Into<String>, identified: Point3, end: Point3) -> Self {
        Self {
            name: name.into(),
            progress: COMPLETE_PROGRESS,
            start_position: identified,
            end_position: end,
        }
    }

    /// A gesture still being performed.
    pub fn in_progress(name: impl Into<String>, position: Point3, progress: f32) -> Self {
        Self {
            name: name.into(),
            progress,
            start_position: position,
            end_position: position,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE_PROGRESS
    }
}

/// Something the host can run when a gesture fires.
pub trait GestureHandler: Send + Sync {
    fn execute(&self, gesture: &Gesture);
}

impl<F> GestureHandler for F
where
    F: Fn(&Gesture) + Send + Sync,
{
    fn execute(&self, gesture: &Gesture) {
        self(gesture)
    }
}

/// Resolves a handler id to something executable.
///
/// Ids that do not resolve are skipped at dispatch time, so handlers may be
/// registered before the host element they name exists.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn GestureHandler>>;
}

/// A resolver backed by a name → handler map.
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<String, Arc<dyn GestureHandler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`, replacing any previous binding.
    pub fn register<H>(&self, name: impl Into<String>, handler: H)
    where
        H: GestureHandler + 'static,
    {
        self.handlers.write().insert(name.into(), Arc::new(handler));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }
}

impl HandlerResolver for HandlerTable {
    fn resolve(&self, name: &str) -> Option<Arc<dyn GestureHandler>> {
        self.handlers.read().get(name).cloned()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("HandlerTable").field("handlers", &names).finish()
    }
}

/// Errors from listener registration.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureError {
    /// The sensor does not offer this gesture
    InvalidGesture(String),
    /// The handler is already registered for the gesture
    DuplicateHandler { gesture: String, handler: String },
    /// The sensor refused to activate the gesture
    Sensor(SensorError),
}

impl std::fmt::Display for GestureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GestureError::InvalidGesture(gesture) => {
                write!(f, "The specified gesture '{gesture}' is not valid")
            }
            GestureError::DuplicateHandler { gesture, handler } => write!(
                f,
                "Handler '{handler}' already registered for the gesture '{gesture}'"
            ),
            GestureError::Sensor(e) => write!(f, "Could not activate gesture: {e}"),
        }
    }
}

impl std::error::Error for GestureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GestureError::Sensor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SensorError> for GestureError {
    fn from(e: SensorError) -> Self {
        GestureError::Sensor(e)
    }
}
