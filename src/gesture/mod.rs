//! Gesture listeners.
//!
//! Hosts register handler ids against gesture names. When the sensor
//! recognizes a gesture (or reports progress on one), each registered id is
//! resolved through a [`HandlerResolver`] and executed in registration order.

pub mod dispatch;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use dispatch::GestureDispatcher;
pub use registry::GestureRegistry;
pub use types::{
    Gesture, GestureError, GestureHandler, HandlerResolver, HandlerTable, COMPLETE_PROGRESS,
};
