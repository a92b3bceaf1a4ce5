//! Host callbacks for user lifecycle events.
//!
//! Observers see every [`LifecycleEvent`] synchronously, as it happens.
//! Named user handlers are looked up through a [`UserHandlerResolver`] when a
//! user is found or lost, the same way gesture handlers are.

use crate::tracking::types::{LifecycleEvent, User};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked for every lifecycle notification.
pub type LifecycleObserver = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Something the host can run when a user is found or lost.
pub trait UserHandler: Send + Sync {
    fn execute(&self, user: &User);
}

impl<F> UserHandler for F
where
    F: Fn(&User) + Send + Sync,
{
    fn execute(&self, user: &User) {
        self(user)
    }
}

/// Resolves a user handler name to something executable.
pub trait UserHandlerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn UserHandler>>;
}

/// A resolver backed by a name → handler map.
#[derive(Default)]
pub struct UserHandlerTable {
    handlers: RwLock<HashMap<String, Arc<dyn UserHandler>>>,
}

impl UserHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`, replacing any previous binding.
    pub fn register<H>(&self, name: impl Into<String>, handler: H)
    where
        H: UserHandler + 'static,
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

impl UserHandlerResolver for UserHandlerTable {
    fn resolve(&self, name: &str) -> Option<Arc<dyn UserHandler>> {
        self.handlers.read().get(name).cloned()
    }
}

impl std::fmt::Debug for UserHandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("UserHandlerTable")
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_table_resolves_closures() {
        let table = UserHandlerTable::new();
        let last = Arc::new(AtomicU32::new(0));
        let seen = last.clone();
        table.register("Greet", move |user: &User| seen.store(user.id(), Ordering::SeqCst));

        assert!(table.contains("Greet"));
        assert!(table.resolve("Missing").is_none());

        table.resolve("Greet").unwrap().execute(&User::new(9));
        assert_eq!(last.load(Ordering::SeqCst), 9);

        assert!(table.unregister("Greet"));
        assert!(!table.contains("Greet"));
    }
}
