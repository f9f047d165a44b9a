//! Extension instance cache
//!
//! At most one live instance per id. Each id owns a `OnceCell` slot, so
//! concurrent loads of the same id share a single in-flight initialization.
//! Failed loads leave the slot empty and the next caller retries.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::core::error::Result;

type Slot<T> = Arc<OnceCell<Arc<T>>>;

pub struct ExtensionCache<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Default for ExtensionCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> ExtensionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Slot<T> {
        self.slots.lock().entry(id.to_string()).or_default().clone()
    }

    /// Whether a live instance is cached for the id
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.slots.lock().get(id).and_then(|slot| slot.get().cloned())
    }

    /// Store an instance unless one is already cached
    ///
    /// Returns whichever instance ends up cached. While a load for the id is
    /// still in flight nothing is stored and the given instance comes back.
    pub fn set(&self, id: &str, instance: Arc<T>) -> Arc<T> {
        let slot = self.slot(id);
        match slot.set(Arc::clone(&instance)) {
            Ok(()) => instance,
            Err(_) => slot.get().cloned().unwrap_or(instance),
        }
    }

    /// Cached instance, or the result of `load` shared by all concurrent callers
    pub async fn get_or_load<F, Fut>(&self, id: &str, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>>>,
    {
        let slot = self.slot(id);
        let result = slot.get_or_try_init(load).await.cloned();
        if result.is_err() {
            self.release(id, slot);
        }
        result
    }

    /// Forget an empty slot once no other caller is waiting on it
    fn release(&self, id: &str, slot: Slot<T>) {
        let mut slots = self.slots.lock();
        // released under the lock: the last waiter out sees only the map's handle
        drop(slot);
        let unused = slots
            .get(id)
            .map_or(false, |current| !current.initialized() && Arc::strong_count(current) == 1);
        if unused {
            slots.remove(id);
        }
    }

    /// Drop the cached instance for an id
    pub fn evict(&self, id: &str) -> Option<Arc<T>> {
        self.slots
            .lock()
            .remove(id)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Ids with a live instance
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
