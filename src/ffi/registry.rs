//! Registry of compiler handles handed out across the C boundary.
//!
//! C callers never receive a heap address. Each registered object gets a
//! token built from a serial number that is never reused, with the low bits
//! tagged so no aligned pointer can be mistaken for one. A deleted, forged,
//! or double-deleted handle therefore misses the registry instead of
//! aliasing a newer object.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use hashbrown::HashMap;

const TAG_BITS: u32 = 4;
const TAG: usize = 0b0101;

/// A registered object, shared with in-flight calls on the same handle.
pub(crate) type Shared<T> = Arc<Mutex<T>>;

pub(crate) struct HandleRegistry<T> {
    next_serial: AtomicUsize,
    live: OnceLock<Mutex<HashMap<usize, Shared<T>>>>,
}

impl<T> HandleRegistry<T> {
    pub(crate) const fn new() -> Self {
        Self {
            next_serial: AtomicUsize::new(1),
            live: OnceLock::new(),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<usize, Shared<T>>> {
        self.live
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of `value` and return its token.
    pub(crate) fn insert(&self, value: T) -> usize {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let token = (serial << TAG_BITS) | TAG;
        self.live().insert(token, Arc::new(Mutex::new(value)));
        token
    }

    pub(crate) fn get(&self, token: usize) -> Option<Shared<T>> {
        self.live().get(&token).cloned()
    }

    /// Forget `token`; `None` if it was not live.
    pub(crate) fn remove(&self, token: usize) -> Option<Shared<T>> {
        self.live().remove(&token)
    }
}

/// Lock a registered object, ignoring poisoning from a panicked caller.
pub(crate) fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
