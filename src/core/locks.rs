use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Per-workload mutual exclusion. Operations on different names never wait on
/// each other; operations on the same name run one at a time.
#[derive(Debug, Default)]
pub struct NameLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Held while an operation owns a workload name. Dropping it releases the name.
#[derive(Debug)]
pub struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: String,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, name: &str) -> NameGuard<'_> {
        let mut held = self.held_set();
        while held.contains(name) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(name.to_string());
        NameGuard {
            locks: self,
            name: name.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self, name: &str) -> bool {
        self.held_set().contains(name)
    }

    fn held_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        self.locks.held_set().remove(&self.name);
        self.locks.released.notify_all();
    }
}
