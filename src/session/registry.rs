//! Poll Registry
//!
//! Set of session ids currently being polled, each with the cancellation
//! token of its poller. Start and stop go through here and nowhere else.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Handed to a poller when it is registered.
#[derive(Debug, Clone)]
pub(crate) struct PollTicket {
    pub id: String,
    pub token: CancellationToken,
    generation: u64,
}

#[derive(Debug)]
struct PollEntry {
    token: CancellationToken,
    generation: u64,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, PollEntry>,
    next_generation: u64,
}

/// Never held across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct PollRegistry {
    inner: Mutex<RegistryInner>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a poller for `id`. Returns `None` if one already exists.
    pub fn try_register(&self, id: &str, parent: &CancellationToken) -> Option<PollTicket> {
        let mut inner = self.lock();
        if inner.entries.contains_key(id) {
            return None;
        }
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let token = parent.child_token();
        inner.entries.insert(
            id.to_string(),
            PollEntry {
                token: token.clone(),
                generation,
            },
        );
        Some(PollTicket {
            id: id.to_string(),
            token,
            generation,
        })
    }

    /// Remove and cancel the poller for `id`.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.lock().entries.remove(id);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Called by a poller that finished on its own. Leaves a newer poller
    /// registered under the same id untouched.
    pub fn release(&self, ticket: &PollTicket) -> bool {
        let mut inner = self.lock();
        let owned = inner
            .entries
            .get(&ticket.id)
            .is_some_and(|entry| entry.generation == ticket.generation);
        if owned {
            inner.entries.remove(&ticket.id);
        }
        drop(inner);
        ticket.token.cancel();
        owned
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PollEntry> = self.lock().entries.drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.token.cancel();
        }
        drained.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Sorted ids of active pollers
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}
