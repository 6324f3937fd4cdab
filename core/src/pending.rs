//! Set of in-flight probes that forget themselves after a fixed TTL.
//!
//! Entries live in two generations. Once per TTL the current generation
//! becomes the previous one and the old previous one is dropped wholesale,
//! so memory stays bounded by roughly two TTLs worth of probes without
//! scanning for expired keys. Every lookup still compares against the
//! entry's own deadline, so an entry is never reported after it expired.

use std::collections::HashMap;
use std::hash::Hash;
use std::mem;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{self, Instant};

pub struct PendingTracker<K> {
    ttl: Duration,
    state: Mutex<Generations<K>>,
}

struct Generations<K> {
    previous: HashMap<K, Instant>,
    current: HashMap<K, Instant>,
    rotate_at: Instant,
    latest_deadline: Option<Instant>,
}

impl<K: Eq + Hash> Generations<K> {
    fn rotate_if_due(&mut self, now: Instant, ttl: Duration) {
        if now < self.rotate_at {
            return;
        }
        // Everything in `previous` was added at least one TTL before the last
        // rotation, so it has expired by now.
        self.previous = mem::take(&mut self.current);
        self.rotate_at = now + ttl;
    }
}

impl<K: Eq + Hash> PendingTracker<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(Generations {
                previous: HashMap::new(),
                current: HashMap::new(),
                rotate_at: Instant::now() + ttl,
                latest_deadline: None,
            }),
        }
    }

    /// Records `key` as pending until now + TTL. Re-adding refreshes the deadline.
    pub fn add(&self, key: K) {
        let now = Instant::now();
        let deadline = now + self.ttl;
        let mut state = self.lock(now);
        state.current.insert(key, deadline);
        state.latest_deadline = Some(state.latest_deadline.map_or(deadline, |d| d.max(deadline)));
    }

    pub fn exist(&self, key: &K) -> bool {
        let now = Instant::now();
        let state = self.lock(now);
        let alive = |deadline: Option<&Instant>| deadline.is_some_and(|d| *d > now);
        alive(state.previous.get(key)) || alive(state.current.get(key))
    }

    /// Removes `key` and reports whether it was still pending.
    ///
    /// At most one caller gets `true` for a given `add`, which is what turns
    /// duplicate replies into a single discovery.
    pub fn take(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut state = self.lock(now);
        let in_previous = state.previous.remove(key).is_some_and(|d| d > now);
        let in_current = state.current.remove(key).is_some_and(|d| d > now);
        in_previous || in_current
    }

    /// Resolves once the latest deadline ever handed out has passed.
    ///
    /// Keys added while waiting push the deadline further out.
    pub async fn wait(&self) {
        loop {
            let deadline = {
                let now = Instant::now();
                let state = self.lock(now);
                match state.latest_deadline {
                    Some(deadline) if deadline > now => deadline,
                    _ => return,
                }
            };
            time::sleep_until(deadline).await;
        }
    }

    fn lock(&self, now: Instant) -> MutexGuard<'_, Generations<K>> {
        // A poisoned map is still structurally sound.
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.rotate_if_due(now, self.ttl);
        state
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
