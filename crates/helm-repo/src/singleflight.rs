//! Request deduplication for in-flight fetches
//!
//! Concurrent calls for the same key share one underlying future. The table
//! only holds a weak handle to it: once every caller has gone away the fetch
//! is dropped (cancelling its I/O) and the next caller starts a fresh one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;

use crate::Result;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;

struct Flight<V> {
    id: u64,
    fetch: WeakShared<BoxFuture<'static, Result<V>>>,
}

/// Whether a call started a fetch or joined one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

pub struct SingleFlight<K, V> {
    flights: Arc<Mutex<HashMap<K, Flight<V>>>>,
    next_id: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` for `key` unless a fetch for it is already running, and
    /// await the shared outcome.
    ///
    /// The entry is removed as soon as the fetch completes, so results are
    /// never memoised here; callers cache successes themselves before the
    /// fetch returns.
    pub async fn run<F>(&self, key: K, start: F) -> (Role, Result<V>)
    where
        F: FnOnce() -> BoxFuture<'static, Result<V>>,
    {
        let (role, fetch) = self.join_or_start(key, start);
        (role, fetch.await)
    }

    fn join_or_start<F>(&self, key: K, start: F) -> (Role, SharedFetch<V>)
    where
        F: FnOnce() -> BoxFuture<'static, Result<V>>,
    {
        let mut flights = self.flights.lock();
        if let Some(fetch) = flights.get(&key).and_then(|f| f.fetch.upgrade()) {
            return (Role::Follower, fetch);
        }
        // Fetches whose callers all went away never reach their cleanup.
        flights.retain(|_, f| f.fetch.upgrade().is_some());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let table = Arc::downgrade(&self.flights);
        let owned_key = key.clone();
        let work = start();
        let fetch = async move {
            let outcome = work.await;
            if let Some(table) = table.upgrade() {
                let mut flights = table.lock();
                if flights.get(&owned_key).is_some_and(|f| f.id == id) {
                    flights.remove(&owned_key);
                }
            }
            outcome
        }
        .boxed()
        .shared();

        if let Some(weak) = fetch.downgrade() {
            flights.insert(key, Flight { id, fetch: weak });
        }
        (Role::Leader, fetch)
    }

    /// Number of keys with a fetch currently registered.
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .values()
            .filter(|f| f.fetch.upgrade().is_some())
            .count()
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.flights.lock().len()
    }
}
