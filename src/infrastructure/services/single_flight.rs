//! Per-key deduplication of in-flight fetches

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};

/// A fetch that every caller for the same key can await
pub type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

type InFlightMap<K, T, E> = HashMap<K, WeakShared<BoxFuture<'static, Result<T, E>>>>;

/// Lets concurrent callers for the same key share one fetch.
///
/// Only weak handles are kept here: once every caller has dropped its
/// [`SharedFetch`], the underlying future is dropped and the next caller
/// starts a new one.
pub struct SingleFlight<K, T, E> {
    in_flight: Mutex<InFlightMap<K, T, E>>,
}

impl<K, T, E> Default for SingleFlight<K, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> fmt::Debug for SingleFlight<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

impl<K, T, E> SingleFlight<K, T, E> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a registered fetch
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Joins the live fetch for `key`, or starts `fetch` as the new one.
    ///
    /// `fetch` is dropped unpolled when another fetch is joined.
    pub fn join_or_start(
        self: &Arc<Self>,
        key: K,
        fetch: BoxFuture<'static, Result<T, E>>,
    ) -> SharedFetch<T, E> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(&key).and_then(WeakShared::upgrade) {
            tracing::debug!(key = ?key, "Joining in-flight fetch");
            return existing;
        }

        // fetches abandoned by every caller never reach `finish`
        in_flight.retain(|_, weak| weak.upgrade().is_some());

        let this = Arc::clone(self);
        let owned_key = key.clone();
        let shared = async move {
            let result = fetch.await;
            this.finish(&owned_key);
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            in_flight.insert(key, weak);
        }

        shared
    }

    fn finish(&self, key: &K) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
