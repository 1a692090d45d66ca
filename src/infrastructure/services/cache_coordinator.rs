//! Cache coordinator - memoizes single-shot async producers
//!
//! [`CacheCoordinator::observe`] turns a key, a producer future and optional
//! [`CacheOptions`] into a stream of at most two values: a cached value read
//! from the configured [`StorageProvider`], and the fresh value produced by the
//! future. Which of the two are emitted, and whether the producer is polled at
//! all, follows the resolved [`CachePolicy`]:
//!
//! | entry           | policy                                  | emits          | producer |
//! |-----------------|-----------------------------------------|----------------|----------|
//! | none            | any                                     | fresh          | yes      |
//! | fresh           | `!emit_duplicates && !always_get_value` | cached         | no       |
//! | any other       | `always_get_value`                      | cached, fresh* | yes      |
//! | any other       | `!always_get_value`                     | fresh*         | yes      |
//!
//! `*` the fresh value is suppressed when `emit_duplicates` is false and it
//! equals the cached one.
//!
//! Every successful producer completion overwrites the entry. Producer
//! failures are passed through as the stream's only error and never reach
//! the storage.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::domain::cache::{CacheEntry, CacheOptions, CachePolicy, StorageProvider};
use crate::infrastructure::cache::InMemoryStorage;

use super::single_flight::SingleFlight;

/// Stream returned by [`CacheCoordinator::observe`]
pub type ObserveStream<T, E> = BoxStream<'static, Result<T, E>>;

type ProducerFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Storage identity and key; calls share a fetch only when both match
type FlightKey = (usize, String);

type JoinFetch<T, E> =
    Arc<dyn Fn(FlightKey, ProducerFuture<T, E>) -> ProducerFuture<T, E> + Send + Sync>;

/// Decides what to emit from cache, when to poll the producer, and when to
/// update the storage
///
/// The producer error `E` is passed through untouched and only has to be
/// `Clone` when single-flight is enabled.
pub struct CacheCoordinator<T, E>
where
    T: Send + Sync + 'static,
{
    storage: Arc<dyn StorageProvider<T>>,
    single_flight: Option<JoinFetch<T, E>>,
}

impl<T, E> fmt::Debug for CacheCoordinator<T, E>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("storage", &self.storage)
            .field("single_flight", &self.single_flight.is_some())
            .finish()
    }
}

impl<T, E> Default for CacheCoordinator<T, E>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new(InMemoryStorage::<T>::shared())
    }
}

impl<T, E> CacheCoordinator<T, E>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Shares one producer invocation and one storage write between
    /// concurrent `observe` calls for the same key and storage
    pub fn with_single_flight(mut self) -> Self {
        let flights = Arc::new(SingleFlight::<FlightKey, T, E>::new());
        self.single_flight = Some(Arc::new(
            move |key: FlightKey, fetch: ProducerFuture<T, E>| {
                flights.join_or_start(key, fetch).boxed()
            },
        ));
        self
    }
}

impl<T, E> CacheCoordinator<T, E>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    E: Send + 'static,
{
    /// Creates a coordinator over the given storage
    pub fn new(storage: Arc<dyn StorageProvider<T>>) -> Self {
        Self {
            storage,
            single_flight: None,
        }
    }

    pub fn is_single_flight(&self) -> bool {
        self.single_flight.is_some()
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider<T>> {
        &self.storage
    }

    /// Observes `key` using the coordinator's storage.
    ///
    /// The stream is lazy: storage is read and the producer polled only once
    /// the stream is polled. Dropping the stream drops the producer.
    pub fn observe<F>(
        &self,
        key: impl Into<String>,
        producer: F,
        options: Option<&CacheOptions>,
    ) -> ObserveStream<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.observe_with(key, producer, options, self.storage.clone())
    }

    /// Observes `key` against a specific storage for this call only
    pub fn observe_with<F>(
        &self,
        key: impl Into<String>,
        producer: F,
        options: Option<&CacheOptions>,
        storage: Arc<dyn StorageProvider<T>>,
    ) -> ObserveStream<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let call = Call {
            key: key.into(),
            policy: CachePolicy::resolve(options),
            storage,
            single_flight: self.single_flight.clone(),
        };

        let start = Step::Lookup {
            call,
            producer: producer.boxed(),
        };

        stream::unfold(start, Step::advance).boxed()
    }
}

/// Everything one `observe` call needs after it has been created
struct Call<T, E>
where
    T: Send + Sync + 'static,
{
    key: String,
    policy: CachePolicy,
    storage: Arc<dyn StorageProvider<T>>,
    single_flight: Option<JoinFetch<T, E>>,
}

impl<T, E> Call<T, E>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    E: Send + 'static,
{
    /// A failing read counts as a miss so the producer still runs
    async fn read_entry(&self) -> Option<CacheEntry<T>> {
        match self.storage.read(&self.key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    fn flight_key(&self) -> FlightKey {
        let storage = Arc::as_ptr(&self.storage) as *const () as usize;
        (storage, self.key.clone())
    }

    /// Runs the producer and stores its value, once per call or once per
    /// in-flight key and storage when single-flight is enabled
    async fn produce(&self, producer: ProducerFuture<T, E>) -> Result<T, E> {
        let storage = self.storage.clone();
        let key = self.key.clone();

        let fetch = async move {
            let value = producer.await?;
            store(storage.as_ref(), &key, value.clone()).await;
            Ok::<T, E>(value)
        }
        .boxed();

        match &self.single_flight {
            Some(join) => join(self.flight_key(), fetch).await,
            None => fetch.await,
        }
    }
}

async fn store<T>(storage: &dyn StorageProvider<T>, key: &str, value: T)
where
    T: Send + Sync + 'static,
{
    if let Err(e) = storage.write(key, CacheEntry::new(value)).await {
        warn!(key = %key, error = %e, "Cache write failed, value emitted uncached");
    }
}

enum Step<T, E>
where
    T: Send + Sync + 'static,
{
    /// Storage not read yet
    Lookup {
        call: Call<T, E>,
        producer: ProducerFuture<T, E>,
    },
    /// Waiting on the producer; `previous` is the entry value read in `Lookup`
    Fetch {
        call: Call<T, E>,
        previous: Option<T>,
        producer: ProducerFuture<T, E>,
    },
    Done,
}

impl<T, E> Step<T, E>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    E: Send + 'static,
{
    async fn advance(self) -> Option<(Result<T, E>, Step<T, E>)> {
        match self {
            Step::Lookup { call, producer } => {
                let Some(entry) = call.read_entry().await else {
                    debug!(key = %call.key, "Cache miss");
                    return Self::fetch(call, None, producer).await;
                };

                if call.policy.serves_from_cache(&entry) {
                    debug!(key = %call.key, "Cache hit, producer skipped");
                    return Some((Ok(entry.into_value()), Step::Done));
                }

                if call.policy.always_get_value {
                    debug!(key = %call.key, "Emitting cached value before refresh");
                    return Some(Self::provisional(call, entry.into_value(), producer));
                }

                debug!(key = %call.key, "Cached value not served, fetching");
                Self::fetch(call, Some(entry.into_value()), producer).await
            }
            Step::Fetch {
                call,
                previous,
                producer,
            } => Self::fetch(call, previous, producer).await,
            Step::Done => None,
        }
    }

    fn provisional(
        call: Call<T, E>,
        value: T,
        producer: ProducerFuture<T, E>,
    ) -> (Result<T, E>, Step<T, E>) {
        let next = Step::Fetch {
            call,
            previous: Some(value.clone()),
            producer,
        };
        (Ok(value), next)
    }

    async fn fetch(
        call: Call<T, E>,
        previous: Option<T>,
        producer: ProducerFuture<T, E>,
    ) -> Option<(Result<T, E>, Step<T, E>)> {
        let value = match call.produce(producer).await {
            Ok(value) => value,
            Err(e) => return Some((Err(e), Step::Done)),
        };

        if !call.policy.emit_duplicates && previous.as_ref() == Some(&value) {
            debug!(key = %call.key, "Fresh value unchanged, suppressed");
            return None;
        }

        Some((Ok(value), Step::Done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::domain::cache::{CacheStrategy, MockStorage};
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_pending, task};

    type Coordinator = CacheCoordinator<Value, DomainError>;
    type Emissions = Vec<Result<Value, DomainError>>;

    /// Producer that counts how many times it was polled to completion
    #[derive(Debug, Clone, Default)]
    struct Producer {
        calls: Arc<AtomicUsize>,
    }

    impl Producer {
        fn value(&self, value: Value) -> ProducerFuture<Value, DomainError> {
            self.delayed(value, Duration::ZERO)
        }

        fn failing(&self, message: &str) -> ProducerFuture<Value, DomainError> {
            let calls = self.calls.clone();
            let message = message.to_string();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::producer("http", message))
            }
            .boxed()
        }

        fn delayed(&self, value: Value, delay: Duration) -> ProducerFuture<Value, DomainError> {
            let calls = self.calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(value)
            }
            .boxed()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn storage_with(entry: CacheEntry<Value>) -> Arc<MockStorage<Value>> {
        Arc::new(MockStorage::new().with_entry("k", entry))
    }

    fn empty_storage() -> Arc<MockStorage<Value>> {
        Arc::new(MockStorage::new())
    }

    fn stale(value: Value) -> CacheEntry<Value> {
        CacheEntry::with_created_at(value, Utc::now() - chrono::Duration::seconds(10))
    }

    fn five_seconds() -> CacheOptions {
        CacheOptions::new().with_expires_ms(5000)
    }

    async fn collect(stream: ObserveStream<Value, DomainError>) -> Emissions {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_producer() {
        let storage = storage_with(CacheEntry::new(json!({"x": 1})));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let options = five_seconds().with_emit_duplicates(false);
        let stream = coordinator.observe("k", producer.value(json!({"x": 2})), Some(&options));

        assert_eq!(collect(stream).await, vec![Ok(json!({"x": 1}))]);
        assert_eq!(producer.calls(), 0);
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_cold_key_invokes_producer_once() {
        let storage = empty_storage();
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let before = Utc::now();
        let stream = coordinator.observe("k", producer.value(json!({"x": 1})), None);

        assert_eq!(collect(stream).await, vec![Ok(json!({"x": 1}))]);
        assert_eq!(producer.calls(), 1);
        assert_eq!(storage.write_count(), 1);

        let entry = storage.entry("k").unwrap();
        assert_eq!(entry.value, json!({"x": 1}));
        assert!(entry.created_at >= before);
    }

    #[tokio::test]
    async fn test_stale_entry_with_always_get_value_emits_both() {
        let storage = storage_with(stale(json!({"x": 1})));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let options = five_seconds().with_always_get_value(true);
        let stream = coordinator.observe("k", producer.value(json!({"x": 1})), Some(&options));

        // only the second emission is subject to duplicate suppression
        assert_eq!(collect(stream).await, vec![Ok(json!({"x": 1}))]);

        let options = options.with_emit_duplicates(true);
        let stream = coordinator.observe("k", producer.value(json!({"x": 1})), Some(&options));

        assert_eq!(
            collect(stream).await,
            vec![Ok(json!({"x": 1})), Ok(json!({"x": 1}))]
        );
    }

    #[tokio::test]
    async fn test_stale_entry_with_always_get_value_emits_changed_value() {
        let storage = storage_with(stale(json!({"x": 1})));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let options = five_seconds().with_always_get_value(true);
        let stream = coordinator.observe("k", producer.value(json!({"x": 2})), Some(&options));

        assert_eq!(
            collect(stream).await,
            vec![Ok(json!({"x": 1})), Ok(json!({"x": 2}))]
        );
        assert_eq!(storage.entry("k").unwrap().value, json!({"x": 2}));
    }

    #[tokio::test]
    async fn test_duplicate_suppressed_but_storage_refreshed() {
        let old = stale(json!({"nested": {"a": [1, 2, 3]}, "b": "c"}));
        let old_created_at = old.created_at;
        let storage = storage_with(old);
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        // structurally equal, keys in a different order
        let fresh = json!({"b": "c", "nested": {"a": [1, 2, 3]}});
        let options = five_seconds();
        let stream = coordinator.observe("k", producer.value(fresh), Some(&options));

        assert!(collect(stream).await.is_empty());
        assert_eq!(producer.calls(), 1);
        assert_eq!(storage.write_count(), 1);
        assert!(storage.entry("k").unwrap().created_at > old_created_at);
    }

    #[tokio::test]
    async fn test_fresh_strategy_suppresses_unchanged_refresh() {
        let storage = storage_with(CacheEntry::new(json!("joke")));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let options = CacheStrategy::Fresh.options();
        let stream = coordinator.observe("k", producer.value(json!("joke")), Some(&options));

        assert_eq!(collect(stream).await, vec![Ok(json!("joke"))]);
        assert_eq!(producer.calls(), 1);
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn test_producer_failure_is_not_cached() {
        let storage = empty_storage();
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let stream = coordinator.observe("k", producer.failing("503"), None);

        assert_eq!(
            collect(stream).await,
            vec![Err(DomainError::producer("http", "503"))]
        );
        assert_eq!(storage.write_count(), 0);
        assert!(storage.entry("k").is_none());

        let stream = coordinator.observe("k", producer.value(json!(1)), None);

        assert_eq!(collect(stream).await, vec![Ok(json!(1))]);
        assert_eq!(producer.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_after_provisional_emission() {
        let storage = storage_with(stale(json!(1)));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let options = CacheStrategy::Fresh.options();
        let stream = coordinator.observe("k", producer.failing("timeout"), Some(&options));

        assert_eq!(
            collect(stream).await,
            vec![Ok(json!(1)), Err(DomainError::producer("http", "timeout"))]
        );
        assert_eq!(storage.entry("k").unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_without_options_duplicates_are_emitted() {
        let storage = storage_with(CacheEntry::new(json!(1)));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let stream = coordinator.observe("k", producer.value(json!(1)), None);

        assert_eq!(collect(stream).await, vec![Ok(json!(1))]);
        assert_eq!(producer.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_is_not_served_without_always_get_value() {
        let coordinator = Coordinator::new(storage_with(stale(json!(1))));
        let producer = Producer::default();

        let options = five_seconds();
        let stream = coordinator.observe("k", producer.value(json!(2)), Some(&options));

        assert_eq!(collect(stream).await, vec![Ok(json!(2))]);
    }

    #[tokio::test]
    async fn test_scenario_cached_then_served_from_cache() {
        let coordinator = Coordinator::new(Arc::new(InMemoryStorage::<Value>::new()));
        let producer_a = Producer::default();
        let producer_b = Producer::default();

        let stream = coordinator.observe("k", producer_a.value(json!({"x": 1})), None);
        assert_eq!(collect(stream).await, vec![Ok(json!({"x": 1}))]);

        let options = five_seconds().with_emit_duplicates(false);
        let stream = coordinator.observe("k", producer_b.value(json!({"x": 1})), Some(&options));

        assert_eq!(collect(stream).await, vec![Ok(json!({"x": 1}))]);
        assert_eq!(producer_a.calls(), 1);
        assert_eq!(producer_b.calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_cached_then_refreshed() {
        let coordinator = Coordinator::new(Arc::new(InMemoryStorage::<Value>::new()));
        let producer = Producer::default();

        collect(coordinator.observe("k", producer.value(json!({"x": 1})), None)).await;

        let options = CacheOptions::new()
            .with_always_get_value(true)
            .with_emit_duplicates(false);
        let stream = coordinator.observe("k", producer.value(json!({"x": 2})), Some(&options));

        assert_eq!(
            collect(stream).await,
            vec![Ok(json!({"x": 1})), Ok(json!({"x": 2}))]
        );
    }

    #[tokio::test]
    async fn test_read_failure_falls_back_to_producer() {
        let storage = Arc::new(MockStorage::<Value>::new().with_read_error("connection reset"));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let options = five_seconds();
        let stream = coordinator.observe("k", producer.value(json!(1)), Some(&options));

        assert_eq!(collect(stream).await, vec![Ok(json!(1))]);
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_still_emits() {
        let storage = Arc::new(MockStorage::<Value>::new().with_write_error("read only"));
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let stream = coordinator.observe("k", producer.value(json!(1)), None);

        assert_eq!(collect(stream).await, vec![Ok(json!(1))]);
        assert!(storage.entry("k").is_none());
    }

    #[tokio::test]
    async fn test_observe_with_overrides_storage() {
        let default_storage = empty_storage();
        let call_storage = empty_storage();
        let coordinator = Coordinator::new(default_storage.clone());
        let producer = Producer::default();

        let stream =
            coordinator.observe_with("k", producer.value(json!(1)), None, call_storage.clone());
        collect(stream).await;

        assert_eq!(default_storage.read_count(), 0);
        assert_eq!(call_storage.entry("k").unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let storage = empty_storage();
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();

        let stream = coordinator.observe("k", producer.value(json!(1)), None);
        drop(stream);

        assert_eq!(storage.read_count(), 0);
        assert_eq!(producer.calls(), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_producer() {
        struct DropFlag(Arc<AtomicBool>);

        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let producer = async move {
            let _guard = guard;
            futures::future::pending::<Result<Value, DomainError>>().await
        };

        let coordinator = Coordinator::new(empty_storage());
        let mut stream = coordinator.observe("k", producer, None);

        {
            let mut next = task::spawn(stream.next());
            assert_pending!(next.poll());
        }
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_single_flight_shares_producer_and_write() {
        let storage = empty_storage();
        let coordinator = Coordinator::new(storage.clone()).with_single_flight();
        let producer = Producer::default();
        let delay = Duration::from_millis(20);

        let first = coordinator.observe("k", producer.delayed(json!(1), delay), None);
        let second = coordinator.observe("k", producer.delayed(json!(2), delay), None);

        let (a, b) = futures::join!(collect(first), collect(second));

        assert_eq!(a, vec![Ok(json!(1))]);
        assert_eq!(b, vec![Ok(json!(1))]);
        assert_eq!(producer.calls(), 1);
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_writes_each_call_storage() {
        let default_storage = empty_storage();
        let call_storage = empty_storage();
        let coordinator = Coordinator::new(default_storage.clone()).with_single_flight();
        let producer = Producer::default();
        let delay = Duration::from_millis(20);

        let first = coordinator.observe("k", producer.delayed(json!(1), delay), None);
        let second = coordinator.observe_with(
            "k",
            producer.delayed(json!(2), delay),
            None,
            call_storage.clone(),
        );

        let (a, b) = futures::join!(collect(first), collect(second));

        assert_eq!(a, vec![Ok(json!(1))]);
        assert_eq!(b, vec![Ok(json!(2))]);
        assert_eq!(default_storage.entry("k").unwrap().value, json!(1));
        assert_eq!(call_storage.entry("k").unwrap().value, json!(2));
        assert_eq!(producer.calls(), 2);
    }

    #[tokio::test]
    async fn test_without_single_flight_both_producers_run() {
        let storage = empty_storage();
        let coordinator = Coordinator::new(storage.clone());
        let producer = Producer::default();
        let delay = Duration::from_millis(20);

        let first = coordinator.observe("k", producer.delayed(json!(1), delay), None);
        let second = coordinator.observe("k", producer.delayed(json!(2), delay), None);

        let (a, b) = futures::join!(collect(first), collect(second));

        assert_eq!(a, vec![Ok(json!(1))]);
        assert_eq!(b, vec![Ok(json!(2))]);
        assert_eq!(producer.calls(), 2);
        assert_eq!(storage.write_count(), 2);
    }

    #[tokio::test]
    async fn test_producer_error_need_not_be_clone() {
        #[derive(Debug, PartialEq)]
        struct Unavailable(u16);

        let storage = empty_storage();
        let coordinator = CacheCoordinator::<Value, Unavailable>::new(storage.clone());

        let stream = coordinator.observe("k", async { Err(Unavailable(503)) }, None);
        let emitted: Vec<_> = stream.collect().await;

        assert_eq!(emitted, vec![Err(Unavailable(503))]);
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn test_default_uses_shared_storage() {
        #[derive(Debug, Clone, PartialEq)]
        struct Joke(String);

        let first: CacheCoordinator<Joke, DomainError> = CacheCoordinator::default();
        let second: CacheCoordinator<Joke, DomainError> = CacheCoordinator::default();

        assert!(!first.is_single_flight());
        let first_ptr = Arc::as_ptr(first.storage()) as *const ();
        let second_ptr = Arc::as_ptr(second.storage()) as *const ();
        assert_eq!(first_ptr, second_ptr);
    }
}
