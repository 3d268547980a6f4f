//! Deduplicating two-lane request scheduler.
//!
//! # Lifecycle of a request
//!
//! ```text
//! add_request ──► Delayed ──(timer / re-request)──► Queued ──(slot free)──► Running
//!                    │                                 │                       │
//!                    └──────────── cancel ─────────────┴───────────────────────┤
//!                                                                              ▼
//!                                                              settled + removed
//! ```
//!
//! Every slot-changing event (completion, cancellation, admission, promotion)
//! runs the dispatch loop. Bookkeeping happens under one mutex; actions are
//! spawned as Tokio tasks after the lock is released.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::SchedulerConfig;
use super::error::{BoxError, RequestError, DEFAULT_CANCEL_REASON};
use super::handle::{next_request_id, RequestContext, RequestHandle, SettleSender};
use super::lanes::{Lane, LaneQueues};
use crate::config::ConfigError;

type BoxedAction<K, V> =
    Box<dyn FnOnce(RequestContext<K>) -> BoxFuture<'static, Result<V, BoxError>> + Send>;

/// Where a tracked request currently is.
enum Phase {
    /// Held off the lanes until its timer fires.
    Delayed(JoinHandle<()>),
    /// Waiting in a lane.
    Queued,
    /// Action executing.
    Running,
}

struct Entry<K, V> {
    id: u64,
    lane: Lane,
    phase: Phase,
    handle: RequestHandle<V>,
    settle: SettleSender<V>,
    token: CancellationToken,
    action: Option<BoxedAction<K, V>>,
}

/// An action ready to be spawned once the lock is released.
struct Launch<K, V> {
    key: K,
    id: u64,
    action: BoxedAction<K, V>,
    ctx: RequestContext<K>,
}

/// Point-in-time counts of scheduler state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Requests waiting in the regular lane.
    pub queued_regular: usize,
    /// Requests waiting in the low-priority lane.
    pub queued_low_priority: usize,
    /// Regular requests whose action is executing.
    pub running_regular: usize,
    /// Low-priority requests whose action is executing.
    pub running_low_priority: usize,
    /// Requests held back by an admission delay.
    pub delayed: usize,
}

impl SchedulerStats {
    /// Total number of tracked requests.
    pub fn tracked(&self) -> usize {
        self.queued_regular
            + self.queued_low_priority
            + self.running_regular
            + self.running_low_priority
            + self.delayed
    }
}

struct State<K, V> {
    config: SchedulerConfig,
    entries: HashMap<K, Entry<K, V>>,
    lanes: LaneQueues<K>,
    running_regular: usize,
    running_low: usize,
}

impl<K, V> State<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            lanes: LaneQueues::new(),
            running_regular: 0,
            running_low: 0,
        }
    }

    fn running(&self) -> usize {
        self.running_regular + self.running_low
    }

    fn release_slot(&mut self, lane: Lane) {
        match lane {
            Lane::Regular => self.running_regular = self.running_regular.saturating_sub(1),
            Lane::LowPriority => self.running_low = self.running_low.saturating_sub(1),
        }
    }

    /// Applies a repeated `add_request` for a tracked key.
    ///
    /// A regular re-request promotes low-priority work; any re-request
    /// consumes a pending delay.
    fn rerequest(&mut self, key: &K, lane: Lane) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };

        if lane == Lane::Regular && entry.lane == Lane::LowPriority {
            entry.lane = Lane::Regular;
            match entry.phase {
                Phase::Queued => {
                    self.lanes.promote(key);
                }
                Phase::Running => {
                    self.running_low = self.running_low.saturating_sub(1);
                    self.running_regular += 1;
                }
                Phase::Delayed(_) => {}
            }
            debug!(key = ?key, "Promoted low-priority request");
        }

        if let Phase::Delayed(timer) = &entry.phase {
            timer.abort();
            entry.phase = Phase::Queued;
            self.lanes.push(entry.lane, key.clone());
            debug!(key = ?key, "Delay consumed by re-request");
        }
    }

    /// Moves a delayed request onto its lane once its timer fires.
    fn admit_delayed(&mut self, key: &K, id: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.id == id && matches!(entry.phase, Phase::Delayed(_)) {
                entry.phase = Phase::Queued;
                self.lanes.push(entry.lane, key.clone());
                trace!(key = ?key, "Delay elapsed");
            }
        }
    }

    fn start(&mut self, key: K) -> Option<Launch<K, V>> {
        let entry = self.entries.get_mut(&key)?;
        let action = entry.action.take()?;
        entry.phase = Phase::Running;
        let lane = entry.lane;
        let id = entry.id;
        let ctx = RequestContext::new(key.clone(), entry.token.clone());
        match lane {
            Lane::Regular => self.running_regular += 1,
            Lane::LowPriority => self.running_low += 1,
        }
        Some(Launch {
            key,
            id,
            action,
            ctx,
        })
    }

    /// Starts as much queued work as the ceilings allow.
    fn dispatch(&mut self) -> Vec<Launch<K, V>> {
        let mut launches = Vec::new();

        while self.running() < self.config.max_active {
            let Some(key) = self.lanes.pop(Lane::Regular) else {
                break;
            };
            launches.extend(self.start(key));
        }

        if self.lanes.is_empty(Lane::Regular) {
            while self.running_low < self.config.max_low_priority_active
                && self.running() < self.config.max_active
            {
                let Some(key) = self.lanes.pop(Lane::LowPriority) else {
                    break;
                };
                launches.extend(self.start(key));
            }
        }

        launches
    }

    /// Settles a finished request, unless it was cancelled meanwhile.
    fn complete(&mut self, key: &K, id: u64, result: Result<V, RequestError>) -> bool {
        if self.entries.get(key).map(|e| e.id) != Some(id) {
            return false;
        }
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        if matches!(entry.phase, Phase::Running) {
            self.release_slot(entry.lane);
        }
        let _ = entry.settle.send(result);
        true
    }

    fn cancel(&mut self, key: &K, reason: &Arc<str>) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        match entry.phase {
            Phase::Delayed(timer) => timer.abort(),
            Phase::Queued => {
                self.lanes.remove(key);
            }
            Phase::Running => self.release_slot(entry.lane),
        }
        entry.token.cancel();
        let _ = entry
            .settle
            .send(Err(RequestError::cancelled(Arc::clone(reason))));
        true
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued_regular: self.lanes.len(Lane::Regular),
            queued_low_priority: self.lanes.len(Lane::LowPriority),
            running_regular: self.running_regular,
            running_low_priority: self.running_low,
            delayed: self
                .entries
                .values()
                .filter(|e| matches!(e.phase, Phase::Delayed(_)))
                .count(),
        }
    }
}

struct Inner<K, V> {
    state: Mutex<State<K, V>>,
}

/// Concurrency-bounded, deduplicating async request queue.
///
/// Requests are identified by key; at most one live request exists per key
/// and repeated requests share its [`RequestHandle`]. Two FIFO lanes feed a
/// single dispatch loop:
///
/// - Regular work starts while fewer than `max_active` actions run
/// - Low-priority work starts only when the regular lane is empty, while fewer
///   than `max_low_priority_active` low-priority actions run
///
/// The scheduler is a cheap handle; clones share the same queues. It must be
/// used from within a Tokio runtime because actions and delay timers are
/// spawned as tasks.
///
/// # Example
///
/// ```ignore
/// let scheduler = RequestScheduler::new(SchedulerConfig::default())?;
/// let handle = scheduler.add_request(
///     "t0/c1/l2/0.3.1",
///     |ctx| async move { fetch_chunk(ctx).await },
///     false,
///     Duration::ZERO,
/// );
/// let bytes = handle.await?;
/// ```
pub struct RequestScheduler<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for RequestScheduler<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> RequestScheduler<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a scheduler with the given ceilings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `max_active` is zero or the
    /// low-priority ceiling exceeds it.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(config)),
            }),
        })
    }

    /// The ceilings this scheduler was created with.
    pub fn config(&self) -> SchedulerConfig {
        self.inner.state.lock().config.clone()
    }

    /// Registers a request, or joins the live request for `key`.
    ///
    /// If `key` is already tracked the existing handle is returned and
    /// `action` is dropped without being called. A regular re-request
    /// promotes a low-priority request, and any re-request of a delayed
    /// request enqueues it immediately.
    ///
    /// With a non-zero `delay` a new request is held off the lanes until the
    /// delay elapses.
    pub fn add_request<F, Fut, E>(
        &self,
        key: K,
        action: F,
        low_priority: bool,
        delay: Duration,
    ) -> RequestHandle<V>
    where
        F: FnOnce(RequestContext<K>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let lane = Lane::from_low_priority(low_priority);
        let mut state = self.inner.state.lock();

        let handle = match state.entries.get(&key) {
            Some(entry) => {
                let handle = entry.handle.clone();
                trace!(key = ?key, "Joined in-flight request");
                state.rerequest(&key, lane);
                handle
            }
            None => {
                let id = next_request_id();
                let (handle, settle) = RequestHandle::channel(id);
                let action: BoxedAction<K, V> = Box::new(move |ctx| {
                    async move { action(ctx).await.map_err(Into::into) }.boxed()
                });

                let phase = if delay.is_zero() {
                    state.lanes.push(lane, key.clone());
                    Phase::Queued
                } else {
                    Phase::Delayed(self.arm_delay(key.clone(), id, delay))
                };

                debug!(key = ?key, lane = ?lane, ?delay, "Request added");
                state.entries.insert(
                    key,
                    Entry {
                        id,
                        lane,
                        phase,
                        handle: handle.clone(),
                        settle,
                        token: CancellationToken::new(),
                        action: Some(action),
                    },
                );
                handle
            }
        };

        let launches = state.dispatch();
        drop(state);
        self.launch(launches);
        handle
    }

    /// Registers a batch of requests with one uniform lane and delay.
    ///
    /// Handles are returned in the order of `items`.
    pub fn add_requests<I, F, Fut, E>(
        &self,
        items: I,
        low_priority: bool,
        delay: Duration,
    ) -> Vec<RequestHandle<V>>
    where
        I: IntoIterator<Item = (K, F)>,
        F: FnOnce(RequestContext<K>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        items
            .into_iter()
            .map(|(key, action)| self.add_request(key, action, low_priority, delay))
            .collect()
    }

    /// Cancels a tracked request.
    ///
    /// Its handle settles with `RequestError::Cancelled` carrying `reason`
    /// (or [`DEFAULT_CANCEL_REASON`]). A running action is not aborted; its
    /// token is cancelled and its eventual result discarded. No-op if the key
    /// is not tracked.
    pub fn cancel_request(&self, key: &K, reason: Option<&str>) {
        let reason: Arc<str> = Arc::from(reason.unwrap_or(DEFAULT_CANCEL_REASON));
        let mut state = self.inner.state.lock();
        if !state.cancel(key, &reason) {
            return;
        }
        debug!(key = ?key, reason = %reason, "Request cancelled");
        let launches = state.dispatch();
        drop(state);
        self.launch(launches);
    }

    /// Cancels every tracked request with the same reason.
    pub fn cancel_all_requests(&self, reason: Option<&str>) {
        let reason: Arc<str> = Arc::from(reason.unwrap_or(DEFAULT_CANCEL_REASON));
        let mut state = self.inner.state.lock();
        let keys: Vec<K> = state.entries.keys().cloned().collect();
        for key in &keys {
            state.cancel(key, &reason);
        }
        state.lanes.clear();
        if !keys.is_empty() {
            debug!(count = keys.len(), reason = %reason, "All requests cancelled");
        }
    }

    /// Returns true while `key` is delayed, queued or running.
    pub fn has_request(&self, key: &K) -> bool {
        self.inner.state.lock().entries.contains_key(key)
    }

    /// Returns true only while the action for `key` is executing.
    pub fn request_running(&self, key: &K) -> bool {
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| matches!(e.phase, Phase::Running))
    }

    /// Current queue and running counts.
    pub fn stats(&self) -> SchedulerStats {
        self.inner.state.lock().stats()
    }

    fn arm_delay(&self, key: K, id: u64, delay: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = scheduler.inner.state.lock();
            state.admit_delayed(&key, id);
            let launches = state.dispatch();
            drop(state);
            scheduler.launch(launches);
        })
    }

    fn launch(&self, launches: Vec<Launch<K, V>>) {
        for Launch {
            key,
            id,
            action,
            ctx,
        } in launches
        {
            let scheduler = self.clone();
            trace!(key = ?key, "Starting request");
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(async move { action(ctx).await })
                    .catch_unwind()
                    .await;
                let result = match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(RequestError::failed(e)),
                    Err(_) => {
                        warn!(key = ?key, "Request action panicked");
                        Err(RequestError::failed("request action panicked"))
                    }
                };
                scheduler.finish(key, id, result);
            });
        }
    }

    fn finish(&self, key: K, id: u64, result: Result<V, RequestError>) {
        let mut state = self.inner.state.lock();
        let failed = result.is_err();
        if state.complete(&key, id, result) {
            if failed {
                debug!(key = ?key, "Request failed");
            } else {
                trace!(key = ?key, "Request completed");
            }
        } else {
            trace!(key = ?key, "Discarding result of cancelled request");
        }
        let launches = state.dispatch();
        drop(state);
        self.launch(launches);
    }
}

impl<K, V> std::fmt::Debug for RequestScheduler<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::Notify;

    type Scheduler = RequestScheduler<&'static str, u32>;

    fn scheduler(max_active: usize, max_low: usize) -> Scheduler {
        RequestScheduler::new(SchedulerConfig::new(max_active, max_low)).unwrap()
    }

    /// Action that waits for `gate` before resolving to `value`.
    fn gated(
        gate: Arc<Notify>,
        value: u32,
    ) -> impl FnOnce(RequestContext<&'static str>) -> BoxFuture<'static, Result<u32, BoxError>> {
        move |_ctx| {
            async move {
                gate.notified().await;
                Ok(value)
            }
            .boxed()
        }
    }

    /// Action that records its key into `order` when it finishes.
    fn recording(
        order: Arc<Mutex<Vec<&'static str>>>,
        sleep_ms: u64,
        fail: bool,
    ) -> impl FnOnce(RequestContext<&'static str>) -> BoxFuture<'static, Result<u32, BoxError>> {
        move |ctx| {
            async move {
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                order.lock().push(*ctx.key());
                if fail {
                    Err(BoxError::from("simulated failure"))
                } else {
                    Ok(1)
                }
            }
            .boxed()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Scheduler::new(SchedulerConfig::new(1, 2));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_key_shares_handle_and_runs_once() {
        let scheduler = scheduler(4, 2);
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let make_action = |calls: Arc<AtomicUsize>, gate: Arc<Notify>| {
            move |_ctx: RequestContext<&'static str>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok::<_, BoxError>(42)
            }
        };

        let first = scheduler.add_request(
            "a",
            make_action(calls.clone(), gate.clone()),
            false,
            Duration::ZERO,
        );
        let second = scheduler.add_request(
            "a",
            make_action(calls.clone(), gate.clone()),
            false,
            Duration::ZERO,
        );
        assert!(first.same_request(&second));

        gate.notify_one();
        assert_eq!(first.await.unwrap(), 42);
        assert_eq!(second.await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.has_request(&"a"));
    }

    #[tokio::test]
    async fn test_single_slot_runs_in_submission_order_despite_failures() {
        let scheduler = scheduler(1, 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let keys = ["r0", "r1", "r2", "r3", "r4"];
        let per_task = 20;
        let start = Instant::now();

        let handles: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                scheduler.add_request(
                    *key,
                    recording(order.clone(), per_task, i % 2 == 1),
                    false,
                    Duration::ZERO,
                )
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let elapsed = start.elapsed();

        assert_eq!(*order.lock(), keys.to_vec());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.is_err(), i % 2 == 1);
        }
        assert!(elapsed >= Duration::from_millis(per_task * keys.len() as u64));
    }

    #[tokio::test]
    async fn test_cancel_before_start_rejects_with_reason() {
        let scheduler = scheduler(1, 1);
        let gate = Arc::new(Notify::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = scheduler.add_request("a", gated(gate.clone(), 1), false, Duration::ZERO);
        let ran_clone = ran.clone();
        let queued = scheduler.add_request(
            "b",
            move |_ctx| async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(2)
            },
            false,
            Duration::ZERO,
        );
        assert!(scheduler.has_request(&"b"));
        assert!(!scheduler.request_running(&"b"));

        scheduler.cancel_request(&"b", Some("viewer moved"));
        assert!(!scheduler.has_request(&"b"));

        let err = queued.await.unwrap_err();
        assert_eq!(err.cancel_reason(), Some("viewer moved"));

        gate.notify_one();
        assert_eq!(blocker.await.unwrap(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_request_guard_skips_side_effect() {
        let scheduler = scheduler(2, 1);
        let gate = Arc::new(Notify::new());
        let committed = Arc::new(AtomicUsize::new(0));

        let gate_clone = gate.clone();
        let committed_clone = committed.clone();
        let handle = scheduler.add_request(
            "a",
            move |ctx| async move {
                gate_clone.notified().await;
                if !ctx.is_cancelled() {
                    committed_clone.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<_, BoxError>(5)
            },
            false,
            Duration::ZERO,
        );
        assert!(scheduler.request_running(&"a"));

        scheduler.cancel_request(&"a", None);
        assert!(!scheduler.has_request(&"a"));
        assert!(!scheduler.request_running(&"a"));
        let err = handle.await.unwrap_err();
        assert_eq!(err.cancel_reason(), Some(DEFAULT_CANCEL_REASON));

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(committed.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.stats().tracked(), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_frees_slot() {
        let scheduler = scheduler(1, 1);
        let gate = Arc::new(Notify::new());

        let _running = scheduler.add_request("a", gated(gate.clone(), 1), false, Duration::ZERO);
        let next = scheduler.add_request("b", |_ctx| async { Ok::<_, BoxError>(2) }, false, Duration::ZERO);
        assert!(!scheduler.request_running(&"b"));

        scheduler.cancel_request(&"a", None);
        assert_eq!(next.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_rejects_every_request_with_reason() {
        let scheduler = scheduler(1, 1);
        let gate = Arc::new(Notify::new());

        let handles = vec![
            scheduler.add_request("a", gated(gate.clone(), 1), false, Duration::ZERO),
            scheduler.add_request("b", gated(gate.clone(), 2), true, Duration::ZERO),
            scheduler.add_request("c", gated(gate.clone(), 3), false, Duration::from_secs(5)),
        ];

        scheduler.cancel_all_requests(Some("volume closed"));
        assert_eq!(scheduler.stats().tracked(), 0);

        for handle in handles {
            let err = handle.await.unwrap_err();
            assert_eq!(err.cancel_reason(), Some("volume closed"));
        }
    }

    #[tokio::test]
    async fn test_cancel_untracked_is_noop() {
        let scheduler = scheduler(1, 1);
        scheduler.cancel_request(&"missing", Some("nothing"));
        assert_eq!(scheduler.stats(), SchedulerStats::default());
    }

    #[tokio::test]
    async fn test_regular_work_precedes_earlier_low_priority() {
        let scheduler = scheduler(1, 1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let a = scheduler.add_request("A", recording(order.clone(), 10, false), false, Duration::ZERO);
        let b = scheduler.add_request("B", recording(order.clone(), 10, false), true, Duration::ZERO);
        let c = scheduler.add_request("C", recording(order.clone(), 10, false), false, Duration::ZERO);

        let _ = futures::join!(a, b, c);
        assert_eq!(*order.lock(), vec!["A", "C", "B"]);
    }

    #[tokio::test]
    async fn test_low_priority_ceiling() {
        let scheduler = scheduler(3, 1);
        let gate = Arc::new(Notify::new());

        let _l1 = scheduler.add_request("l1", gated(gate.clone(), 1), true, Duration::ZERO);
        let _l2 = scheduler.add_request("l2", gated(gate.clone(), 2), true, Duration::ZERO);

        assert!(scheduler.request_running(&"l1"));
        assert!(!scheduler.request_running(&"l2"));
        let stats = scheduler.stats();
        assert_eq!(stats.running_low_priority, 1);
        assert_eq!(stats.queued_low_priority, 1);
    }

    #[tokio::test]
    async fn test_regular_rerequest_promotes_queued_low_priority() {
        let scheduler = scheduler(2, 1);
        let gate = Arc::new(Notify::new());

        let _l1 = scheduler.add_request("l1", gated(gate.clone(), 1), true, Duration::ZERO);
        let l2 = scheduler.add_request("l2", gated(gate.clone(), 2), true, Duration::ZERO);
        assert!(!scheduler.request_running(&"l2"));

        let promoted = scheduler.add_request("l2", gated(gate.clone(), 99), false, Duration::ZERO);
        assert!(promoted.same_request(&l2));
        assert!(scheduler.request_running(&"l2"));

        let stats = scheduler.stats();
        assert_eq!(stats.running_regular, 1);
        assert_eq!(stats.running_low_priority, 1);
        assert_eq!(stats.queued_low_priority, 0);
    }

    #[tokio::test]
    async fn test_regular_rerequest_reaccounts_running_low_priority() {
        let scheduler = scheduler(2, 1);
        let gate = Arc::new(Notify::new());

        let _l1 = scheduler.add_request("l1", gated(gate.clone(), 1), true, Duration::ZERO);
        assert_eq!(scheduler.stats().running_low_priority, 1);

        let _same = scheduler.add_request("l1", gated(gate.clone(), 1), false, Duration::ZERO);
        let stats = scheduler.stats();
        assert_eq!(stats.running_low_priority, 0);
        assert_eq!(stats.running_regular, 1);

        // The low-priority slot is free again.
        let _l2 = scheduler.add_request("l2", gated(gate.clone(), 2), true, Duration::ZERO);
        assert!(scheduler.request_running(&"l2"));
    }

    #[tokio::test]
    async fn test_delayed_request_waits_for_timer() {
        let scheduler = scheduler(2, 1);
        let handle = scheduler.add_request(
            "a",
            |_ctx| async { Ok::<_, BoxError>(1) },
            false,
            Duration::from_millis(50),
        );

        assert!(scheduler.has_request(&"a"));
        assert!(!scheduler.request_running(&"a"));
        assert_eq!(scheduler.stats().delayed, 1);

        let start = Instant::now();
        assert_eq!(handle.await.unwrap(), 1);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_rerequest_consumes_delay() {
        let scheduler = scheduler(2, 1);
        let start = Instant::now();

        let delayed = scheduler.add_request(
            "b",
            |_ctx| async { Ok::<_, BoxError>(7) },
            false,
            Duration::from_millis(1000),
        );
        let again = scheduler.add_request(
            "b",
            |_ctx| async { Ok::<_, BoxError>(8) },
            false,
            Duration::from_millis(1000),
        );
        assert!(delayed.same_request(&again));

        let value = tokio::time::timeout(Duration::from_millis(500), delayed)
            .await
            .expect("re-request should skip the remaining delay")
            .unwrap();
        assert_eq!(value, 7);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_unbounded_delay_holds_until_rerequested() {
        let scheduler = scheduler(2, 1);

        let delayed = scheduler.add_request(
            "far",
            |_ctx| async { Ok::<_, BoxError>(1) },
            false,
            Duration::MAX,
        );
        assert_eq!(scheduler.stats().delayed, 1);
        assert!(!scheduler.request_running(&"far"));

        scheduler.add_request(
            "far",
            |_ctx| async { Ok::<_, BoxError>(2) },
            false,
            Duration::ZERO,
        );
        assert_eq!(delayed.await.unwrap(), 1);
        assert_eq!(scheduler.stats().tracked(), 0);
    }

    #[tokio::test]
    async fn test_add_requests_uniform_delay() {
        let scheduler = scheduler(4, 2);
        let items = ["x", "y", "z"].map(|key| {
            (key, move |ctx: RequestContext<&'static str>| async move {
                Ok::<_, BoxError>(ctx.key().len() as u32)
            })
        });

        let handles = scheduler.add_requests(items, false, Duration::from_millis(30));
        assert_eq!(handles.len(), 3);
        assert_eq!(scheduler.stats().delayed, 3);

        let start = Instant::now();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_queue() {
        let scheduler = scheduler(1, 1);
        let failing = scheduler.add_request(
            "bad",
            |_ctx| async { Err::<u32, _>(BoxError::from("fetch failed")) },
            false,
            Duration::ZERO,
        );
        let ok = scheduler.add_request("good", |_ctx| async { Ok::<_, BoxError>(3) }, false, Duration::ZERO);

        let err = failing.await.unwrap_err();
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("fetch failed"));
        assert_eq!(ok.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_panicking_action_becomes_failure() {
        let scheduler = scheduler(1, 1);
        let panicking = scheduler.add_request(
            "boom",
            |_ctx| async {
                if true {
                    panic!("decoder exploded");
                }
                Ok::<u32, BoxError>(0)
            },
            false,
            Duration::ZERO,
        );
        let next = scheduler.add_request("next", |_ctx| async { Ok::<_, BoxError>(1) }, false, Duration::ZERO);

        let err = panicking.await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
        assert_eq!(next.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_key_reusable_after_settle() {
        let scheduler = scheduler(1, 1);
        let first = scheduler.add_request("k", |_ctx| async { Ok::<_, BoxError>(1) }, false, Duration::ZERO);
        assert_eq!(first.clone().await.unwrap(), 1);

        let second = scheduler.add_request("k", |_ctx| async { Ok::<_, BoxError>(2) }, false, Duration::ZERO);
        assert!(!first.same_request(&second));
        assert_eq!(second.await.unwrap(), 2);
    }
}
