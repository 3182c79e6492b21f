//! Deferred and recurring work owned by plugins.
//!
//! The [`Scheduler`] keeps a min-heap of tasks keyed on absolute wall-clock
//! fire time. Each task belongs to exactly one plugin; a plugin's scope is
//! opened when it activates and closed when it deactivates, which cancels
//! everything it still has pending.
//!
//! Callbacks run through the same isolation boundary as command handlers, so a
//! failing task is logged and never stops the loop.
//!
//! ```rust,ignore
//! let token = ctx.scheduler().schedule_repeating(Duration::from_secs(60), move || {
//!     let outbox = outbox.clone();
//!     async move {
//!         outbox.send(&Target::Room("ops".into()), "still here").await?;
//!         Ok(())
//!     }
//! })?;
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::error::{ScheduleError, ScheduleResult};
use crate::executor::{Executor, isolate};

// ============================================================================
// Clock
// ============================================================================

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Sets the time, also backwards.
    pub fn set(&self, to: SystemTime) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Handle to a scheduled task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskToken(u64);

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

type Callback = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

struct Task {
    plugin: String,
    interval: Option<Duration>,
    fire_at: SystemTime,
    /// Heap entries carrying another sequence number are stale.
    seq: u64,
    callback: Callback,
}

/// A task taken off the heap, ready to run.
struct Due {
    token: TaskToken,
    plugin: String,
    callback: Callback,
}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Reverse<(SystemTime, u64, u64)>>,
    tasks: HashMap<u64, Task>,
    owners: HashSet<String>,
    next_id: u64,
    next_seq: u64,
}

impl State {
    fn push(&mut self, id: u64, fire_at: SystemTime) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((fire_at, seq, id)));
        seq
    }

    fn cancel_where(&mut self, mut pred: impl FnMut(&Task) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !pred(task));
        let cancelled = before - self.tasks.len();
        self.compact();
        cancelled
    }

    /// Rebuilds the heap once stale entries outnumber live ones.
    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.tasks.len() {
            return;
        }
        let tasks = &self.tasks;
        self.heap
            .retain(|Reverse((_, seq, id))| tasks.get(id).is_some_and(|t| t.seq == *seq));
    }

    /// Drops stale entries from the top of the heap.
    fn prune(&mut self) {
        while let Some(&Reverse((_, seq, id))) = self.heap.peek() {
            if self.tasks.get(&id).is_some_and(|task| task.seq == seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs one-shot and repeating callbacks for activated plugins.
pub struct Scheduler {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    executor: Executor,
    wake: Notify,
    tick: Duration,
}

impl Scheduler {
    pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

    pub fn new(clock: Arc<dyn Clock>, executor: Executor) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            executor,
            wake: Notify::new(),
            tick: Self::DEFAULT_TICK,
        }
    }

    /// Caps how long the loop sleeps between checks.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    // ------------------------------------------------------------------------
    // Owner scopes
    // ------------------------------------------------------------------------

    /// Allows `plugin` to own tasks.
    pub fn open(&self, plugin: &str) {
        self.state.lock().owners.insert(plugin.to_string());
    }

    /// Cancels every task of `plugin` and refuses new ones until reopened.
    pub fn close(&self, plugin: &str) -> usize {
        let mut state = self.state.lock();
        state.owners.remove(plugin);
        let cancelled = state.cancel_where(|t| t.plugin == plugin);
        if cancelled > 0 {
            debug!(plugin = %plugin, cancelled, "Scheduler scope closed");
        }
        cancelled
    }

    pub fn is_open(&self, plugin: &str) -> bool {
        self.state.lock().owners.contains(plugin)
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Runs `callback` once, `delay` from now.
    pub fn schedule_once<F, Fut>(
        &self,
        plugin: &str,
        delay: Duration,
        callback: F,
    ) -> ScheduleResult<TaskToken>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.insert(plugin, delay, None, boxed(callback))
    }

    /// Runs `callback` every `interval`, the first time one interval from now.
    pub fn schedule_repeating<F, Fut>(
        &self,
        plugin: &str,
        interval: Duration,
        callback: F,
    ) -> ScheduleResult<TaskToken>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        self.insert(plugin, interval, Some(interval), boxed(callback))
    }

    fn insert(
        &self,
        plugin: &str,
        delay: Duration,
        interval: Option<Duration>,
        callback: Callback,
    ) -> ScheduleResult<TaskToken> {
        let fire_at = self
            .clock
            .now()
            .checked_add(delay)
            .ok_or(ScheduleError::DelayTooLarge(delay))?;
        let mut state = self.state.lock();
        if !state.owners.contains(plugin) {
            return Err(ScheduleError::OwnerInactive(plugin.to_string()));
        }

        let id = state.next_id;
        state.next_id += 1;
        let seq = state.push(id, fire_at);
        state.tasks.insert(
            id,
            Task {
                plugin: plugin.to_string(),
                interval,
                fire_at,
                seq,
                callback,
            },
        );
        drop(state);

        self.wake.notify_one();
        debug!(plugin = %plugin, task = %TaskToken(id), ?delay, repeating = interval.is_some(), "Task scheduled");
        Ok(TaskToken(id))
    }

    /// Cancels a task. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self, token: TaskToken) -> bool {
        let mut state = self.state.lock();
        let removed = state.tasks.remove(&token.0).is_some();
        state.compact();
        removed
    }

    /// Cancels every task of `plugin`, keeping its scope open.
    pub fn cancel_plugin(&self, plugin: &str) -> usize {
        self.state.lock().cancel_where(|t| t.plugin == plugin)
    }

    pub(crate) fn owns(&self, plugin: &str, token: TaskToken) -> bool {
        self.state
            .lock()
            .tasks
            .get(&token.0)
            .is_some_and(|t| t.plugin == plugin)
    }

    /// Pending tasks of `plugin`.
    pub fn pending(&self, plugin: &str) -> usize {
        self.state
            .lock()
            .tasks
            .values()
            .filter(|t| t.plugin == plugin)
            .count()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    // Firing
    // ------------------------------------------------------------------------

    /// Pops every due task, rescheduling repeating ones.
    fn take_due(&self) -> Vec<Due> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let mut due = Vec::new();

        loop {
            state.prune();
            let Some(&Reverse((fire_at, _, id))) = state.heap.peek() else {
                break;
            };
            if fire_at > now {
                break;
            }
            state.heap.pop();

            let Some(task) = state.tasks.get(&id) else {
                continue;
            };
            let (interval, last) = (task.interval, task.fire_at);
            let plugin = task.plugin.clone();
            due.push(Due {
                token: TaskToken(id),
                plugin: plugin.clone(),
                callback: Arc::clone(&task.callback),
            });

            let next = interval.map(|interval| {
                last.checked_add(interval)
                    .filter(|next| *next > now)
                    .or_else(|| now.checked_add(interval))
            });
            match next {
                Some(Some(next)) => {
                    let seq = state.push(id, next);
                    if let Some(task) = state.tasks.get_mut(&id) {
                        task.fire_at = next;
                        task.seq = seq;
                    }
                }
                Some(None) => {
                    warn!(
                        plugin = %plugin,
                        task = %TaskToken(id),
                        "Next fire time overflows the clock, dropping repeating task"
                    );
                    state.tasks.remove(&id);
                }
                None => {
                    state.tasks.remove(&id);
                }
            }
        }

        due
    }

    /// Time until the earliest pending task, capped by the tick.
    fn next_wait(&self) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.prune();
        match state.heap.peek() {
            Some(Reverse((fire_at, _, _))) => fire_at
                .duration_since(now)
                .unwrap_or(Duration::ZERO)
                .min(self.tick),
            None => self.tick,
        }
    }

    /// Runs every due task to completion on the current task.
    ///
    /// Returns the number of tasks fired.
    pub async fn fire_due(&self) -> usize {
        let due = self.take_due();
        let count = due.len();
        join_all(due.into_iter().map(run_task)).await;
        count
    }

    /// Fires tasks until `shutdown` is cancelled.
    ///
    /// Due tasks are spawned on the worker pool, so a slow callback never
    /// delays the next one.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(tick = ?self.tick, "Scheduler started");
        loop {
            for due in self.take_due() {
                self.executor.spawn(run_task(due));
            }

            let wait = self.next_wait();
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
        info!("Scheduler stopped");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.len())
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

fn boxed<F, Fut>(callback: F) -> Callback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move || callback().boxed())
}

async fn run_task(due: Due) {
    let Due {
        token,
        plugin,
        callback,
    } = due;
    if let Err(e) = isolate(async move { callback().await }).await {
        warn!(plugin = %plugin, task = %token, error = %e, "Scheduled task failed");
    }
}

// ============================================================================
// PluginScheduler
// ============================================================================

/// A plugin's view of the scheduler: tasks are always owned by that plugin.
#[derive(Clone)]
pub struct PluginScheduler {
    scheduler: Arc<Scheduler>,
    plugin: String,
}

impl PluginScheduler {
    pub fn new(scheduler: Arc<Scheduler>, plugin: impl Into<String>) -> Self {
        Self {
            scheduler,
            plugin: plugin.into(),
        }
    }

    pub fn schedule_once<F, Fut>(&self, delay: Duration, callback: F) -> ScheduleResult<TaskToken>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.scheduler.schedule_once(&self.plugin, delay, callback)
    }

    pub fn schedule_repeating<F, Fut>(
        &self,
        interval: Duration,
        callback: F,
    ) -> ScheduleResult<TaskToken>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.scheduler
            .schedule_repeating(&self.plugin, interval, callback)
    }

    /// Cancels one of this plugin's tasks; other plugins' tokens are ignored.
    pub fn cancel(&self, token: TaskToken) -> bool {
        self.scheduler.owns(&self.plugin, token) && self.scheduler.cancel(token)
    }

    pub fn cancel_all(&self) -> usize {
        self.scheduler.cancel_plugin(&self.plugin)
    }

    pub fn pending(&self) -> usize {
        self.scheduler.pending(&self.plugin)
    }

    pub fn now(&self) -> SystemTime {
        self.scheduler.now()
    }
}

impl fmt::Debug for PluginScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginScheduler")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (Arc<Scheduler>, ManualClock) {
        let clock = ManualClock::default();
        let scheduler = Arc::new(Scheduler::new(Arc::new(clock.clone()), Executor::new(4)));
        scheduler.open("p");
        (scheduler, clock)
    }

    fn counter() -> (
        Arc<AtomicUsize>,
        impl Fn() -> BoxFuture<'static, Result<(), BoxError>> + Clone + Send + Sync + 'static,
    ) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        let callback = move || {
            let hits = Arc::clone(&inner);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        };
        (hits, callback)
    }

    #[tokio::test]
    async fn test_once_fires_exactly_once() {
        let (scheduler, clock) = setup();
        let (hits, callback) = counter();
        scheduler
            .schedule_once("p", Duration::from_secs(5), callback)
            .unwrap();

        assert_eq!(scheduler.fire_due().await, 0);
        clock.advance(Duration::from_secs(5));
        assert_eq!(scheduler.fire_due().await, 1);
        clock.advance(Duration::from_secs(60));
        assert_eq!(scheduler.fire_due().await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_firing() {
        let (scheduler, clock) = setup();
        let (hits, callback) = counter();
        let token = scheduler
            .schedule_once("p", Duration::from_secs(1), callback)
            .unwrap();

        assert!(scheduler.cancel(token));
        assert!(!scheduler.cancel(token));
        clock.advance(Duration::from_secs(2));
        assert_eq!(scheduler.fire_due().await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeating_reschedules() {
        let (scheduler, clock) = setup();
        let (hits, callback) = counter();
        scheduler
            .schedule_repeating("p", Duration::from_secs(10), callback)
            .unwrap();

        for _ in 0..3 {
            clock.advance(Duration::from_secs(10));
            assert_eq!(scheduler.fire_due().await, 1);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // Far behind: fires once, then resumes one interval from now.
        clock.advance(Duration::from_secs(1000));
        assert_eq!(scheduler.fire_due().await, 1);
        clock.advance(Duration::from_secs(9));
        assert_eq!(scheduler.fire_due().await, 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.fire_due().await, 1);
        assert_eq!(scheduler.pending("p"), 1);
    }

    #[tokio::test]
    async fn test_due_tasks_fire_in_time_order() {
        let (scheduler, clock) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (name, secs) in [("late", 3), ("early", 1), ("middle", 2)] {
            let order = Arc::clone(&order);
            scheduler
                .schedule_once("p", Duration::from_secs(secs), move || {
                    order.lock().push(name);
                    async { Ok(()) }
                })
                .unwrap();
        }
        clock.advance(Duration::from_secs(5));
        assert_eq!(scheduler.fire_due().await, 3);
        assert_eq!(*order.lock(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (scheduler, _clock) = setup();
        let (_hits, callback) = counter();
        assert_eq!(
            scheduler
                .schedule_repeating("p", Duration::ZERO, callback)
                .unwrap_err(),
            ScheduleError::ZeroInterval
        );
    }

    #[test]
    fn test_delay_beyond_clock_range_rejected() {
        let (scheduler, _clock) = setup();
        let (_hits, callback) = counter();
        assert_eq!(
            scheduler
                .schedule_once("p", Duration::MAX, callback.clone())
                .unwrap_err(),
            ScheduleError::DelayTooLarge(Duration::MAX)
        );
        assert_eq!(
            scheduler
                .schedule_repeating("p", Duration::MAX, callback)
                .unwrap_err(),
            ScheduleError::DelayTooLarge(Duration::MAX)
        );
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_overflowing_reschedule_drops_only_that_task() {
        let (scheduler, clock) = setup();
        scheduler.open("q");
        let (p_hits, p_callback) = counter();
        let (q_hits, q_callback) = counter();

        // Fits once from now, but not twice.
        let huge = Duration::from_secs(i64::MAX as u64 / 2 + 1);
        scheduler
            .schedule_repeating("p", huge, p_callback)
            .unwrap();
        scheduler
            .schedule_once("q", Duration::from_secs(1), q_callback)
            .unwrap();

        clock.advance(huge);
        assert_eq!(scheduler.fire_due().await, 2);
        assert_eq!(p_hits.load(Ordering::SeqCst), 1);
        assert_eq!(q_hits.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending("p"), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancelled_tasks_leave_no_heap_entries_behind() {
        let (scheduler, _clock) = setup();
        let (_hits, callback) = counter();

        for _ in 0..5 {
            scheduler.open("p");
            for hours in 1..=10 {
                scheduler
                    .schedule_once("p", Duration::from_secs(hours * 3600), callback.clone())
                    .unwrap();
            }
            assert_eq!(scheduler.close("p"), 10);
        }
        assert_eq!(scheduler.state.lock().heap.len(), 0);

        scheduler.open("p");
        let tokens: Vec<_> = (1..=10)
            .map(|hours| {
                scheduler
                    .schedule_once("p", Duration::from_secs(hours * 3600), callback.clone())
                    .unwrap()
            })
            .collect();
        for token in &tokens[..8] {
            assert!(scheduler.cancel(*token));
        }
        let state = scheduler.state.lock();
        assert_eq!(state.tasks.len(), 2);
        assert!(state.heap.len() <= 2 * state.tasks.len());
    }

    #[tokio::test]
    async fn test_closed_owner() {
        let (scheduler, clock) = setup();
        let (hits, callback) = counter();
        scheduler
            .schedule_once("p", Duration::from_secs(1), callback.clone())
            .unwrap();
        assert_eq!(scheduler.close("p"), 1);
        assert_eq!(
            scheduler
                .schedule_once("p", Duration::from_secs(1), callback)
                .unwrap_err(),
            ScheduleError::OwnerInactive("p".into())
        );
        clock.advance(Duration::from_secs(2));
        assert_eq!(scheduler.fire_due().await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_tasks_are_isolated() {
        let (scheduler, clock) = setup();
        let (hits, callback) = counter();
        scheduler
            .schedule_once("p", Duration::from_secs(1), || async {
                Err::<(), BoxError>("broken".into())
            })
            .unwrap();
        scheduler
            .schedule_once("p", Duration::from_secs(1), || async {
                if true {
                    panic!("worse");
                }
                Ok::<(), BoxError>(())
            })
            .unwrap();
        scheduler
            .schedule_once("p", Duration::from_secs(1), callback)
            .unwrap();

        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.fire_due().await, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clock_jumping_back_delays_but_does_not_lose() {
        let (scheduler, clock) = setup();
        let start = clock.now();
        let (hits, callback) = counter();
        scheduler
            .schedule_once("p", Duration::from_secs(10), callback)
            .unwrap();

        clock.set(start - Duration::from_secs(3600));
        assert_eq!(scheduler.fire_due().await, 0);
        assert_eq!(scheduler.next_wait(), Scheduler::DEFAULT_TICK);
        clock.set(start + Duration::from_secs(10));
        assert_eq!(scheduler.fire_due().await, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plugin_scheduler_scopes_cancel() {
        let (scheduler, _clock) = setup();
        scheduler.open("q");
        let p = PluginScheduler::new(Arc::clone(&scheduler), "p");
        let q = PluginScheduler::new(Arc::clone(&scheduler), "q");
        let (_hits, callback) = counter();

        let token = q.schedule_once(Duration::from_secs(1), callback.clone()).unwrap();
        assert!(!p.cancel(token));
        assert!(q.cancel(token));

        p.schedule_once(Duration::from_secs(1), callback.clone()).unwrap();
        p.schedule_repeating(Duration::from_secs(1), callback).unwrap();
        assert_eq!(p.pending(), 2);
        assert_eq!(p.cancel_all(), 2);
        assert!(scheduler.is_open("p"));
    }

    #[tokio::test]
    async fn test_run_loop_fires_and_stops() {
        let clock = ManualClock::default();
        let scheduler = Arc::new(
            Scheduler::new(Arc::new(clock.clone()), Executor::new(2))
                .with_tick(Duration::from_millis(5)),
        );
        scheduler.open("p");
        let (hits, callback) = counter();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown.clone()));

        scheduler
            .schedule_once("p", Duration::from_secs(30), callback)
            .unwrap();
        clock.advance(Duration::from_secs(30));

        tokio::time::timeout(Duration::from_secs(5), async {
            while hits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
