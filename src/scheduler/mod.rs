//! Time-ordered command queue.
//!
//! [`CommandQueue`] holds pending orders keyed by target time and runs each
//! one at or after that time. Two tasks drive it:
//!
//! - a timer task that wakes at the earliest pending time (never sleeping
//!   longer than the maximum poll interval) and moves due orders to the
//!   ready list, ordered by `(time, id)`;
//! - a single sender task that drains the ready list, either starting every
//!   order without waiting ([`SendMode::Burst`]) or awaiting each one before
//!   starting the next ([`SendMode::InOrder`]).
//!
//! Failures and late sends are reported as [`QueueEvent`]s on a broadcast
//! channel. They never stop the queue.
//!
//! ```ignore
//! let queue = CommandQueue::new(Arc::new(SystemClock), SendMode::InOrder, QueueOptions::default());
//! let id = queue.enqueue(now + 500, |cmd| async move { transport.send(cmd).await }, cmd)?;
//! queue.cancel_at_or_after(now + 400);
//! ```

mod clock;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, VmxError};

/// Longest the timer sleeps without re-reading the clock.
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Delivery discipline for ready orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Start every ready order immediately.
    #[default]
    Burst,
    /// Start one order, wait for it to settle, then start the next.
    InOrder,
}

/// Diagnostic thresholds and timer tuning.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Report a send that starts more than this many ms after its planned time.
    pub limit_slow_sent_command: Option<u64>,
    /// Report a completion that lands more than this many ms after its planned time.
    pub limit_slow_fulfilled_command: Option<u64>,
    pub max_poll_interval: Duration,
    pub event_capacity: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            limit_slow_sent_command: None,
            limit_slow_fulfilled_command: None,
            max_poll_interval: DEFAULT_MAX_POLL_INTERVAL,
            event_capacity: 256,
        }
    }
}

/// Queue-local order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// Read-only view of a pending order.
#[derive(Debug, Clone, Serialize)]
pub struct PendingOrder<A> {
    pub id: OrderId,
    pub time: i64,
    pub args: A,
}

/// Timing of one order, attached to slow-command events.
#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    pub id: OrderId,
    pub planned: i64,
    pub start_send: i64,
    pub end_send: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfilled: Option<i64>,
    /// How late, in ms, relative to `planned`.
    pub late_ms: i64,
    pub args: serde_json::Value,
}

/// Diagnostics emitted by the queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// An operation failed or panicked.
    Error {
        id: OrderId,
        planned: i64,
        message: String,
        args: serde_json::Value,
    },
    /// A send started later than `limit_slow_sent_command`.
    SlowSend(TimingReport),
    /// A send completed later than `limit_slow_fulfilled_command`.
    SlowFulfilled(TimingReport),
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error {
                id,
                planned,
                message,
                args,
            } => write!(
                f,
                "Order {id} planned at {planned} failed: {message}. Command: {args}"
            ),
            Self::SlowSend(report) => write!(
                f,
                "Slow sent command, should have been sent at {}, was {} ms slow. Command: {}",
                report.planned, report.late_ms, report.args
            ),
            Self::SlowFulfilled(report) => write!(
                f,
                "Slow fulfilled command, should have been fulfilled at {}, was {} ms slow. Command: {}",
                report.planned, report.late_ms, report.args
            ),
        }
    }
}

type Operation<A> = Box<dyn FnOnce(A) -> BoxFuture<'static, Result<()>> + Send>;

struct Order<A> {
    id: OrderId,
    time: i64,
    operation: Operation<A>,
    args: A,
}

/// An order whose operation has been invoked but not yet settled.
struct InFlight<A> {
    id: OrderId,
    time: i64,
    start_send: i64,
    end_send: i64,
    future: BoxFuture<'static, Result<()>>,
    args: A,
}

struct Inner<A> {
    clock: Arc<dyn Clock>,
    mode: SendMode,
    options: QueueOptions,
    next_id: AtomicU64,
    pending: Mutex<BTreeMap<OrderId, Order<A>>>,
    ready: Mutex<VecDeque<Order<A>>>,
    wake_timer: Notify,
    wake_sender: Notify,
    disposed: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string())
}

/// Scheduled command queue. See the [module docs](self).
///
/// Must be created inside a tokio runtime.
pub struct CommandQueue<A> {
    inner: Arc<Inner<A>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<A> CommandQueue<A>
where
    A: Clone + Serialize + Send + Sync + 'static,
{
    /// Create a queue and start its timer and sender tasks.
    pub fn new(clock: Arc<dyn Clock>, mode: SendMode, options: QueueOptions) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        debug!(?mode, ?options, "Creating command queue");
        let inner = Arc::new(Inner {
            clock,
            mode,
            options,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(BTreeMap::new()),
            ready: Mutex::new(VecDeque::new()),
            wake_timer: Notify::new(),
            wake_sender: Notify::new(),
            disposed: AtomicBool::new(false),
            events,
        });
        let timer = tokio::spawn(Arc::clone(&inner).run_timer());
        let sender = tokio::spawn(Arc::clone(&inner).run_sender());
        Self {
            inner,
            tasks: Mutex::new(vec![timer, sender]),
        }
    }

    /// Subscribe to queue diagnostics.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Schedule `operation(args)` to run at or after `time`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `time` is negative or the queue has been
    /// disposed. The pending set is untouched in both cases.
    pub fn enqueue<F, Fut>(&self, time: i64, operation: F, args: A) -> Result<OrderId>
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if time < 0 {
            return Err(VmxError::InvalidArgument(format!(
                "time argument must be >= 0 ({time})"
            )));
        }
        if self.is_disposed() {
            return Err(VmxError::InvalidArgument(
                "queue has been disposed".to_string(),
            ));
        }

        let id = OrderId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let operation: Operation<A> = Box::new(move |args| operation(args).boxed());
        lock(&self.inner.pending).insert(
            id,
            Order {
                id,
                time,
                operation,
                args,
            },
        );
        trace!(%id, time, "Order queued");
        self.inner.wake_timer.notify_one();
        Ok(id)
    }

    /// Remove a pending order. No-op if it was already sent or never existed.
    pub fn cancel(&self, id: OrderId) -> bool {
        let removed = lock(&self.inner.pending).remove(&id).is_some();
        if removed {
            trace!(%id, "Order cancelled");
        }
        removed
    }

    /// Remove every pending order with `time > cut`.
    pub fn cancel_after(&self, cut: i64) -> usize {
        self.inner.remove_where(|time| time > cut)
    }

    /// Remove every pending order with `time >= cut`.
    pub fn cancel_at_or_after(&self, cut: i64) -> usize {
        self.inner.remove_where(|time| time >= cut)
    }

    /// Snapshot of the pending orders, sorted by time then id.
    #[must_use]
    pub fn list_pending(&self) -> Vec<PendingOrder<A>> {
        let mut orders: Vec<_> = lock(&self.inner.pending)
            .values()
            .map(|order| PendingOrder {
                id: order.id,
                time: order.time,
                args: order.args.clone(),
            })
            .collect();
        orders.sort_by_key(|order| (order.time, order.id));
        orders
    }
}

impl<A> CommandQueue<A> {
    /// Number of orders not yet moved to the ready list.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn mode(&self) -> SendMode {
        self.inner.mode
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Cancel everything not yet started and stop the internal tasks.
    ///
    /// An operation already in flight is allowed to finish.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = std::mem::take(&mut *lock(&self.inner.pending)).len();
        let ready = std::mem::take(&mut *lock(&self.inner.ready)).len();
        debug!(pending, ready, "Disposing command queue");
        self.inner.wake_timer.notify_one();
        self.inner.wake_sender.notify_one();
        lock(&self.tasks).clear();
    }
}

impl<A> Drop for CommandQueue<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<A> Inner<A> {
    fn remove_where(&self, predicate: impl Fn(i64) -> bool) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.len();
        pending.retain(|_, order| !predicate(order.time));
        let removed = before - pending.len();
        if removed > 0 {
            debug!(removed, remaining = pending.len(), "Cancelled pending orders");
        }
        removed
    }

    /// Move due orders to the ready list; returns how long to sleep.
    fn check_queue(&self) -> Duration {
        let now = self.clock.now_ms();
        let mut due = Vec::new();
        let mut next_time: Option<i64> = None;
        {
            let mut pending = lock(&self.pending);
            let due_ids: Vec<OrderId> = pending
                .values()
                .filter(|order| order.time <= now)
                .map(|order| order.id)
                .collect();
            for order in pending.values() {
                if order.time > now {
                    next_time = Some(next_time.map_or(order.time, |t| t.min(order.time)));
                }
            }
            for id in due_ids {
                if let Some(order) = pending.remove(&id) {
                    due.push(order);
                }
            }
        }

        if !due.is_empty() {
            due.sort_by_key(|order| (order.time, order.id));
            debug!(count = due.len(), now, "Orders ready to send");
            lock(&self.ready).extend(due);
            self.wake_sender.notify_one();
        }

        let max = self.options.max_poll_interval;
        next_time.map_or(max, |time| {
            let wait = u64::try_from(time - now).unwrap_or(0);
            Duration::from_millis(wait).min(max)
        })
    }

    async fn run_timer(self: Arc<Self>) {
        while !self.disposed.load(Ordering::SeqCst) {
            let sleep_for = self.check_queue();
            trace!(?sleep_for, "Timer sleeping");
            tokio::select! {
                () = self.wake_timer.notified() => {}
                () = tokio::time::sleep(sleep_for) => {}
            }
        }
        trace!("Timer task stopped");
    }
}

impl<A> Inner<A>
where
    A: Clone + Serialize + Send + Sync + 'static,
{
    async fn run_sender(self: Arc<Self>) {
        while !self.disposed.load(Ordering::SeqCst) {
            let next = lock(&self.ready).pop_front();
            let Some(order) = next else {
                self.wake_sender.notified().await;
                continue;
            };
            // Operations are invoked here, in ready order, for both modes.
            let Some(in_flight) = self.start(order) else {
                continue;
            };
            match self.mode {
                SendMode::Burst => {
                    let inner = Arc::clone(&self);
                    tokio::spawn(async move { inner.finish(in_flight).await });
                }
                SendMode::InOrder => self.finish(in_flight).await,
            }
        }
        trace!("Sender task stopped");
    }

    /// Invoke the operation. `None` if it panicked before returning a future.
    fn start(&self, order: Order<A>) -> Option<InFlight<A>> {
        let Order {
            id,
            time,
            operation,
            args,
        } = order;
        let report_args = args.clone();

        let start_send = self.clock.now_ms();
        let started = std::panic::catch_unwind(AssertUnwindSafe(move || operation(args)));
        let end_send = self.clock.now_ms();
        self.verify_send(id, time, start_send, end_send, &report_args);

        match started {
            Ok(future) => Some(InFlight {
                id,
                time,
                start_send,
                end_send,
                future,
                args: report_args,
            }),
            Err(panic) => {
                self.report_error(id, time, panic_message(panic.as_ref()), &report_args);
                None
            }
        }
    }

    /// Await an invoked operation and report how it settled.
    async fn finish(&self, in_flight: InFlight<A>) {
        let InFlight {
            id,
            time,
            start_send,
            end_send,
            future,
            args,
        } = in_flight;
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => {
                trace!(%id, "Order fulfilled");
                self.verify_fulfill(id, time, start_send, end_send, &args);
            }
            Ok(Err(e)) => self.report_error(id, time, e.to_string(), &args),
            Err(panic) => self.report_error(id, time, panic_message(panic.as_ref()), &args),
        }
    }

    fn report(
        &self,
        id: OrderId,
        planned: i64,
        start_send: i64,
        end_send: i64,
        fulfilled: Option<i64>,
        args: &A,
    ) -> TimingReport {
        TimingReport {
            id,
            planned,
            start_send,
            end_send,
            fulfilled,
            late_ms: fulfilled.unwrap_or(start_send) - planned,
            args: serde_json::to_value(args).unwrap_or(serde_json::Value::Null),
        }
    }

    fn verify_send(&self, id: OrderId, planned: i64, start_send: i64, end_send: i64, args: &A) {
        let Some(limit) = self.options.limit_slow_sent_command else {
            return;
        };
        let late = start_send - planned;
        if late > i64::try_from(limit).unwrap_or(i64::MAX) {
            let event =
                QueueEvent::SlowSend(self.report(id, planned, start_send, end_send, None, args));
            warn!(%id, late, "{event}");
            let _ = self.events.send(event);
        }
    }

    fn verify_fulfill(&self, id: OrderId, planned: i64, start_send: i64, end_send: i64, args: &A) {
        let Some(limit) = self.options.limit_slow_fulfilled_command else {
            return;
        };
        let fulfilled = self.clock.now_ms();
        let late = fulfilled - planned;
        if late > i64::try_from(limit).unwrap_or(i64::MAX) {
            let event = QueueEvent::SlowFulfilled(self.report(
                id,
                planned,
                start_send,
                end_send,
                Some(fulfilled),
                args,
            ));
            warn!(%id, late, "{event}");
            let _ = self.events.send(event);
        }
    }

    fn report_error(&self, id: OrderId, planned: i64, message: String, args: &A) {
        warn!(%id, planned, error = %message, "Order failed");
        let _ = self.events.send(QueueEvent::Error {
            id,
            planned,
            message,
            args: serde_json::to_value(args).unwrap_or(serde_json::Value::Null),
        });
    }
}
