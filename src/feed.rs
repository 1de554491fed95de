//! The feed facade: one backfill walk plus per-kind live subscriptions,
//! merging into a shared capped buffer.
//!
//! Live delivery starts before the backfill so no event emitted during the
//! walk is lost; the buffer tolerates the resulting duplicates near the
//! boundary. All merges go through one write lock, so a snapshot never
//! observes a half-applied batch.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use tokio::{
    sync::watch,
    task::JoinHandle,
};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::{
    backfill::AdaptiveBatchWalker,
    buffer::{EventBuffer, MergeOrder},
    config::FeedConfig,
    error::FeedError,
    event::{EventKind, MarketEvent, decode_batch},
    source::{LogSubscription, MarketLogSource, SubscriptionHandle},
};

/// Progress of the historical walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStatus {
    NotStarted,
    Running,
    /// The walk covered its range (skipped gaps included).
    Completed,
    /// The walk was abandoned or cancelled before covering its range.
    Failed,
}

/// State of the live subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    NotStarted,
    Subscribed,
    Stopped,
}

/// Combined feed status, observable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStatus {
    pub backfill: BackfillStatus,
    pub live: LiveStatus,
}

impl FeedStatus {
    const fn initial() -> Self {
        Self { backfill: BackfillStatus::NotStarted, live: LiveStatus::NotStarted }
    }
}

/// State shared between the feed handle and its background tasks.
struct FeedInner {
    buffer: RwLock<EventBuffer>,
    status: Mutex<FeedStatus>,
    last_error: Mutex<Option<FeedError>>,
    /// Bumped after every merge; receivers wake on each change.
    updates: watch::Sender<u64>,
    started: AtomicBool,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    live_tasks: Mutex<Vec<JoinHandle<()>>>,
    walk_task: Mutex<Option<JoinHandle<()>>>,
}

// Lock poisoning cannot corrupt the buffer or status (every critical section
// is a plain data update), so a poisoned guard is safe to reclaim.
fn reclaim<T>(result: Result<T, PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl FeedInner {
    fn new(capacity: usize) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            buffer: RwLock::new(EventBuffer::new(capacity)),
            status: Mutex::new(FeedStatus::initial()),
            last_error: Mutex::new(None),
            updates,
            started: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            live_tasks: Mutex::new(Vec::new()),
            walk_task: Mutex::new(None),
        }
    }

    /// Applies one batch under the write lock, then notifies watchers. The
    /// lock is released before the notification so a woken reader can take a
    /// snapshot immediately.
    fn merge(&self, batch: Vec<MarketEvent>, order: MergeOrder) {
        {
            let mut buffer = reclaim(self.buffer.write());
            buffer.merge(batch, order);
        }
        self.updates.send_modify(|version| *version += 1);
    }

    fn status(&self) -> MutexGuard<'_, FeedStatus> {
        reclaim(self.status.lock())
    }

    fn record_error(&self, err: FeedError) {
        *reclaim(self.last_error.lock()) = Some(err);
    }
}

/// Handle over a running feed. Cheap to construct once, queried from anywhere
/// via interior mutability; background tasks hold only the shared inner
/// state.
pub struct MarketFeed<S> {
    source: Arc<S>,
    config: FeedConfig,
    inner: Arc<FeedInner>,
}

impl<S: MarketLogSource> MarketFeed<S> {
    /// Entry point, see [`MarketFeedBuilder`].
    #[must_use]
    pub fn builder() -> MarketFeedBuilder {
        MarketFeedBuilder::new()
    }

    /// Starts the feed over the trailing window: the configured historical
    /// span ending at the node's current head.
    ///
    /// Idempotent; a second call after a successful start is a no-op.
    pub async fn start(&self) -> Result<(), FeedError> {
        let head = self.source.latest_block().await?;
        let from_block = head.saturating_sub(self.config.historical_span);
        self.start_over_range(from_block, head).await
    }

    /// Starts the feed over an explicit block interval (both ends
    /// inclusive).
    ///
    /// Subscriptions are opened before the backfill is spawned, so events
    /// emitted while the walk runs are delivered live rather than lost. If a
    /// subscription cannot be opened the feed is left unstarted and the
    /// error is returned.
    pub async fn start_over_range(&self, from_block: u64, to_block: u64) -> Result<(), FeedError> {
        if from_block > to_block {
            return Err(FeedError::InvalidRange { from: from_block, to: to_block });
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // live first, backfill second
        for kind in EventKind::ALL {
            let subscription = match self.source.subscribe(kind).await {
                Ok(subscription) => subscription,
                Err(err) => {
                    // tear down whatever was already subscribed, otherwise a
                    // retry would double-deliver through the orphan
                    self.close_live();
                    self.inner.started.store(false, Ordering::SeqCst);
                    warn!(kind = %kind, error = %err, "subscribe failed, start rolled back");
                    return Err(err.into());
                }
            };
            self.spawn_live(kind, subscription);
        }
        self.inner.status().live = LiveStatus::Subscribed;

        self.spawn_walk(from_block, to_block);
        info!(from_block, to_block, "feed started");
        Ok(())
    }

    fn spawn_live(&self, kind: EventKind, subscription: LogSubscription) {
        let (mut logs, handle) = subscription.into_parts();
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            while let Some(batch) = logs.next().await {
                match batch {
                    Ok(logs) => {
                        let events = decode_batch(&logs);
                        if !events.is_empty() {
                            inner.merge(events, MergeOrder::NewestFirst);
                        }
                    }
                    Err(err) => {
                        // delivery may resume; stay subscribed and surface
                        // the error for polling
                        warn!(kind = %kind, error = %err, "live subscription error");
                        inner.record_error(FeedError::Source(err));
                    }
                }
            }
            info!(kind = %kind, "live delivery ended");
        });

        reclaim(self.inner.subscriptions.lock()).push(handle);
        reclaim(self.inner.live_tasks.lock()).push(task);
    }

    fn spawn_walk(&self, from_block: u64, to_block: u64) {
        self.inner.status().backfill = BackfillStatus::Running;

        let inner = Arc::clone(&self.inner);
        let source = Arc::clone(&self.source);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let walker = AdaptiveBatchWalker::new(&*source, &config);
            let report = walker.walk(from_block, to_block).await;

            if !report.events.is_empty() {
                inner.merge(report.events, MergeOrder::OldestFirst);
            }
            match report.error {
                Some(err) => {
                    inner.record_error(FeedError::Source(err));
                    inner.status().backfill = BackfillStatus::Failed;
                }
                None => inner.status().backfill = BackfillStatus::Completed,
            }
        });

        *reclaim(self.inner.walk_task.lock()) = Some(task);
    }

    /// Closes every open subscription handle and aborts the tasks draining
    /// them.
    fn close_live(&self) {
        for handle in reclaim(self.inner.subscriptions.lock()).drain(..) {
            handle.close();
        }
        for task in reclaim(self.inner.live_tasks.lock()).drain(..) {
            task.abort();
        }
    }

    /// Stops live delivery and cancels a still-running backfill.
    ///
    /// Cancellation discards the walk's partial results; events already
    /// merged stay in the buffer. Idempotent, and safe to call on a feed
    /// that was never started.
    pub fn stop(&self) {
        if let Some(task) = reclaim(self.inner.walk_task.lock()).take() {
            task.abort();
        }
        self.close_live();

        let mut status = self.inner.status();
        if status.live == LiveStatus::Subscribed {
            status.live = LiveStatus::Stopped;
        }
        if status.backfill == BackfillStatus::Running {
            status.backfill = BackfillStatus::Failed;
        }
        drop(status);
        info!("feed stopped");
    }

    /// Consistent copy of the buffer, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MarketEvent> {
        reclaim(self.inner.buffer.read()).snapshot()
    }

    /// Most recent non-fatal error, if any. Errors are sticky until
    /// overwritten by a later one.
    #[must_use]
    pub fn last_error(&self) -> Option<FeedError> {
        reclaim(self.inner.last_error.lock()).clone()
    }

    #[must_use]
    pub fn status(&self) -> FeedStatus {
        *self.inner.status()
    }

    /// Change notifications: the watched value is a version counter bumped
    /// on every merge. Await `changed()` and then call [`Self::snapshot`].
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.inner.updates.subscribe()
    }
}

impl<S> Drop for MarketFeed<S> {
    fn drop(&mut self) {
        // background tasks must not outlive the handle they report into
        if let Some(task) = reclaim(self.inner.walk_task.lock()).take() {
            task.abort();
        }
        for task in reclaim(self.inner.live_tasks.lock()).drain(..) {
            task.abort();
        }
    }
}

/// Builder for [`MarketFeed`]. Every knob defaults per [`FeedConfig`]; the
/// last call for a given knob wins.
#[derive(Debug, Clone, Default)]
pub struct MarketFeedBuilder {
    config: FeedConfig,
}

impl MarketFeedBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting chunk width for the backfill walk.
    #[must_use]
    pub fn initial_batch(mut self, initial_batch: u64) -> Self {
        self.config.initial_batch = initial_batch;
        self
    }

    /// Smallest chunk width the walk will attempt before skipping forward.
    #[must_use]
    pub fn min_batch(mut self, min_batch: u64) -> Self {
        self.config.min_batch = min_batch;
        self
    }

    /// Upper bound on the chunk width.
    #[must_use]
    pub fn max_batch(mut self, max_batch: u64) -> Self {
        self.config.max_batch = max_batch;
        self
    }

    /// Width added after each successful chunk.
    #[must_use]
    pub fn batch_growth_step(mut self, batch_growth_step: u64) -> Self {
        self.config.batch_growth_step = batch_growth_step;
        self
    }

    /// Rejections tolerated at one cursor position before skipping forward.
    #[must_use]
    pub fn max_retries_per_cursor(mut self, max_retries_per_cursor: u32) -> Self {
        self.config.max_retries_per_cursor = max_retries_per_cursor;
        self
    }

    /// Buffer capacity; older events are evicted past this count.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Trailing window (in blocks) covered by [`MarketFeed::start`].
    #[must_use]
    pub fn historical_span(mut self, historical_span: u64) -> Self {
        self.config.historical_span = historical_span;
        self
    }

    /// Event budget at which the backfill stops early.
    #[must_use]
    pub fn max_total(mut self, max_total: usize) -> Self {
        self.config.max_total = max_total;
        self
    }

    /// Validates the configuration and binds the feed to its log source.
    pub fn build<S: MarketLogSource>(self, source: S) -> Result<MarketFeed<S>, FeedError> {
        self.config.validate()?;
        let inner = Arc::new(FeedInner::new(self.config.capacity));
        Ok(MarketFeed { source: Arc::new(source), config: self.config, inner })
    }
}
