//! # Request Scheduler
//!
//! Single in-process priority queue drained by one paced dispatch loop.
//!
//! ## Ordering
//!
//! Items are ordered by `(priority desc, sequence asc)`: higher priority first,
//! FIFO within a priority. A retried item re-enters the queue with its original
//! sequence number once its backoff elapses, so it keeps its place relative to
//! later submissions. Only the failing item waits out its backoff; the loop
//! keeps serving everyone else.
//!
//! ## Pacing
//!
//! Exactly one primary call is in flight at a time, and consecutive dispatches
//! start at least `rate_limit_delay` apart. When the health monitor reports the
//! provider unavailable, queued items are answered without touching the
//! provider or the pacing clock: fresh items with [`DispatchOutcome::Skipped`],
//! items parked for a retry with [`DispatchOutcome::Failed`] carrying their own
//! last provider error.

use crate::cache::RequestKey;
use crate::config::SchedulerConfig;
use crate::error::{ProviderError, SpeechError};
use crate::health::HealthMonitor;
use crate::providers::PrimaryProvider;
use crate::retry::{RetryController, RetryDecision, RetryState};
use crate::types::{AudioBytes, SynthesisRequest, VoiceParams};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Terminal result of the primary tier for one request
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success {
        audio: AudioBytes,
        latency: Duration,
        attempts: u32,
    },
    /// Non-retryable failure, retryable failure after the retry ceiling, or a
    /// retry cut short because the provider became unavailable
    Failed {
        error: ProviderError,
        attempts: u32,
    },
    /// The provider was marked unavailable before the item's first attempt
    Skipped { consecutive_failures: u32 },
}

/// Awaitable completion handle for a submitted request
#[derive(Debug)]
pub struct DispatchTicket {
    request_id: Uuid,
    receiver: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchTicket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// `None` when the scheduler stopped before the request completed
    pub async fn outcome(self) -> Option<DispatchOutcome> {
        self.receiver.await.ok()
    }
}

#[derive(Debug)]
struct QueuedJob {
    request: SynthesisRequest,
    key: RequestKey,
    voice: VoiceParams,
    sequence: u64,
    retry: RetryState,
    reply: oneshot::Sender<DispatchOutcome>,
}

impl QueuedJob {
    fn attempts(&self) -> u32 {
        self.retry.attempt + 1
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    /// Max-heap order: higher priority wins, then the older sequence number
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_sequence: u64,
    closed: bool,
}

/// Dispatch counters
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub dispatched: AtomicU64,
    pub retries_scheduled: AtomicU64,
    pub skipped_unavailable: AtomicU64,
    pub retries_abandoned: AtomicU64,
    pub abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatsSnapshot {
    pub dispatched: u64,
    pub retries_scheduled: u64,
    pub skipped_unavailable: u64,
    pub retries_abandoned: u64,
    pub abandoned: u64,
}

struct SchedulerShared {
    queue: Mutex<QueueState>,
    work_available: Notify,
    shutdown_tx: watch::Sender<bool>,
    in_flight: AtomicBool,
    pending_retries: AtomicUsize,
    provider: Arc<dyn PrimaryProvider>,
    health: Arc<HealthMonitor>,
    retry: RetryController,
    rate_limit_delay: Duration,
    primary_timeout: Duration,
    stats: SchedulerStats,
}

impl std::fmt::Debug for SchedulerShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerShared")
            .field("provider", &self.provider.name())
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("primary_timeout", &self.primary_timeout)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        provider: Arc<dyn PrimaryProvider>,
        health: Arc<HealthMonitor>,
        retry: RetryController,
        config: &SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(SchedulerShared {
                queue: Mutex::new(QueueState::default()),
                work_available: Notify::new(),
                shutdown_tx,
                in_flight: AtomicBool::new(false),
                pending_retries: AtomicUsize::new(0),
                provider,
                health,
                retry,
                rate_limit_delay: config.rate_limit_delay(),
                primary_timeout: config.primary_timeout(),
                stats: SchedulerStats::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the dispatch loop. Idempotent; a no-op after shutdown.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.shared.queue.lock().closed {
            return;
        }

        info!(
            rate_limit_delay_ms = self.shared.rate_limit_delay.as_millis() as u64,
            primary_timeout_ms = self.shared.primary_timeout.as_millis() as u64,
            "🚀 Starting speech dispatch loop"
        );

        let shared = Arc::clone(&self.shared);
        *worker = Some(tokio::spawn(async move {
            shared.run().await;
        }));
    }

    pub fn is_started(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Queue a request for the primary provider. Never awaits.
    pub fn submit(
        &self,
        request: SynthesisRequest,
        key: RequestKey,
        voice: VoiceParams,
    ) -> Result<DispatchTicket, SpeechError> {
        let (reply, receiver) = oneshot::channel();
        let request_id = request.id;
        let priority = request.priority;

        let queue_length = {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                return Err(SpeechError::ShuttingDown);
            }
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.heap.push(QueuedJob {
                request,
                key,
                voice,
                sequence,
                retry: RetryState::default(),
                reply,
            });
            queue.heap.len()
        };
        self.shared.work_available.notify_one();

        debug!(
            request_id = %request_id,
            priority = %priority,
            queue_length = queue_length,
            "Request queued for primary dispatch"
        );

        Ok(DispatchTicket {
            request_id,
            receiver,
        })
    }

    pub fn queue_length(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    /// Items waiting out a retry backoff (not counted in `queue_length`)
    pub fn pending_retries(&self) -> usize {
        self.shared.pending_retries.load(Ordering::Acquire)
    }

    pub fn is_processing(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        let stats = &self.shared.stats;
        SchedulerStatsSnapshot {
            dispatched: stats.dispatched.load(Ordering::Relaxed),
            retries_scheduled: stats.retries_scheduled.load(Ordering::Relaxed),
            skipped_unavailable: stats.skipped_unavailable.load(Ordering::Relaxed),
            retries_abandoned: stats.retries_abandoned.load(Ordering::Relaxed),
            abandoned: stats.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Stop the loop and release every queued item. Waiting callers observe
    /// their ticket resolving to `None`.
    pub async fn shutdown(&self) {
        let drained = {
            let mut queue = self.shared.queue.lock();
            queue.closed = true;
            std::mem::take(&mut queue.heap)
        };
        let _ = self.shared.shutdown_tx.send(true);
        self.shared.work_available.notify_one();

        let released = drained.len();
        drop(drained);

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(err) = handle.await {
                warn!(error = %err, "Dispatch loop ended abnormally");
            }
        }

        info!(released = released, "🛑 Speech dispatch loop stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.queue.lock().closed = true;
        let _ = self.shared.shutdown_tx.send(true);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}

impl SchedulerShared {
    fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    fn pop(&self) -> Option<QueuedJob> {
        self.queue.lock().heap.pop()
    }

    fn has_work(&self) -> bool {
        !self.queue.lock().heap.is_empty()
    }

    async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut next_dispatch_at: Option<Instant> = None;

        loop {
            if self.is_closed() {
                break;
            }

            if !self.has_work() {
                tokio::select! {
                    _ = self.work_available.notified() => continue,
                    _ = shutdown_rx.changed() => break,
                }
            }

            // Skips never reach the provider, so they don't wait for pacing
            if !self.health.allows_dispatch() {
                if let Some(job) = self.pop() {
                    self.answer_skipped(job);
                }
                continue;
            }

            if let Some(at) = next_dispatch_at {
                if Instant::now() < at {
                    tokio::select! {
                        _ = sleep_until(at) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                    // Health or queue contents may have changed while pacing
                    continue;
                }
            }

            let Some(job) = self.pop() else {
                continue;
            };

            if job.reply.is_closed() {
                debug!(request_id = %job.request.id, "Caller gone before dispatch, dropping request");
                self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            next_dispatch_at = Some(Instant::now() + self.rate_limit_delay);
            self.in_flight.store(true, Ordering::Release);
            let keep_running = self.dispatch(job, &mut shutdown_rx).await;
            self.in_flight.store(false, Ordering::Release);
            if !keep_running {
                break;
            }
        }

        debug!("Dispatch loop exiting");
    }

    fn answer_skipped(&self, mut job: QueuedJob) {
        if let Some(error) = job.retry.last_error.take() {
            let attempts = job.retry.attempt;
            warn!(
                request_id = %job.request.id,
                attempts = attempts,
                error_class = %error.class,
                "Provider unavailable, abandoning pending retry"
            );
            self.stats.retries_abandoned.fetch_add(1, Ordering::Relaxed);
            let _ = job.reply.send(DispatchOutcome::Failed { error, attempts });
            return;
        }

        let consecutive_failures = self.health.snapshot().consecutive_failures;
        debug!(
            request_id = %job.request.id,
            consecutive_failures = consecutive_failures,
            "Provider unavailable, skipping primary dispatch"
        );
        self.stats.skipped_unavailable.fetch_add(1, Ordering::Relaxed);
        let _ = job.reply.send(DispatchOutcome::Skipped {
            consecutive_failures,
        });
    }

    /// One primary call. Returns `false` if shutdown interrupted it.
    async fn dispatch(
        self: &Arc<Self>,
        mut job: QueuedJob,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let request_id = job.request.id;
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %request_id,
            attempt = job.attempts(),
            priority = %job.request.priority,
            key = %job.key,
            text = %job.request.preview(),
            "📤 Dispatching to primary provider"
        );

        let started = Instant::now();
        let call = tokio::time::timeout(
            self.primary_timeout,
            self.provider.synthesize(&job.request.text, &job.voice),
        );
        let result = tokio::select! {
            result = call => result.unwrap_or_else(|_| Err(ProviderError::timeout(self.primary_timeout))),
            _ = shutdown_rx.changed() => {
                debug!(request_id = %request_id, "Shutdown during primary call, releasing request");
                return false;
            }
        };
        let latency = started.elapsed();

        match result {
            Ok(audio) => {
                self.health.record_success(latency);
                debug!(
                    request_id = %request_id,
                    latency_ms = latency.as_millis() as u64,
                    bytes = audio.len(),
                    "✅ Primary synthesis succeeded"
                );
                let attempts = job.attempts();
                let _ = job.reply.send(DispatchOutcome::Success {
                    audio,
                    latency,
                    attempts,
                });
            }
            Err(error) => {
                self.health.record_failure(error.class);
                warn!(
                    request_id = %request_id,
                    attempt = job.attempts(),
                    error_class = %error.class,
                    error = %error.message,
                    "❌ Primary synthesis failed"
                );

                match self.retry.on_failure(&mut job.retry, &error) {
                    RetryDecision::RetryAfter(delay) => {
                        self.stats.retries_scheduled.fetch_add(1, Ordering::Relaxed);
                        self.schedule_retry(job, delay);
                    }
                    RetryDecision::GiveUp => {
                        let attempts = job.attempts();
                        let _ = job.reply.send(DispatchOutcome::Failed { error, attempts });
                    }
                }
            }
        }
        true
    }

    /// Park the job for `delay`, then put it back on the queue
    fn schedule_retry(self: &Arc<Self>, job: QueuedJob, delay: Duration) {
        info!(
            request_id = %job.request.id,
            retry = job.retry.attempt,
            delay_ms = delay.as_millis() as u64,
            "🔁 Retry scheduled"
        );

        self.pending_retries.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let requeued = tokio::select! {
                _ = sleep(delay) => {
                    let mut queue = shared.queue.lock();
                    if queue.closed {
                        false
                    } else {
                        queue.heap.push(job);
                        true
                    }
                }
                _ = shutdown_rx.changed() => false,
            };
            shared.pending_retries.fetch_sub(1, Ordering::AcqRel);
            if requeued {
                shared.work_available.notify_one();
            }
        });
    }
}
