//! Queue manager and worker pool.
//!
//! The pending list, status table, and cancellation tokens are the only
//! mutable shared state, all behind a single reader/writer lock with
//! short critical sections. Dispatch rides a bounded channel sized to
//! the queue capacity; workers share the receiving end and pull in
//! strict FIFO order.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use darkroom_bridge::Engine;
use darkroom_core::config::QueueConfig;
use darkroom_core::types::{GenerationRequest, GenerationResult, JobState, QueueEntry, StatusRecord};
use darkroom_core::CoreError;

/// How often the retention sweep evicts expired terminal records.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Terminal outcome of one worker-driven job.
enum JobOutcome {
    Completed(Vec<GenerationResult>),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Mutable queue state guarded by a single lock.
struct QueueState {
    pending: Vec<QueueEntry>,
    statuses: HashMap<Uuid, StatusRecord>,
    cancel_tokens: HashMap<Uuid, CancellationToken>,
}

/// FIFO job queue with a bounded worker pool.
///
/// Created once via [`JobQueue::new`]; the returned `Arc` is cheap to
/// clone into request handlers. Workers start when
/// [`start_workers`](Self::start_workers) is called.
pub struct JobQueue<E: Engine> {
    state: RwLock<QueueState>,
    dispatch_tx: mpsc::Sender<GenerationRequest>,
    dispatch_rx: tokio::sync::Mutex<mpsc::Receiver<GenerationRequest>>,
    engine: Arc<E>,
    config: QueueConfig,
}

impl<E: Engine + 'static> JobQueue<E> {
    /// Create a queue dispatching to `engine`.
    pub fn new(config: QueueConfig, engine: Arc<E>) -> Arc<Self> {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.max_queue_size.max(1));

        Arc::new(Self {
            state: RwLock::new(QueueState {
                pending: Vec::new(),
                statuses: HashMap::new(),
                cancel_tokens: HashMap::new(),
            }),
            dispatch_tx,
            dispatch_rx: tokio::sync::Mutex::new(dispatch_rx),
            engine,
            config,
        })
    }

    /// Spawn one worker task per concurrency slot plus the status
    /// retention sweep. All tasks exit when `shutdown` is cancelled.
    pub fn start_workers(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            workers = self.config.max_concurrent,
            "Starting queue workers",
        );

        for worker_id in 0..self.config.max_concurrent {
            let queue = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                queue.worker_loop(worker_id, shutdown).await;
            });
        }

        tokio::spawn(async move {
            self.sweep_loop(shutdown).await;
        });
    }

    /// Accept a request into the queue.
    ///
    /// Returns the 1-based position in the pending list, or
    /// [`CoreError::QueueFull`] when the pending count is at capacity.
    /// May suspend briefly if the dispatch buffer is momentarily full.
    pub async fn enqueue(&self, request: GenerationRequest) -> Result<usize, CoreError> {
        request.validate()?;
        let id = request.id;

        let position = {
            let mut state = self.write_state();
            if state.pending.len() >= self.config.max_queue_size {
                return Err(CoreError::QueueFull);
            }

            let position = state.pending.len() + 1;
            state.statuses.insert(id, StatusRecord::queued(&request));
            state.cancel_tokens.insert(id, CancellationToken::new());
            state.pending.push(QueueEntry {
                request: request.clone(),
                position,
            });
            position
        };

        // Publish outside the lock. The buffer matches the queue
        // capacity, so this only suspends while workers are draining
        // stale entries.
        if self.dispatch_tx.send(request).await.is_err() {
            // No worker will ever see the job; undo the reservation
            // instead of stranding a permanently-queued record.
            let mut state = self.write_state();
            Self::remove_pending(&mut state, id);
            state.statuses.remove(&id);
            state.cancel_tokens.remove(&id);
            return Err(CoreError::Transport("dispatch channel closed".to_string()));
        }

        Ok(position)
    }

    /// Cancel a job.
    ///
    /// Queued jobs leave the pending list immediately; processing jobs
    /// have their cancellation token tripped and are observed by the
    /// worker asynchronously (best-effort, not instantaneous). Both are
    /// marked `cancelled` right away. Cancelling an already-terminal
    /// job is a no-op.
    pub fn cancel(&self, id: Uuid) -> Result<(), CoreError> {
        let mut state = self.write_state();

        let current = match state.statuses.get(&id) {
            Some(status) => status.state,
            None => return Err(CoreError::NotFound(id)),
        };

        match current {
            JobState::Queued => {
                if let Some(status) = state.statuses.get_mut(&id) {
                    status.state = JobState::Cancelled;
                    status.completed_at = Some(Utc::now());
                }
                if let Some(token) = state.cancel_tokens.remove(&id) {
                    token.cancel();
                }
                Self::remove_pending(&mut state, id);
                tracing::info!(job_id = %id, "Cancelled queued job");
            }
            JobState::Processing => {
                if let Some(status) = state.statuses.get_mut(&id) {
                    status.state = JobState::Cancelled;
                    status.completed_at = Some(Utc::now());
                }
                // The worker observes the token and cleans up the
                // pending entry; the token lives until then.
                if let Some(token) = state.cancel_tokens.get(&id) {
                    token.cancel();
                }
                tracing::info!(job_id = %id, "Cancellation requested for active job");
            }
            _ => {}
        }

        Ok(())
    }

    /// Current status of a job.
    pub fn status(&self, id: Uuid) -> Result<StatusRecord, CoreError> {
        self.read_state()
            .statuses
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound(id))
    }

    /// Defensive copy of the pending list in current order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.read_state().pending.clone()
    }

    /// Number of pending jobs.
    pub fn pending_len(&self) -> usize {
        self.read_state().pending.len()
    }

    // ---- worker loop ----

    async fn worker_loop(self: Arc<Self>, worker_id: usize, shutdown: CancellationToken) {
        tracing::info!(worker_id, "Queue worker started");

        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = async { self.dispatch_rx.lock().await.recv().await } => {
                    match received {
                        Some(request) => request,
                        None => break,
                    }
                }
            };

            self.process(request).await;
        }

        tracing::info!(worker_id, "Queue worker stopped");
    }

    /// Drive one job to a terminal state.
    async fn process(self: &Arc<Self>, request: GenerationRequest) {
        let job_id = request.id;

        // Claim the job: only Queued jobs proceed. Entries cancelled
        // while still queued arrive here as stale dispatches.
        let token = {
            let mut state = self.write_state();
            match state.statuses.get(&job_id).map(|s| s.state) {
                Some(JobState::Queued) => {
                    if let Some(status) = state.statuses.get_mut(&job_id) {
                        status.state = JobState::Processing;
                        if status.started_at.is_none() {
                            status.started_at = Some(Utc::now());
                        }
                    }
                    state.cancel_tokens.get(&job_id).cloned()
                }
                _ => {
                    tracing::debug!(job_id = %job_id, "Skipping stale dispatch");
                    return;
                }
            }
        };
        let Some(token) = token else { return };

        tracing::info!(job_id = %job_id, "Processing job");

        let timeout = Duration::from_secs(self.config.job_timeout_secs);
        let queue = Arc::clone(self);
        let progress = move |pct: f64, step: u32| {
            let mut state = queue.write_state();
            if let Some(status) = state.statuses.get_mut(&job_id) {
                // Terminal states never regress; late callbacks from an
                // abandoned generation are dropped here.
                if status.state == JobState::Processing {
                    status.progress = pct;
                    status.current_step = step;
                }
            }
        };

        // Three outcomes race. Timeout or cancellation abandons the
        // engine future; work already in flight on the inference service
        // continues remotely (known resource-leak boundary).
        let outcome = tokio::select! {
            _ = token.cancelled() => JobOutcome::Cancelled,
            _ = tokio::time::sleep(timeout) => JobOutcome::TimedOut,
            result = self.engine.generate(&request, &progress) => match result {
                Ok(results) => JobOutcome::Completed(results),
                Err(CoreError::Cancelled) => JobOutcome::Cancelled,
                Err(e) => JobOutcome::Failed(e.to_string()),
            },
        };

        self.finish(job_id, outcome);
    }

    /// Record a terminal outcome and release the job's queue resources.
    ///
    /// The state transition is applied only when legal, so a job already
    /// cancelled externally is never overwritten; pending-list removal
    /// and token cleanup always run.
    fn finish(&self, id: Uuid, outcome: JobOutcome) {
        let mut state = self.write_state();

        if let Some(status) = state.statuses.get_mut(&id) {
            let next = match outcome {
                JobOutcome::Completed(_) => JobState::Completed,
                JobOutcome::Failed(_) | JobOutcome::TimedOut => JobState::Failed,
                JobOutcome::Cancelled => JobState::Cancelled,
            };

            if status.state.can_transition_to(next) {
                status.state = next;
                status.completed_at = Some(Utc::now());

                match outcome {
                    JobOutcome::Completed(results) => {
                        status.progress = 100.0;
                        status.current_step = status.total_steps;
                        status.results = results;
                        tracing::info!(job_id = %id, "Job completed");
                    }
                    JobOutcome::Failed(message) => {
                        tracing::error!(job_id = %id, error = %message, "Job failed");
                        status.error = Some(message);
                    }
                    JobOutcome::TimedOut => {
                        tracing::error!(job_id = %id, "Job timed out");
                        status.error = Some(CoreError::Timeout.to_string());
                    }
                    JobOutcome::Cancelled => {
                        tracing::info!(job_id = %id, "Job cancelled");
                    }
                }
            }
        }

        Self::remove_pending(&mut state, id);
        state.cancel_tokens.remove(&id);
    }

    // ---- retention sweep ----

    /// Periodically evict terminal status records older than the
    /// configured TTL so the status table does not grow without bound.
    async fn sweep_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let ttl = chrono::Duration::seconds(self.config.status_ttl_secs as i64);
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let cutoff = Utc::now() - ttl;
            let mut state = self.write_state();
            let before = state.statuses.len();
            state.statuses.retain(|_, status| {
                !(status.state.is_terminal()
                    && status.completed_at.is_some_and(|at| at < cutoff))
            });
            let evicted = before - state.statuses.len();
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted expired status records");
            }
        }
    }

    // ---- private helpers ----

    /// Remove a pending entry and renumber the remainder 1..n.
    fn remove_pending(state: &mut QueueState, id: Uuid) {
        state.pending.retain(|entry| entry.request.id != id);
        for (index, entry) in state.pending.iter_mut().enumerate() {
            entry.position = index + 1;
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
