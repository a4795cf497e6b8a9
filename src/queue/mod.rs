//! Benchmark generation queue
//!
//! A single global FIFO of (entity, slot) tasks drained by one worker:
//! - a fixed delay precedes every request to respect the remote rate limit
//! - pause stops new tasks from starting; a running task is never interrupted
//! - failed tasks move to a failed bucket and come back only via `retry_failed`
//! - each result is written into the entity's slot-indexed result list
//!
//! Suspension points in a pass are the inter-request delay, the generation
//! call and the store write. The `processing` flag enforces a single worker.

mod log;
mod task;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::benchmark::{slot_prompt, BenchmarkConfig};
use crate::generation::{
    FailureKind, GenerationClient, GenerationError, GenerationParameters, GenerationRequest,
    DEFAULT_MODEL,
};
use crate::store::{Entity, EntityCache, RemoteStore};

pub use log::{ActivityLog, LogEntry, Severity};
pub use task::{tasks_for, tasks_for_missing, GenTask, TaskState};

/// Seed used when the benchmark asks for a random one, so every slot of a
/// run is comparable
pub const DEFAULT_FALLBACK_SEED: u64 = 1_234_567_890;

/// Queue tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Delay before each request in milliseconds (default: 2000)
    pub delay_ms: u64,
    /// Tag prefixed to the entity name in prompts (default: "artist")
    pub entity_tag: String,
    pub fallback_seed: u64,
    /// Activity log entries kept (default: 100)
    pub log_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            delay_ms: 2000,
            entity_tag: "artist".to_string(),
            fallback_seed: DEFAULT_FALLBACK_SEED,
            log_capacity: 100,
        }
    }
}

impl QueueConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Caller-owned inputs for a pass: credentials, model and benchmark setup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationContext {
    pub api_key: String,
    pub model: String,
    pub benchmark: BenchmarkConfig,
    /// Width, height, sampler and toggles; steps, scale and seed come from the benchmark
    pub parameters: GenerationParameters,
}

impl GenerationContext {
    pub fn new(api_key: &str, benchmark: BenchmarkConfig) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            benchmark,
            parameters: GenerationParameters::default(),
        }
    }
}

/// Context shared between the caller and a spawned worker
pub type SharedContext = Arc<RwLock<GenerationContext>>;

/// Receives user-facing events from the queue
pub trait QueueObserver: Send + Sync {
    /// A failure the user should see
    fn alert(&self, _message: &str) {}

    /// An entity's results changed; the caller should refresh its views
    fn entity_updated(&self, _entity: &Entity) {}
}

/// Observer that only logs
#[derive(Debug, Default)]
pub struct LogObserver;

impl QueueObserver for LogObserver {
    fn alert(&self, message: &str) {
        warn!("Queue alert: {}", message);
    }
}

/// Queue-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Idle,
    Processing,
    Paused,
}

/// A task parked in the failed bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTask {
    pub task: GenTask,
    pub kind: FailureKind,
    pub message: String,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub status: QueueStatus,
    pub pending: Vec<GenTask>,
    pub current: Option<GenTask>,
    pub failed: Vec<FailedTask>,
    pub completed: u64,
    pub log: Vec<LogEntry>,
}

impl QueueSnapshot {
    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        if self.current.as_ref().is_some_and(|t| t.id == task_id) {
            Some(TaskState::Running)
        } else if self.pending.iter().any(|t| t.id == task_id) {
            Some(TaskState::Queued)
        } else {
            self.failed
                .iter()
                .find(|f| f.task.id == task_id)
                .map(|f| TaskState::Failed(f.kind))
        }
    }

    /// Tasks in the failed bucket, oldest first
    pub fn failed_tasks(&self) -> Vec<GenTask> {
        self.failed.iter().map(|f| f.task.clone()).collect()
    }
}

/// Terminal result of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task: GenTask,
    pub state: TaskState,
    pub message: String,
}

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Another pass was already running; nothing was done
    pub busy: bool,
    pub succeeded: usize,
    pub failed: usize,
}

impl PumpReport {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome.state {
            TaskState::Done => self.succeeded += 1,
            _ => self.failed += 1,
        }
    }
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<GenTask>,
    failed: Vec<FailedTask>,
    current: Option<GenTask>,
    paused: bool,
    processing: bool,
    completed: u64,
    log: ActivityLog,
}

/// Clears the processing flag when a pass ends, however it ends
struct ProcessingGuard<'a> {
    state: &'a Mutex<QueueState>,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.processing = false;
        state.current = None;
    }
}

/// Successful generation, possibly with a failed remote write
struct Generated {
    entity_name: String,
    image_hash: String,
    persist_error: Option<String>,
}

/// The generation queue
pub struct GenerationQueue {
    state: Mutex<QueueState>,
    wake: Notify,
    config: QueueConfig,
    client: Arc<dyn GenerationClient>,
    store: Arc<dyn RemoteStore>,
    cache: Arc<EntityCache>,
    observer: Arc<dyn QueueObserver>,
}

impl std::fmt::Debug for GenerationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationQueue")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl GenerationQueue {
    pub fn new(
        config: QueueConfig,
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn RemoteStore>,
        cache: Arc<EntityCache>,
        observer: Arc<dyn QueueObserver>,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                failed: Vec::new(),
                current: None,
                paused: false,
                processing: false,
                completed: 0,
                log: ActivityLog::new(config.log_capacity),
            }),
            wake: Notify::new(),
            config,
            client,
            store,
            cache,
            observer,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append tasks to the tail. Duplicates are allowed; the last write wins.
    pub fn enqueue(&self, tasks: Vec<GenTask>) -> usize {
        let count = tasks.len();
        {
            let mut state = self.state.lock();
            state.pending.extend(tasks);
            debug!("Enqueued {} tasks ({} pending)", count, state.pending.len());
        }
        self.wake.notify_one();
        count
    }

    /// Stop starting new tasks
    pub fn pause(&self) {
        self.state.lock().paused = true;
        info!("Queue paused");
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        info!("Queue resumed");
        self.wake.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Move every failed task to the tail of the queue
    pub fn retry_failed(&self) -> usize {
        let count = {
            let mut state = self.state.lock();
            let failed = std::mem::take(&mut state.failed);
            let count = failed.len();
            state.pending.extend(failed.into_iter().map(|f| f.task));
            if count > 0 {
                state
                    .log
                    .push(Severity::Info, format!("Retrying {} failed tasks", count));
            }
            count
        };
        info!("Re-enqueued {} failed tasks", count);
        self.wake.notify_one();
        count
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.state.lock();
        if state.paused {
            QueueStatus::Paused
        } else if state.processing {
            QueueStatus::Processing
        } else {
            QueueStatus::Idle
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn failed_count(&self) -> usize {
        self.state.lock().failed.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let status = self.status();
        let state = self.state.lock();
        QueueSnapshot {
            status,
            pending: state.pending.iter().cloned().collect(),
            current: state.current.clone(),
            failed: state.failed.clone(),
            completed: state.completed,
            log: state.log.entries(),
        }
    }

    /// Drain the queue until it is empty or paused.
    ///
    /// Returns a busy report without doing anything if another pass is running.
    pub async fn pump(&self, ctx: &GenerationContext) -> PumpReport {
        let Some(_guard) = self.try_begin() else {
            debug!("Queue pass already running");
            return PumpReport {
                busy: true,
                ..Default::default()
            };
        };

        let mut report = PumpReport::default();
        while let Some(outcome) = self.step(ctx).await {
            report.record(&outcome);
        }
        report
    }

    /// Run passes on a background task whenever work arrives, re-reading the
    /// shared context before every task, until `shutdown` flips.
    pub fn spawn_worker(
        self: &Arc<Self>,
        context: SharedContext,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            info!("Queue worker started");
            loop {
                if let Some(_guard) = queue.try_begin() {
                    loop {
                        let ctx = context.read().clone();
                        if queue.step(&ctx).await.is_none() {
                            break;
                        }
                    }
                }

                tokio::select! {
                    _ = queue.wake.notified() => {}
                    _ = shutdown.changed() => break,
                }
            }
            info!("Queue worker stopped");
        })
    }

    fn try_begin(&self) -> Option<ProcessingGuard<'_>> {
        let mut state = self.state.lock();
        if state.processing {
            return None;
        }
        state.processing = true;
        Some(ProcessingGuard { state: &self.state })
    }

    fn ready(&self) -> bool {
        let state = self.state.lock();
        !state.paused && !state.pending.is_empty()
    }

    /// Wait the request delay, then run the head task. `None` when paused or empty.
    async fn step(&self, ctx: &GenerationContext) -> Option<TaskOutcome> {
        if !self.ready() {
            return None;
        }

        let delay = ctx
            .benchmark
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.delay());
        tokio::time::sleep(delay).await;

        let task = {
            let mut state = self.state.lock();
            if state.paused {
                return None;
            }
            let task = state.pending.front()?.clone();
            state.current = Some(task.clone());
            task
        };

        debug!(
            "Running task {} (entity {}, slot {})",
            task.id, task.entity_id, task.slot
        );
        let result = self.run_task(&task, ctx).await;
        Some(self.finish(task, result))
    }

    async fn run_task(
        &self,
        task: &GenTask,
        ctx: &GenerationContext,
    ) -> Result<Generated, GenerationError> {
        let entity = self
            .cache
            .get(&task.entity_id)
            .ok_or_else(|| {
                GenerationError::lookup(format!("Entity not found: {}", task.entity_id))
            })?;
        let slot = ctx
            .benchmark
            .slot(task.slot)
            .ok_or_else(|| {
                GenerationError::lookup(format!("Slot {} is not configured", task.slot))
            })?;

        let prompt = slot_prompt(&self.config.entity_tag, &entity.name, slot);
        let params = ctx
            .benchmark
            .parameters(&ctx.parameters, self.config.fallback_seed);
        let model = if ctx.model.is_empty() {
            DEFAULT_MODEL
        } else {
            ctx.model.as_str()
        };
        let request =
            GenerationRequest::new(model, &prompt, &ctx.benchmark.negative_prompt, &params);

        let image = self.client.generate(&ctx.api_key, &request).await?;

        // Read-modify-write against the latest view, not the snapshot taken above
        let mut latest = self.cache.get(&task.entity_id).unwrap_or(entity);
        latest.set_benchmark(task.slot, image.to_data_url());
        self.cache.upsert(latest.clone());

        let persist_error = match self.store.update_entity(&latest).await {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };
        self.observer.entity_updated(&latest);

        Ok(Generated {
            entity_name: latest.name,
            image_hash: image.short_hash().to_string(),
            persist_error,
        })
    }

    /// Remove the task from the queue and record its terminal state
    fn finish(&self, task: GenTask, result: Result<Generated, GenerationError>) -> TaskOutcome {
        let mut alert = None;
        let outcome = {
            let mut state = self.state.lock();
            state.current = None;
            if let Some(pos) = state.pending.iter().position(|t| t.id == task.id) {
                state.pending.remove(pos);
            }

            match result {
                Ok(generated) => {
                    state.completed += 1;
                    let message = match generated.persist_error {
                        None => {
                            let message = format!(
                                "Generated slot {} for {} ({})",
                                task.slot, generated.entity_name, generated.image_hash
                            );
                            info!("{}", message);
                            state.log.push(Severity::Success, message.clone());
                            message
                        }
                        Some(err) => {
                            let message = format!(
                                "Generated slot {} for {} but saving failed: {}",
                                task.slot, generated.entity_name, err
                            );
                            error!("{}", message);
                            state.log.push(Severity::Warning, message.clone());
                            alert = Some(message.clone());
                            message
                        }
                    };
                    TaskOutcome {
                        task,
                        state: TaskState::Done,
                        message,
                    }
                }
                Err(err) => {
                    let message = format!(
                        "Task for {} slot {} failed: {}",
                        task.entity_id, task.slot, err
                    );
                    if err.kind.alerts_user() {
                        warn!("{}", message);
                        state.log.push(Severity::Error, message.clone());
                        alert = Some(message.clone());
                    } else {
                        debug!("{}", message);
                        state.log.push(Severity::Warning, message.clone());
                    }
                    state.failed.push(FailedTask {
                        task: task.clone(),
                        kind: err.kind,
                        message: err.message.clone(),
                    });
                    TaskOutcome {
                        task,
                        state: TaskState::Failed(err.kind),
                        message,
                    }
                }
            }
        };

        if let Some(message) = alert {
            self.observer.alert(&message);
        }
        outcome
    }
}
