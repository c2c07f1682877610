//! The batch job pipeline.
//!
//! [`BatchJobPipeline::submit`] materialises one `loading` placeholder per
//! task replica and returns them synchronously, then drains the batch on a
//! background task:
//!
//! - tasks in submission order, replicas in order, one item at a time;
//! - a courtesy delay between tasks;
//! - per item, a bounded attempt loop over the capability negotiator, with
//!   back-off between attempts;
//! - on success, an optional relay of remote assets (relay failure only adds
//!   a warning);
//! - a progress event after every terminal item.
//!
//! A failing item never aborts its siblings. The drain resolves with every
//! item terminal; partial failure is reported as data, not as an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{
    AssetRelay, BatchId, BatchProgress, Credential, GenerationError, GenerationOutput,
    GenerationTask, JobItem, JobItemId, JobStatus, TaskError, TransitionError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::{BatchSettings, CapabilityNegotiator};

// ---------------------------------------------------------------------------
// Submission types
// ---------------------------------------------------------------------------

/// The submission was rejected before anything was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No tasks were supplied.
    #[error("Batch must contain at least one task")]
    EmptyBatch,

    /// A task violated its invariants.
    #[error("Task {index} is invalid: {source}")]
    InvalidTask {
        /// Position of the task in the submitted list.
        index: usize,
        /// What was wrong with it.
        source: TaskError,
    },

    /// A placeholder could not be moved to `loading`.
    #[error("Failed to schedule job item: {0}")]
    Schedule(#[from] TransitionError),
}

/// Waiting for the batch failed for a structural reason.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The background drain task panicked or was aborted.
    #[error("Batch drain task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Per-submission options.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Credential tried once before the pool on every executor run.
    pub override_credential: Option<Credential>,
    /// Token that abandons the batch between (and during) items.
    pub cancel: CancellationToken,
    /// Overrides [`BatchSettings::batch_timeout`] for this submission.
    pub timeout: Option<Duration>,
}

/// Something observable happened in a running batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// An item's first attempt is about to be issued.
    ItemStarted {
        /// The item.
        item_id: JobItemId,
        /// Index of its task.
        task_index: usize,
        /// Its replica number.
        replica: u32,
    },
    /// An item reached a terminal state.
    ItemFinished {
        /// Snapshot of the terminal item.
        item: JobItem,
        /// Counters including this item.
        progress: BatchProgress,
    },
}

/// Final outcome of a batch: every item, each `success` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// The batch.
    pub batch_id: BatchId,
    /// Every item in submission order.
    pub items: Vec<JobItem>,
    /// Final counters.
    pub progress: BatchProgress,
}

impl BatchReport {
    fn from_items(batch_id: BatchId, items: Vec<JobItem>) -> Self {
        let mut progress = BatchProgress::new(items.len());
        for item in &items {
            match item.status {
                JobStatus::Success => {
                    progress.completed += 1;
                    progress.succeeded += 1;
                }
                JobStatus::Error => {
                    progress.completed += 1;
                    progress.failed += 1;
                }
                JobStatus::Pending | JobStatus::Loading => {}
            }
        }
        Self {
            batch_id,
            items,
            progress,
        }
    }

    /// Items that ended in `success`.
    pub fn succeeded(&self) -> impl Iterator<Item = &JobItem> {
        self.items
            .iter()
            .filter(|item| item.status == JobStatus::Success)
    }

    /// Items that ended in `error`.
    pub fn failed(&self) -> impl Iterator<Item = &JobItem> {
        self.items.iter().filter(|item| item.status == JobStatus::Error)
    }

    /// Builds a resubmission covering only the failed items.
    ///
    /// `tasks` must be the list originally submitted. Each task with failures
    /// is repeated with its replication count set to the number of failed
    /// replicas.
    pub fn retry_tasks(&self, tasks: &[GenerationTask]) -> Vec<GenerationTask> {
        let mut failures: BTreeMap<usize, u32> = BTreeMap::new();
        for item in self.failed() {
            *failures.entry(item.task_index).or_default() += 1;
        }
        failures
            .into_iter()
            .filter_map(|(index, count)| {
                tasks.get(index).map(|task| {
                    let mut task = task.clone();
                    task.replication_count = count;
                    task
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running batch.
///
/// `items` holds the placeholders as returned at submission time (all
/// `loading`). Updates arrive through [`BatchHandle::next_event`]; the final
/// state comes from [`BatchHandle::wait`].
///
/// Dropping the handle cancels the batch. Its token is a child of the one in
/// [`SubmitOptions`], so the caller's token is left untouched.
pub struct BatchHandle {
    /// Identity of the batch.
    pub batch_id: BatchId,
    /// Placeholders, one per task replica, all `loading`.
    pub items: Vec<JobItem>,
    events: mpsc::UnboundedReceiver<BatchEvent>,
    cancel: CancellationToken,
    join: JoinHandle<Vec<JobItem>>,
    _cancel_on_drop: DropGuard,
}

impl BatchHandle {
    /// Requests cancellation. Unfinished items end as `error` (`cancelled`).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token controlling this batch.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receives the next event, or `None` once the batch has drained.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Waits for every item to become terminal.
    pub async fn wait(self) -> Result<BatchReport, BatchError> {
        let items = self.join.await?;
        Ok(BatchReport::from_items(self.batch_id, items))
    }

    /// Waits for completion, invoking `on_progress` after every terminal item.
    pub async fn wait_with_progress<F>(mut self, mut on_progress: F) -> Result<BatchReport, BatchError>
    where
        F: FnMut(&JobItem, BatchProgress),
    {
        while let Some(event) = self.events.recv().await {
            if let BatchEvent::ItemFinished { item, progress } = event {
                on_progress(&item, progress);
            }
        }
        self.wait().await
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Turns a list of generation tasks into terminal job items.
#[derive(Clone)]
pub struct BatchJobPipeline {
    negotiator: Arc<CapabilityNegotiator>,
    relay: Option<Arc<dyn AssetRelay>>,
    settings: BatchSettings,
}

impl BatchJobPipeline {
    /// Creates a pipeline without an asset relay.
    pub fn new(negotiator: CapabilityNegotiator, settings: BatchSettings) -> Self {
        Self {
            negotiator: Arc::new(negotiator),
            relay: None,
            settings,
        }
    }

    /// Enables relaying of remote assets after successful generation.
    pub fn with_relay(mut self, relay: Arc<dyn AssetRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// The settings in effect.
    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Submits `tasks` with default options.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, tasks: Vec<GenerationTask>) -> Result<BatchHandle, SubmitError> {
        self.submit_with(tasks, SubmitOptions::default())
    }

    /// Submits `tasks`, returning the placeholders immediately and draining
    /// the batch on a spawned task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_with(
        &self,
        tasks: Vec<GenerationTask>,
        options: SubmitOptions,
    ) -> Result<BatchHandle, SubmitError> {
        if tasks.is_empty() {
            return Err(SubmitError::EmptyBatch);
        }
        for (index, task) in tasks.iter().enumerate() {
            task.validate()
                .map_err(|source| SubmitError::InvalidTask { index, source })?;
        }

        let batch_id = BatchId::new_random();
        let items = tasks
            .iter()
            .enumerate()
            .flat_map(|(index, task)| {
                (0..task.replication_count).map(move |replica| {
                    let mut item = JobItem::new(index, replica);
                    item.start().map(|()| item)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            batch_id = %batch_id,
            tasks = tasks.len(),
            items = items.len(),
            "Batch submitted"
        );

        let cancel = options.cancel.child_token();
        let (tx, rx) = mpsc::unbounded_channel();
        let timeout = options.timeout.or(self.settings.batch_timeout);
        let drain = Drain {
            batch_id,
            negotiator: Arc::clone(&self.negotiator),
            relay: self.relay.clone(),
            settings: self.settings.clone(),
            override_credential: options.override_credential,
            cancel: cancel.clone(),
            deadline: timeout.map(|t| Instant::now() + t),
            events: tx,
        };
        let join = tokio::spawn(drain.run(tasks, items.clone()));

        Ok(BatchHandle {
            batch_id,
            items,
            events: rx,
            cancel: cancel.clone(),
            join,
            _cancel_on_drop: cancel.drop_guard(),
        })
    }
}

// ---------------------------------------------------------------------------
// Drain loop
// ---------------------------------------------------------------------------

/// State owned by the background task of one batch.
struct Drain {
    batch_id: BatchId,
    negotiator: Arc<CapabilityNegotiator>,
    relay: Option<Arc<dyn AssetRelay>>,
    settings: BatchSettings,
    override_credential: Option<Credential>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    events: mpsc::UnboundedSender<BatchEvent>,
}

impl Drain {
    async fn run(self, tasks: Vec<GenerationTask>, mut items: Vec<JobItem>) -> Vec<JobItem> {
        let mut progress = BatchProgress::new(items.len());
        let mut slots = items.iter_mut();

        for (task_index, task) in tasks.iter().enumerate() {
            if task_index > 0 && !self.settings.inter_task_delay.is_zero() {
                // An interrupted pause is picked up by the per-attempt check.
                let _ = self.pause(self.settings.inter_task_delay).await;
            }

            for _ in 0..task.replication_count {
                let Some(item) = slots.next() else {
                    error!(batch_id = %self.batch_id, "Placeholder list shorter than task replicas");
                    break;
                };
                self.process(task, item).await;

                if item.status == JobStatus::Success {
                    progress.succeeded += 1;
                } else {
                    progress.failed += 1;
                }
                progress.completed += 1;

                let _ = self.events.send(BatchEvent::ItemFinished {
                    item: item.clone(),
                    progress,
                });
            }
        }

        info!(
            batch_id = %self.batch_id,
            succeeded = progress.succeeded,
            failed = progress.failed,
            total = progress.total,
            "Batch drained"
        );
        items
    }

    /// Drives one item to a terminal state.
    async fn process(&self, task: &GenerationTask, item: &mut JobItem) {
        let _ = self.events.send(BatchEvent::ItemStarted {
            item_id: item.id,
            task_index: item.task_index,
            replica: item.replica,
        });

        let outcome = match self.generate(task, item).await {
            Ok(output) => {
                let output = self.relay_output(output, item).await;
                item.succeed(output)
            }
            Err(err) => {
                warn!(
                    batch_id = %self.batch_id,
                    item_id = %item.id,
                    attempts = item.attempts,
                    error = %err,
                    "Job item failed"
                );
                item.fail(err)
            }
        };
        if let Err(err) = outcome {
            error!(batch_id = %self.batch_id, error = %err, "Illegal job item transition");
        }
    }

    /// The item-level attempt loop.
    async fn generate(
        &self,
        task: &GenerationTask,
        item: &mut JobItem,
    ) -> Result<GenerationOutput, GenerationError> {
        let max_attempts = self.settings.attempts();

        loop {
            self.check_interrupted()?;
            item.attempts += 1;
            let attempt = item.attempts;

            let call = self
                .negotiator
                .generate(task, self.override_credential.as_ref());
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
                _ = wait_for(self.deadline) => Err(GenerationError::DeadlineExceeded),
                result = call => result,
            };

            match result {
                Ok(outcome) => {
                    info!(
                        batch_id = %self.batch_id,
                        item_id = %item.id,
                        attempt,
                        mode = %outcome.mode,
                        "Job item generated"
                    );
                    return Ok(outcome.value);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.settings.backoff_for(attempt, err.retry_after());
                    warn!(
                        batch_id = %self.batch_id,
                        item_id = %item.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying job item"
                    );
                    self.pause(delay).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Relays remote assets; on failure or interruption keeps the original and
    /// records a warning.
    async fn relay_output(&self, output: GenerationOutput, item: &mut JobItem) -> GenerationOutput {
        let Some(relay) = &self.relay else {
            return output;
        };
        let original = match &output {
            GenerationOutput::Asset(asset) if asset.is_remote() => asset,
            _ => return output,
        };

        let relayed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            _ = wait_for(self.deadline) => None,
            result = relay.relay(original) => Some(result),
        };
        let Some(result) = relayed else {
            warn!(item_id = %item.id, "Asset relay interrupted, keeping original reference");
            item.warn("asset relay interrupted, kept original reference");
            return output;
        };

        match result {
            Ok(relayed) => {
                debug!(item_id = %item.id, "Asset relayed");
                GenerationOutput::Asset(relayed)
            }
            Err(err) => {
                warn!(
                    item_id = %item.id,
                    error = %err,
                    "Asset relay failed, keeping original reference"
                );
                item.warn(format!("asset relay failed, kept original reference: {err}"));
                output
            }
        }
    }

    fn check_interrupted(&self) -> Result<(), GenerationError> {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(GenerationError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Sleeps for `delay` unless cancelled or the deadline passes first.
    async fn pause(&self, delay: Duration) -> Result<(), GenerationError> {
        if delay.is_zero() {
            return self.check_interrupted();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            _ = wait_for(self.deadline) => Err(GenerationError::DeadlineExceeded),
            _ = sleep(delay) => Ok(()),
        }
    }
}

/// Completes at `deadline`, or never when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
