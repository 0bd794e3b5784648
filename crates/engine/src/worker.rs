//! The polling dispatcher.
//!
//! One [`Dispatcher`] runs one task at a time: each [`tick`](Dispatcher::tick)
//! asks the store for the first ready task and hands it to the
//! [`TaskRunner`], waiting for the run to finish. [`run`](Dispatcher::run)
//! repeats ticks with a fixed sleep in between until its cancellation token
//! fires. Only one dispatcher should be active per store; the claim
//! compare-and-set keeps a second one from double-running a task, nothing
//! more.
//!
//! Because one dispatcher runs one task at a time, any task still
//! `in_progress` between two ticks is stale. The first tick, and the tick
//! after any aborted one, requeues such tasks and retries the aggregate
//! refreshes that did not go through.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use db::Store;
use handlers::HandlerRegistry;

use crate::runner::{TaskOutcome, TaskRunner};
use crate::time::TimeSource;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fixed delay between two polls.
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// No task was ready.
    Idle,
    /// A ready task was handed to the runner.
    Ran {
        task_id: Uuid,
        workflow_id: Uuid,
        outcome: TaskOutcome,
    },
}

/// Cleanup owed after a tick was aborted by a store error.
#[derive(Debug, Default)]
struct Recovery {
    /// Requeue tasks left `in_progress`.
    sweep: bool,
    /// Workflows whose aggregate may be stale.
    refresh: BTreeSet<Uuid>,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    runner: TaskRunner,
    time: Arc<dyn TimeSource>,
    config: DispatcherConfig,
    recovery: Mutex<Recovery>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        registry: HandlerRegistry,
        time: Arc<dyn TimeSource>,
        config: DispatcherConfig,
    ) -> Self {
        let runner = TaskRunner::new(store.clone(), registry, time.clone());
        Self {
            store,
            runner,
            time,
            config,
            recovery: Mutex::new(Recovery {
                sweep: true,
                refresh: BTreeSet::new(),
            }),
        }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Poll once and run the selected task, if any, to completion.
    ///
    /// # Errors
    /// Only store failures; a failing task is reported through
    /// [`Tick::Ran`] with a [`TaskOutcome::Failed`] outcome. After an error
    /// the next tick first repairs what the aborted one left behind.
    pub async fn tick(&self) -> Result<Tick, EngineError> {
        self.recover().await?;

        let Some(task) = self.store.next_ready_task().await? else {
            return Ok(Tick::Idle);
        };

        debug!(task_id = %task.id, workflow_id = %task.workflow_id, "selected ready task");
        let outcome = match self.runner.run(&task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    task_id = %task.id,
                    workflow_id = %task.workflow_id,
                    step = task.name.as_deref().unwrap_or("<unnamed>"),
                    error = %e,
                    "task run aborted"
                );
                let mut recovery = self.recovery.lock().await;
                recovery.sweep = true;
                recovery.refresh.insert(task.workflow_id);
                return Err(e);
            }
        };

        Ok(Tick::Ran {
            task_id: task.id,
            workflow_id: task.workflow_id,
            outcome,
        })
    }

    /// Requeue stale claims and refresh workflows an aborted tick left
    /// behind. Work that fails again stays owed.
    async fn recover(&self) -> Result<(), EngineError> {
        let mut recovery = self.recovery.lock().await;

        if recovery.sweep {
            let requeued = self.store.requeue_in_progress().await?;
            if requeued > 0 {
                warn!(requeued, "requeued tasks left in progress");
            }
            recovery.sweep = false;
        }

        while let Some(&workflow_id) = recovery.refresh.first() {
            self.runner.refresh_workflow(workflow_id).await?;
            recovery.refresh.remove(&workflow_id);
        }
        Ok(())
    }

    /// Tick until no task is ready. Returns the number of tasks run.
    pub async fn drain(&self) -> Result<usize, EngineError> {
        let mut ran = 0usize;
        loop {
            match self.tick().await? {
                Tick::Idle => return Ok(ran),
                Tick::Ran { outcome: TaskOutcome::Skipped, .. } => {}
                Tick::Ran { .. } => ran += 1,
            }
        }
    }

    /// Poll forever, sleeping `poll_interval` after every tick, until
    /// `cancel` fires.
    ///
    /// Task failures and store errors are logged and never end the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(poll_interval = ?self.config.poll_interval, "dispatcher started");

        while !cancel.is_cancelled() {
            match self.tick().await {
                Ok(Tick::Idle) => debug!("no ready task"),
                Ok(Tick::Ran { task_id, workflow_id, outcome }) => match outcome {
                    TaskOutcome::Completed { .. } => {
                        info!(%task_id, %workflow_id, "task completed");
                    }
                    TaskOutcome::Failed { failure } => {
                        warn!(%task_id, %workflow_id, error = %failure, "task failed");
                    }
                    TaskOutcome::Skipped => {
                        debug!(%task_id, %workflow_id, "task claimed elsewhere");
                    }
                },
                Err(e) => {
                    error!(error = %e, "dispatcher tick aborted; retrying after poll interval");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.time.sleep(self.config.poll_interval) => {}
            }
        }

        info!("dispatcher stopped");
    }
}
