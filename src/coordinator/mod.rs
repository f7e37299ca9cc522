//! Concurrency coordinator
//!
//! Runs the probe units and technique adapters of one task with bounded
//! parallelism and waits for every submitted unit before the task moves on
//! to consolidation.

pub mod accumulator;

pub use accumulator::{normalize_hostname, AccumulatorKey, ResultAccumulator};

use log::{debug, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPhase {
    Idle,
    FanningOut,
    AwaitingCompletions,
    Consolidating,
    Done,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPhase::Idle => "idle",
            TaskPhase::FanningOut => "fanning_out",
            TaskPhase::AwaitingCompletions => "awaiting_completions",
            TaskPhase::Consolidating => "consolidating",
            TaskPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Forward-only phase tracker for a task
#[derive(Debug)]
pub struct PhaseTracker {
    label: String,
    phase: TaskPhase,
}

impl PhaseTracker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            phase: TaskPhase::Idle,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Move to `next`. Phases only move forward; a backwards request is
    /// ignored and logged.
    pub fn advance(&mut self, next: TaskPhase) {
        if next <= self.phase {
            warn!(
                "[{}] ignoring phase change {} -> {}",
                self.label, self.phase, next
            );
            return;
        }
        debug!("[{}] {} -> {}", self.label, self.phase, next);
        self.phase = next;
    }
}

/// Bookkeeping for one coordinator run
#[derive(Debug, Clone, Default)]
pub struct TaskReport {
    pub label: String,
    /// Units handed to the scheduler
    pub submitted: usize,
    /// Units that returned normally
    pub completed: usize,
    /// Entries that were new to the accumulator
    pub contributed: usize,
    /// Units that panicked
    pub failed: usize,
    /// Units aborted because of cancellation or the task deadline
    pub abandoned: usize,
    /// Units never started because submission stopped
    pub not_submitted: usize,
    pub cancelled: bool,
    pub deadline_hit: bool,
    pub elapsed: Duration,
}

impl TaskReport {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Every submitted unit returned, failed, or was abandoned
    pub fn is_settled(&self) -> bool {
        self.completed + self.failed + self.abandoned == self.submitted
    }

    fn record(&mut self, joined: std::result::Result<usize, JoinError>, aborted: bool) {
        match joined {
            Ok(added) => {
                // Finished between the abort request and the abort itself
                if aborted {
                    self.abandoned = self.abandoned.saturating_sub(1);
                }
                self.completed += 1;
                self.contributed += added;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                self.failed += 1;
                warn!("[{}] unit failed: {}", self.label, e);
            }
        }
    }
}

/// Bounded-parallel runner for the units of one task
#[derive(Debug, Clone)]
pub struct Coordinator {
    workers: usize,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            deadline: None,
            cancel,
        }
    }

    /// Abandon whatever is still running after `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `units`, merging each unit's output into `accumulator` as it
    /// completes. Returns once every submitted unit has returned, failed,
    /// or been abandoned.
    ///
    /// Units are lazy futures; a unit starts only once it holds a worker
    /// permit. Cancellation stops submission immediately and aborts
    /// in-flight units, which drops (and so kills) any child processes
    /// they own.
    pub async fn run<T, I, Fut>(
        &self,
        label: &str,
        units: I,
        accumulator: &ResultAccumulator<T>,
    ) -> TaskReport
    where
        T: AccumulatorKey + Clone + Send + 'static,
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Vec<T>> + Send + 'static,
    {
        let started = Instant::now();
        let mut report = TaskReport::new(label);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set: JoinSet<usize> = JoinSet::new();

        let deadline = self.deadline;
        let deadline_reached = async move {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_reached);

        let mut units = units.into_iter();
        debug!("[{}] fanning out with {} workers", label, self.workers);

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = &mut deadline_reached => {
                    report.deadline_hit = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(unit) = units.next() else {
                break;
            };

            while let Some(joined) = set.try_join_next() {
                report.record(joined, false);
            }

            let accumulator = accumulator.clone();
            set.spawn(async move {
                let items = unit.await;
                drop(permit);
                accumulator.extend(items)
            });
            report.submitted += 1;
        }

        if report.cancelled || report.deadline_hit {
            report.not_submitted = units.count();
            abandon(&mut set, &mut report);
            warn!(
                "[{}] {} - abandoning {} running units, {} never started",
                label,
                if report.cancelled { "cancelled" } else { "deadline reached" },
                report.abandoned,
                report.not_submitted
            );
        }

        debug!("[{}] awaiting {} completions", label, set.len());
        while !set.is_empty() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !report.cancelled && !report.deadline_hit => {
                    report.cancelled = true;
                    abandon(&mut set, &mut report);
                    warn!("[{}] cancelled while awaiting completions", label);
                }
                _ = &mut deadline_reached, if !report.cancelled && !report.deadline_hit => {
                    report.deadline_hit = true;
                    abandon(&mut set, &mut report);
                    warn!("[{}] deadline reached while awaiting completions", label);
                }
                joined = set.join_next() => {
                    if let Some(joined) = joined {
                        let aborted = report.cancelled || report.deadline_hit;
                        report.record(joined, aborted);
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        debug!(
            "[{}] settled: {} submitted, {} completed, {} failed, {} abandoned, {} new entries in {:?}",
            label,
            report.submitted,
            report.completed,
            report.failed,
            report.abandoned,
            report.contributed,
            report.elapsed
        );
        report
    }
}

/// Reap units that already finished, then abort the rest
fn abandon(set: &mut JoinSet<usize>, report: &mut TaskReport) {
    while let Some(joined) = set.try_join_next() {
        report.record(joined, false);
    }
    report.abandoned += set.len();
    set.abort_all();
}
