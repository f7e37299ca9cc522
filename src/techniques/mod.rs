//! Technique adapters and fallback chains
//!
//! A technique is one way of producing results for a task: an external tool
//! invocation, a certificate-log lookup, or a fan-out of probe units. Every
//! technique reports a [`TechniqueOutcome`] instead of an error.

pub mod inventory;
pub mod process;
pub mod tools;

pub use inventory::ToolInventory;
pub use process::{ProcessOutput, ProcessRunner, ToolInvocation};
pub use tools::{NmapProfile, ProcessTechnique, ToolKind};

use crate::target::Target;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a technique invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueStatus {
    Ok,
    ToolAbsent,
    Timeout,
    NonzeroExit(Option<i32>),
    /// Anything else that kept the technique from producing output
    /// (spawn failure, unreachable service, unparsable response)
    Failed(String),
    Cancelled,
}

impl TechniqueStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, TechniqueStatus::Ok)
    }
}

impl fmt::Display for TechniqueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TechniqueStatus::Ok => write!(f, "ok"),
            TechniqueStatus::ToolAbsent => write!(f, "tool_absent"),
            TechniqueStatus::Timeout => write!(f, "timeout"),
            TechniqueStatus::NonzeroExit(Some(code)) => write!(f, "nonzero_exit({})", code),
            TechniqueStatus::NonzeroExit(None) => write!(f, "nonzero_exit(signal)"),
            TechniqueStatus::Failed(reason) => write!(f, "failed({})", reason),
            TechniqueStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Output of one technique invocation
#[derive(Debug, Clone)]
pub struct TechniqueOutcome<T> {
    pub technique: String,
    pub status: TechniqueStatus,
    /// Recognized raw lines, in output order
    pub raw_lines: Vec<String>,
    /// Parsed entries, in output order
    pub entries: Vec<T>,
    /// Complete tool output, kept for tools whose report is worth saving
    pub raw_output: Option<String>,
    pub elapsed: Duration,
}

impl<T> TechniqueOutcome<T> {
    pub fn new(technique: impl Into<String>, status: TechniqueStatus, elapsed: Duration) -> Self {
        Self {
            technique: technique.into(),
            status,
            raw_lines: Vec::new(),
            entries: Vec::new(),
            raw_output: None,
            elapsed,
        }
    }

    pub fn ok(technique: impl Into<String>, entries: Vec<T>, elapsed: Duration) -> Self {
        Self {
            entries,
            ..Self::new(technique, TechniqueStatus::Ok, elapsed)
        }
    }

    pub fn with_raw_lines(mut self, raw_lines: Vec<String>) -> Self {
        self.raw_lines = raw_lines;
        self
    }

    pub fn with_raw_output(mut self, raw_output: impl Into<String>) -> Self {
        self.raw_output = Some(raw_output.into());
        self
    }

    /// Ok and produced at least one entry
    pub fn is_usable(&self) -> bool {
        self.status.is_ok() && !self.entries.is_empty()
    }

    /// Log the outcome at the level its status deserves
    pub fn log(&self, target: &Target) {
        match &self.status {
            TechniqueStatus::Ok => info!(
                "{} found {} result(s) for {} in {:?}",
                self.technique,
                self.entries.len(),
                target,
                self.elapsed
            ),
            TechniqueStatus::ToolAbsent => {
                info!("{} not found, skipping", self.technique)
            }
            TechniqueStatus::Cancelled => debug!("{} cancelled for {}", self.technique, target),
            status => warn!("{} for {}: {}", self.technique, target, status),
        }
    }
}

/// A single technique adapter
#[async_trait]
pub trait Technique<T>: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the technique can run at all in this environment
    fn is_available(&self) -> bool {
        true
    }

    async fn run(&self, target: &Target) -> TechniqueOutcome<T>;
}

/// Record of one attempt inside a fallback chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub technique: String,
    pub status: TechniqueStatus,
    pub entries: usize,
    pub elapsed: Duration,
}

/// Result of running a fallback chain
#[derive(Debug, Clone)]
pub struct ChainOutcome<T> {
    /// Technique whose entries were kept, if any produced usable output
    pub winner: Option<String>,
    pub entries: Vec<T>,
    /// Full output of the winning technique, when it kept one
    pub raw_output: Option<String>,
    pub attempts: Vec<Attempt>,
    pub cancelled: bool,
}

impl<T> ChainOutcome<T> {
    fn empty() -> Self {
        Self {
            winner: None,
            entries: Vec::new(),
            raw_output: None,
            attempts: Vec::new(),
            cancelled: false,
        }
    }
}

/// Ordered list of techniques tried until one yields usable results
pub struct FallbackChain<T> {
    label: String,
    techniques: Vec<Arc<dyn Technique<T>>>,
}

impl<T: Send + 'static> FallbackChain<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            techniques: Vec::new(),
        }
    }

    pub fn push(&mut self, technique: Arc<dyn Technique<T>>) {
        self.techniques.push(technique);
    }

    pub fn with(mut self, technique: Arc<dyn Technique<T>>) -> Self {
        self.push(technique);
        self
    }

    pub fn len(&self) -> usize {
        self.techniques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.techniques.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.techniques.iter().map(|t| t.name().to_string()).collect()
    }

    /// Try each technique in order until one is usable.
    ///
    /// Unavailable techniques are recorded as `tool_absent` without being
    /// invoked. If every technique fails the outcome is simply empty.
    pub async fn run(&self, target: &Target, cancel: &CancellationToken) -> ChainOutcome<T> {
        let mut outcome = ChainOutcome::empty();

        for technique in &self.techniques {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            if !technique.is_available() {
                debug!("[{}] {} unavailable, deferring", self.label, technique.name());
                outcome.attempts.push(Attempt {
                    technique: technique.name().to_string(),
                    status: TechniqueStatus::ToolAbsent,
                    entries: 0,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = technique.run(target) => Some(result),
            };
            let Some(result) = result else {
                outcome.attempts.push(Attempt {
                    technique: technique.name().to_string(),
                    status: TechniqueStatus::Cancelled,
                    entries: 0,
                    elapsed: Duration::ZERO,
                });
                outcome.cancelled = true;
                break;
            };

            result.log(target);
            outcome.attempts.push(Attempt {
                technique: result.technique.clone(),
                status: result.status.clone(),
                entries: result.entries.len(),
                elapsed: result.elapsed,
            });

            if result.is_usable() {
                outcome.winner = Some(result.technique);
                outcome.entries = result.entries;
                outcome.raw_output = result.raw_output;
                break;
            }
            debug!(
                "[{}] {} gave nothing usable, trying next technique",
                self.label,
                technique.name()
            );
        }

        if outcome.winner.is_none() && !outcome.cancelled {
            info!(
                "[{}] no technique produced results for {}",
                self.label, target
            );
        }
        outcome
    }
}
