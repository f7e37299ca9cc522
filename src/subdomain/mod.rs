//! Subdomain discovery task
//!
//! Brute-force probes, the Certificate Transparency lookup, and every
//! installed discovery tool run side by side under one coordinator and feed
//! a single accumulator. Nothing here is a fallback chain: all sources
//! contribute.

pub mod crtsh;
pub mod probe;
pub mod wordlist;

pub use crtsh::CtLookup;
pub use probe::{Evidence, HttpProbe};

use crate::config::{ReconConfig, CT_TIMEOUT};
use crate::consolidate::Consolidator;
use crate::coordinator::{Coordinator, PhaseTracker, ResultAccumulator, TaskPhase};
use crate::target::Target;
use crate::techniques::{ProcessRunner, ProcessTechnique, Technique, ToolKind};
use crate::Result;
use colored::*;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Canonical subdomain result for one root domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdomainReport {
    pub root: String,
    pub subdomains: Vec<String>,
    /// Sources that were run
    pub techniques: Vec<String>,
    /// Entries accumulated before consolidation
    pub raw_count: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Concurrent subdomain discovery
#[derive(Clone)]
pub struct SubdomainEnumerator {
    probe: Option<HttpProbe>,
    labels: Vec<String>,
    techniques: Vec<Arc<dyn Technique<String>>>,
    workers: usize,
    deadline: Option<Duration>,
    notify: bool,
    cancel: CancellationToken,
}

impl SubdomainEnumerator {
    /// Build the enumerator for a run.
    ///
    /// Fails only when an explicitly requested wordlist cannot be read or the
    /// HTTP clients cannot be built.
    pub fn new(config: &ReconConfig, runner: ProcessRunner, cancel: CancellationToken) -> Result<Self> {
        let extra = match config.wordlist_source() {
            Some((path, _)) => wordlist::load_wordlist(path)?,
            None => Vec::new(),
        };

        let probe = HttpProbe::new(config.http_timeout_duration(), config.timeout_duration())?;

        let mut techniques: Vec<Arc<dyn Technique<String>>> =
            vec![Arc::new(CtLookup::new(config.ct_url.clone(), CT_TIMEOUT)?)];
        if config.use_tools {
            for kind in ToolKind::SUBDOMAIN_TOOLS {
                techniques.push(Arc::new(ProcessTechnique::subdomains(
                    kind,
                    config.tool_timeout(kind),
                    runner.clone(),
                )));
            }
        }

        Ok(Self {
            probe: Some(probe),
            labels: wordlist::candidate_labels(extra),
            techniques,
            workers: config.threads,
            deadline: config.task_deadline_duration(),
            notify: config.realtime_notifications,
            cancel,
        })
    }

    /// Replace the brute-force labels
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Replace the probe used for brute force
    pub fn with_probe(mut self, probe: HttpProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn without_brute_force(mut self) -> Self {
        self.probe = None;
        self
    }

    /// Drop the CT lookup and every tool
    pub fn without_passive_sources(mut self) -> Self {
        self.techniques.clear();
        self
    }

    pub fn with_technique(mut self, technique: Arc<dyn Technique<String>>) -> Self {
        self.techniques.push(technique);
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Names of the sources that would run, after the capability probe
    pub fn available_techniques(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .techniques
            .iter()
            .filter(|t| t.is_available())
            .map(|t| t.name().to_string())
            .collect();
        if self.probe.is_some() && !self.labels.is_empty() {
            names.insert(0, "brute-force".to_string());
        }
        names
    }

    fn technique_unit(
        &self,
        technique: Arc<dyn Technique<String>>,
        root: &Target,
    ) -> BoxFuture<'static, Vec<String>> {
        let root = root.clone();
        let notify = self.notify;
        async move {
            let outcome = technique.run(&root).await;
            outcome.log(&root);
            if notify && !outcome.entries.is_empty() {
                println!(
                    "{}",
                    format!("[+] {}: {} name(s)", outcome.technique, outcome.entries.len()).green()
                );
            }
            outcome.entries
        }
        .boxed()
    }

    fn probe_unit(
        &self,
        probe: HttpProbe,
        fqdn: String,
        accumulator: ResultAccumulator<String>,
    ) -> BoxFuture<'static, Vec<String>> {
        let notify = self.notify;
        async move {
            // Another source already reported it
            if accumulator.contains(&fqdn) {
                return Vec::new();
            }
            match probe.check(&fqdn).await {
                Some(evidence) => {
                    debug!("{} exists ({:?})", fqdn, evidence);
                    if notify {
                        println!("{}", format!("[+] Found: {}", fqdn).green());
                    }
                    vec![fqdn]
                }
                None => Vec::new(),
            }
        }
        .boxed()
    }

    /// Discover subdomains of `root`
    pub async fn enumerate(&self, root: &Target) -> SubdomainReport {
        let started = Instant::now();
        let label = format!("subdomains:{}", root.host());
        let mut phase = PhaseTracker::new(&label);

        if root.host().parse::<IpAddr>().is_ok() {
            info!("{} is an IP address, skipping subdomain discovery", root.host());
            return SubdomainReport {
                root: root.host().to_string(),
                subdomains: Vec::new(),
                techniques: Vec::new(),
                raw_count: 0,
                cancelled: false,
                elapsed: started.elapsed(),
            };
        }

        phase.advance(TaskPhase::FanningOut);
        let accumulator: ResultAccumulator<String> = ResultAccumulator::new();
        let mut units: Vec<BoxFuture<'static, Vec<String>>> = Vec::new();

        // Long-running sources first so they hold their workers from the start
        for technique in &self.techniques {
            if technique.is_available() {
                units.push(self.technique_unit(Arc::clone(technique), root));
            } else {
                info!("{} not found, skipping", technique.name());
            }
        }
        if let Some(probe) = &self.probe {
            for label in &self.labels {
                let fqdn = format!("{}.{}", label, root.host());
                units.push(self.probe_unit(probe.clone(), fqdn, accumulator.clone()));
            }
        }
        info!(
            "Enumerating {} with {} unit(s) on {} worker(s)",
            root.host(),
            units.len(),
            self.workers
        );

        let mut coordinator = Coordinator::new(self.workers, self.cancel.clone());
        if let Some(deadline) = self.deadline {
            coordinator = coordinator.with_deadline(deadline);
        }
        phase.advance(TaskPhase::AwaitingCompletions);
        let task = coordinator.run(&label, units, &accumulator).await;

        phase.advance(TaskPhase::Consolidating);
        let raw = accumulator.snapshot();
        let subdomains = Consolidator::subdomains(root, &raw);
        phase.advance(TaskPhase::Done);

        info!(
            "{} subdomain(s) for {} ({} raw, {} failed unit(s), {} abandoned)",
            subdomains.len(),
            root.host(),
            raw.len(),
            task.failed,
            task.abandoned
        );
        SubdomainReport {
            root: root.host().to_string(),
            subdomains,
            techniques: self.available_techniques(),
            raw_count: raw.len(),
            cancelled: task.cancelled,
            elapsed: started.elapsed(),
        }
    }
}
