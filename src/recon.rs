//! Run orchestration
//!
//! Stages run in order: subdomains, port scan per host (root first), tech
//! fingerprinting, report. Cancellation is checked before every stage and
//! every host; whatever was gathered up to that point is still reported.

use crate::config::ReconConfig;
use crate::output::ReportWriter;
use crate::portscan::{PortScanReport, PortScanner};
use crate::subdomain::SubdomainEnumerator;
use crate::target::Target;
use crate::tech::{TechDetector, TechProfile};
use crate::techniques::{ProcessRunner, ToolInventory, ToolKind};
use crate::Result;
use chrono::{DateTime, Local};
use colored::*;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct ReconResults {
    pub target: Target,
    pub started_at: DateTime<Local>,
    pub subdomains: Vec<String>,
    /// Subdomain sources that ran
    pub subdomain_sources: Vec<String>,
    /// One report per scanned host, root first
    pub ports: Vec<PortScanReport>,
    pub tech_stack: BTreeMap<String, TechProfile>,
    pub tools_available: Vec<String>,
    pub tools_missing: Vec<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl ReconResults {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            started_at: Local::now(),
            subdomains: Vec::new(),
            subdomain_sources: Vec::new(),
            ports: Vec::new(),
            tech_stack: BTreeMap::new(),
            tools_available: Vec::new(),
            tools_missing: Vec::new(),
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Root followed by every discovered subdomain
    pub fn hosts(&self) -> Vec<Target> {
        std::iter::once(self.target.clone())
            .chain(self.subdomains.iter().cloned().map(Target::from_host))
            .collect()
    }

    pub fn open_port_count(&self) -> usize {
        self.ports.iter().map(|report| report.ports.len()).sum()
    }
}

/// A reconnaissance run against one target
pub struct Recon {
    config: ReconConfig,
    target: Target,
    inventory: Arc<ToolInventory>,
    cancel: CancellationToken,
}

impl Recon {
    /// Validate the configuration and probe once for installed tools
    pub fn new(config: ReconConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        let target = Target::parse(&config.target)?;
        let inventory = if config.use_tools {
            ToolInventory::detect(ToolKind::all_binaries())
        } else {
            ToolInventory::default()
        };
        Ok(Self {
            config,
            target,
            inventory: Arc::new(inventory),
            cancel,
        })
    }

    /// Use a prepared tool inventory instead of the PATH scan
    pub fn with_inventory(mut self, inventory: ToolInventory) -> Self {
        self.inventory = Arc::new(inventory);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn inventory(&self) -> &ToolInventory {
        &self.inventory
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn stage(&self, title: &str) -> bool {
        if self.cancel.is_cancelled() {
            warn!("Interrupted, skipping {}", title);
            return false;
        }
        info!("Starting {}", title);
        if self.config.realtime_notifications {
            println!("\n{}", format!("[*] {}", title).cyan().bold());
        }
        true
    }

    /// Run every enabled stage, then write the report files.
    ///
    /// The output directory is created before any scanning so an unwritable
    /// location fails fast. Returns the results and the summary report path.
    pub async fn run(&self) -> Result<(ReconResults, PathBuf)> {
        let mut results = ReconResults::new(self.target.clone());
        let writer = ReportWriter::create(&self.config.output_dir, &self.target, results.started_at)?;
        info!("Writing results to {}", writer.dir().display());

        self.collect(&mut results).await?;

        let report = writer.write_all(&results)?;
        Ok((results, report))
    }

    /// Run the stages without writing anything
    pub async fn collect(&self, results: &mut ReconResults) -> Result<()> {
        let started = Instant::now();
        results.tools_available = self.inventory.available().into_iter().map(String::from).collect();
        results.tools_missing = self.inventory.missing().into_iter().map(String::from).collect();
        if self.config.use_tools && !results.tools_missing.is_empty() {
            info!("Tools not installed: {}", results.tools_missing.join(", "));
        }

        // Build every stage up front so configuration faults surface before any work
        let runner = ProcessRunner::new(Arc::clone(&self.inventory));
        let enumerator = SubdomainEnumerator::new(&self.config, runner.clone(), self.cancel.clone())?;
        let scanner = PortScanner::new(&self.config, runner.clone(), self.cancel.clone());
        let detector = TechDetector::new(&self.config, runner, self.cancel.clone())?;

        if !self.config.skip_subdomains && self.stage("Subdomain enumeration") {
            let report = enumerator.enumerate(&self.target).await;
            results.subdomains = report.subdomains;
            results.subdomain_sources = report.techniques;
        }

        let hosts = results.hosts();

        if !self.config.skip_ports && self.stage("Port scanning") {
            for host in &hosts {
                if self.cancel.is_cancelled() {
                    break;
                }
                results.ports.push(scanner.scan(host).await);
            }
        }

        if !self.config.skip_tech && self.stage("Technology detection") {
            let names: Vec<String> = hosts.iter().map(Target::to_string).collect();
            results.tech_stack = detector.detect(&names).await;
        }

        results.cancelled = self.cancel.is_cancelled();
        results.elapsed = started.elapsed();
        info!(
            "{} subdomain(s), {} open port(s) across {} host(s), {} fingerprint(s) in {:.2}s",
            results.subdomains.len(),
            results.open_port_count(),
            results.ports.len(),
            results.tech_stack.len(),
            results.elapsed.as_secs_f64()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReconError;

    fn config(output: &std::path::Path) -> ReconConfig {
        let mut config = ReconConfig::new("127.0.0.1")
            .with_tools(false)
            .with_banner_grab(false)
            .with_timeout(200)
            .with_output_dir(output);
        config.skip_tech = true;
        config.realtime_notifications = false;
        config
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let config = ReconConfig::new("https://exa mple.com/");
        let err = Recon::new(config, CancellationToken::new()).err().unwrap();
        assert!(matches!(err, ReconError::InvalidTarget(_)));
    }

    #[test]
    fn test_hosts_put_root_first() {
        let mut results = ReconResults::new(Target::parse("example.com").unwrap());
        results.subdomains = vec!["a.example.com".into(), "b.example.com".into()];
        let hosts: Vec<String> = results.hosts().iter().map(Target::to_string).collect();
        assert_eq!(hosts, vec!["example.com", "a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn test_cancelled_run_still_reports() {
        let output = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let recon = Recon::new(config(output.path()), cancel).unwrap();
        let (results, report) = recon.run().await.unwrap();

        assert!(results.cancelled);
        assert!(results.ports.is_empty());
        assert!(report.is_file());
    }

    #[tokio::test]
    async fn test_unwritable_output_fails_before_scanning() {
        let base = tempfile::tempdir().unwrap();
        let blocker = base.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let recon = Recon::new(config(&blocker), CancellationToken::new()).unwrap();
        let err = recon.run().await.unwrap_err();
        assert!(matches!(err, ReconError::OutputError(_)));
    }
}
