//! Port scanning task
//!
//! External scanners are tried first in fallback order; the connect sweep
//! closes the chain so a run without any tools still finds open ports.

pub mod sweep;

pub use sweep::ConnectSweep;

use crate::config::ReconConfig;
use crate::consolidate::Consolidator;
use crate::coordinator::{Coordinator, PhaseTracker, ResultAccumulator, TaskPhase};
use crate::network::{BannerGrabber, PortResult, Protocol, ServiceDatabase, TcpConnectProbe};
use crate::target::Target;
use crate::techniques::{
    Attempt, FallbackChain, ProcessRunner, ProcessTechnique, Technique, ToolKind,
};
use crate::top_ports::{get_port_list, PortListType};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Canonical port result for one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanReport {
    pub host: String,
    pub ports: Vec<PortResult>,
    /// Technique whose results were kept
    pub technique: Option<String>,
    pub attempts: Vec<Attempt>,
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Full report of the winning scanner (nmap only), saved beside the summary
    #[serde(skip)]
    pub raw_output: Option<String>,
}

/// Port scanning with tool fallback and banner augmentation
#[derive(Debug, Clone)]
pub struct PortScanner {
    services: ServiceDatabase,
    candidates: Vec<u16>,
    probe_timeout: Duration,
    banners: Option<BannerGrabber>,
    runner: Option<ProcessRunner>,
    tools: Vec<(ToolKind, Duration)>,
    workers: usize,
    deadline: Option<Duration>,
    notify: bool,
    cancel: CancellationToken,
}

impl PortScanner {
    pub fn new(config: &ReconConfig, runner: ProcessRunner, cancel: CancellationToken) -> Self {
        let list = if config.top_ports {
            PortListType::Combined
        } else {
            PortListType::Common
        };
        let tools = [
            ToolKind::Nmap(config.scan_profile),
            ToolKind::Masscan,
            ToolKind::Unicornscan,
        ]
        .into_iter()
        .map(|kind| (kind, config.tool_timeout(kind)))
        .collect();

        Self {
            services: ServiceDatabase::new(),
            candidates: get_port_list(list),
            probe_timeout: config.timeout_duration(),
            banners: config
                .banner_grab
                .then(|| BannerGrabber::new(config.banner_timeout_duration())),
            runner: config.use_tools.then_some(runner),
            tools,
            workers: config.threads,
            deadline: config.task_deadline_duration(),
            notify: config.realtime_notifications,
            cancel,
        }
    }

    /// Replace the candidate port list for the connect sweep
    pub fn with_candidates(mut self, candidates: Vec<u16>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Replace the port to service-name table
    pub fn with_services(mut self, services: ServiceDatabase) -> Self {
        self.services = services;
        self
    }

    /// Skip the external scanners and sweep directly
    pub fn without_tools(mut self) -> Self {
        self.runner = None;
        self
    }

    pub fn without_banners(mut self) -> Self {
        self.banners = None;
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    fn coordinator(&self) -> Coordinator {
        let coordinator = Coordinator::new(self.workers, self.cancel.clone());
        match self.deadline {
            Some(deadline) => coordinator.with_deadline(deadline),
            None => coordinator,
        }
    }

    /// Techniques tried for `target`, in order
    pub fn chain(&self, target: &Target) -> FallbackChain<PortResult> {
        let mut chain = FallbackChain::new(format!("ports:{}", target.host()));

        // An explicit port narrows the task to a single connect probe
        let candidates = match target.port() {
            Some(port) => vec![port],
            None => {
                if let Some(runner) = &self.runner {
                    for (kind, timeout) in &self.tools {
                        let technique: Arc<dyn Technique<PortResult>> =
                            Arc::new(ProcessTechnique::ports(*kind, *timeout, runner.clone()));
                        chain.push(technique);
                    }
                }
                self.candidates.clone()
            }
        };

        let probe = TcpConnectProbe::new(self.probe_timeout, self.services.clone());
        let sweep = ConnectSweep::new(probe, candidates, self.coordinator())
            .with_notifications(self.notify);
        chain.push(Arc::new(sweep));
        chain
    }

    /// Scan one host and return its canonical open-port records
    pub async fn scan(&self, target: &Target) -> PortScanReport {
        let started = Instant::now();
        let label = format!("ports:{}", target.host());
        let mut phase = PhaseTracker::new(&label);

        phase.advance(TaskPhase::FanningOut);
        let chain = self.chain(target);
        debug!("[{}] chain: {}", label, chain.names().join(" -> "));
        let outcome = chain.run(target, &self.cancel).await;

        phase.advance(TaskPhase::AwaitingCompletions);
        let mut ports = self.label_services(Consolidator::ports(&outcome.entries));
        if let Some(grabber) = &self.banners {
            if !ports.is_empty() && !self.cancel.is_cancelled() {
                ports = self.augment(grabber, target.host(), ports).await;
            }
        }

        phase.advance(TaskPhase::Consolidating);
        let ports = Consolidator::ports(&ports);
        phase.advance(TaskPhase::Done);

        info!(
            "{} open port(s) on {} via {}",
            ports.len(),
            target.host(),
            outcome.winner.as_deref().unwrap_or("none")
        );
        PortScanReport {
            host: target.host().to_string(),
            ports,
            technique: outcome.winner,
            attempts: outcome.attempts,
            cancelled: outcome.cancelled || self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
            raw_output: outcome.raw_output,
        }
    }

    /// Label TCP records that came back from a tool without a service name
    fn label_services(&self, ports: Vec<PortResult>) -> Vec<PortResult> {
        ports
            .into_iter()
            .map(|record| {
                if record.service.is_some() || record.protocol != Protocol::Tcp {
                    return record;
                }
                match self.services.get_tcp_service(record.port) {
                    Some(name) => {
                        let name = name.to_string();
                        record.with_service(name)
                    }
                    None => record,
                }
            })
            .collect()
    }

    /// One bounded banner read per open TCP port without a banner yet
    async fn augment(
        &self,
        grabber: &BannerGrabber,
        host: &str,
        ports: Vec<PortResult>,
    ) -> Vec<PortResult> {
        let accumulator: ResultAccumulator<PortResult> = ResultAccumulator::new();
        let units = ports
            .iter()
            .filter(|record| record.protocol == Protocol::Tcp && record.banner.is_none())
            .cloned()
            .map(|record| {
                let grabber = grabber.clone();
                let host = host.to_string();
                async move {
                    match grabber.grab(&host, record.port).await {
                        Some(banner) => vec![record.with_banner(banner)],
                        None => Vec::new(),
                    }
                }
            })
            .collect::<Vec<_>>();
        if units.is_empty() {
            return ports;
        }

        self.coordinator()
            .run("banners", units, &accumulator)
            .await;

        let mut grabbed: HashMap<String, PortResult> = accumulator
            .snapshot()
            .into_iter()
            .map(|record| (record.key(), record))
            .collect();
        ports
            .into_iter()
            .map(|record| grabbed.remove(&record.key()).unwrap_or(record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PortState;
    use crate::techniques::ToolInventory;
    use tokio::net::TcpListener;

    fn scanner(config: &ReconConfig) -> PortScanner {
        let runner = ProcessRunner::new(Arc::new(ToolInventory::default()));
        PortScanner::new(config, runner, CancellationToken::new()).with_notifications(false)
    }

    #[tokio::test]
    async fn test_only_reachable_port_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed: Vec<u16> = {
            let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
            vec![a.local_addr().unwrap().port(), b.local_addr().unwrap().port()]
        };

        let config = ReconConfig::new("127.0.0.1").with_timeout(500);
        let scanner = scanner(&config)
            .without_banners()
            .with_candidates(vec![closed[0], open, closed[1]])
            .with_services(ServiceDatabase::from_entries([(open, "SSH")]));

        let report = scanner.scan(&Target::parse("127.0.0.1").unwrap()).await;
        assert_eq!(report.ports.len(), 1);
        assert_eq!(report.ports[0].port, open);
        assert_eq!(report.ports[0].state, PortState::Open);
        assert_eq!(report.ports[0].service.as_deref(), Some("SSH"));
        assert_eq!(report.technique.as_deref(), Some("connect-sweep"));
    }

    #[tokio::test]
    async fn test_absent_tools_fall_through_to_sweep() {
        let config = ReconConfig::new("127.0.0.1").with_timeout(300);
        let scanner = scanner(&config).without_banners().with_candidates(vec![]);
        let target = Target::parse("127.0.0.1").unwrap();

        let chain = scanner.chain(&target);
        assert_eq!(
            chain.names(),
            vec!["nmap", "masscan", "unicornscan", "connect-sweep"]
        );

        let report = scanner.scan(&target).await;
        assert!(report.ports.is_empty());
        assert!(!report.cancelled);
        assert_eq!(report.attempts.len(), 4);
    }

    #[tokio::test]
    async fn test_explicit_port_target_probes_only_that_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ReconConfig::new("127.0.0.1");
        let scanner = scanner(&config).without_banners();

        let target = Target::parse(&format!("127.0.0.1:{}", port)).unwrap();
        assert_eq!(scanner.chain(&target).names(), vec!["connect-sweep"]);

        let report = scanner.scan(&target).await;
        assert_eq!(report.ports.len(), 1);
        assert_eq!(report.ports[0].port, port);
    }

    #[test]
    fn test_udp_records_keep_their_own_labels() {
        let config = ReconConfig::new("127.0.0.1");
        let labeled = scanner(&config).label_services(vec![
            PortResult::new(53, Protocol::Udp, PortState::Open),
            PortResult::new(22, Protocol::Tcp, PortState::Open),
        ]);
        assert_eq!(labeled[0].service, None);
        assert_eq!(labeled[1].service.as_deref(), Some("SSH"));
    }

    #[tokio::test]
    async fn test_udp_records_get_no_tcp_banner_read() {
        use tokio::io::AsyncWriteExt;

        // A TCP greeter on the same number as the UDP record
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"tcp greeting\r\n").await;
            }
        });

        let config = ReconConfig::new("127.0.0.1");
        let scanner = scanner(&config);
        let grabber = BannerGrabber::new(Duration::from_millis(500));
        let ports = scanner
            .augment(
                &grabber,
                "127.0.0.1",
                vec![
                    PortResult::new(port, Protocol::Udp, PortState::Open),
                    PortResult::new(port, Protocol::Tcp, PortState::Open),
                ],
            )
            .await;

        assert_eq!(ports[0].protocol, Protocol::Udp);
        assert_eq!(ports[0].banner, None);
        assert_eq!(ports[1].banner.as_deref(), Some("tcp greeting"));
    }

    #[tokio::test]
    async fn test_banner_is_attached_to_open_port() {
        use tokio::io::AsyncWriteExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // First accept is the connect probe, the second the banner read
            for _ in 0..2 {
                if let Ok((mut socket, _)) = listener.accept().await {
                    let _ = socket.write_all(b"hello from test\r\n").await;
                }
            }
        });

        let config = ReconConfig::new("127.0.0.1")
            .with_timeout(500)
            .with_banner_timeout(1000);
        let scanner = scanner(&config).with_candidates(vec![port]);
        let report = scanner.scan(&Target::parse("127.0.0.1").unwrap()).await;

        assert_eq!(report.ports.len(), 1);
        assert_eq!(report.ports[0].banner.as_deref(), Some("hello from test"));
    }
}
