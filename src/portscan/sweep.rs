//! Raw TCP connect sweep: the last technique in the port fallback chain

use crate::coordinator::{Coordinator, ResultAccumulator};
use crate::network::socket::resolve_host;
use crate::network::{PortResult, TcpConnectProbe};
use crate::target::Target;
use crate::techniques::{Technique, TechniqueOutcome, TechniqueStatus};
use async_trait::async_trait;
use colored::*;
use log::debug;
use std::net::SocketAddr;
use std::time::Instant;

/// One connect probe per candidate port under the coordinator
#[derive(Debug, Clone)]
pub struct ConnectSweep {
    probe: TcpConnectProbe,
    candidates: Vec<u16>,
    coordinator: Coordinator,
    notify: bool,
}

impl ConnectSweep {
    pub fn new(probe: TcpConnectProbe, candidates: Vec<u16>, coordinator: Coordinator) -> Self {
        Self {
            probe,
            candidates,
            coordinator,
            notify: false,
        }
    }

    /// Print each open port as it is found
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    pub fn candidates(&self) -> &[u16] {
        &self.candidates
    }
}

#[async_trait]
impl Technique<PortResult> for ConnectSweep {
    fn name(&self) -> &str {
        "connect-sweep"
    }

    async fn run(&self, target: &Target) -> TechniqueOutcome<PortResult> {
        let started = Instant::now();
        let host = target.host().to_string();

        // Resolve once; every unit connects to the same address.
        let Some(ip) = resolve_host(&host, self.probe.timeout()).await.first().copied() else {
            return TechniqueOutcome::new(
                self.name(),
                TechniqueStatus::Failed(format!("{} does not resolve", host)),
                started.elapsed(),
            );
        };
        debug!(
            "Sweeping {} candidate ports on {} ({})",
            self.candidates.len(),
            host,
            ip
        );

        let accumulator: ResultAccumulator<PortResult> = ResultAccumulator::new();
        let units = self.candidates.iter().map(|&port| {
            let probe = self.probe.clone();
            let host = host.clone();
            let notify = self.notify;
            async move {
                let probe_start = Instant::now();
                let result = probe.probe_addr(SocketAddr::new(ip, port)).await;
                if !result.is_open() {
                    return Vec::new();
                }
                if notify {
                    let service = result
                        .service
                        .as_ref()
                        .map(|s| format!(" ({})", s))
                        .unwrap_or_default();
                    println!(
                        "{}",
                        format!(
                            "OPEN: {}:{}{} [{}ms]",
                            host,
                            port,
                            service,
                            probe_start.elapsed().as_millis()
                        )
                        .truecolor(255, 135, 0)
                    );
                }
                vec![result]
            }
        })
        .collect::<Vec<_>>();

        let report = self.coordinator.run("connect-sweep", units, &accumulator).await;
        let status = if report.cancelled {
            TechniqueStatus::Cancelled
        } else {
            TechniqueStatus::Ok
        };
        TechniqueOutcome {
            technique: self.name().to_string(),
            status,
            raw_lines: Vec::new(),
            entries: accumulator.snapshot(),
            raw_output: None,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ServiceDatabase;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_sweep_runs_on_a_spawned_task() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
            spare.local_addr().unwrap().port()
        };

        let probe = TcpConnectProbe::new(Duration::from_millis(500), ServiceDatabase::new());
        let sweep = ConnectSweep::new(
            probe,
            vec![closed, open],
            Coordinator::new(2, CancellationToken::new()),
        );
        let target = Target::parse("127.0.0.1").unwrap();

        // The sweep future has to be Send to leave the current task
        let outcome = tokio::spawn(async move { sweep.run(&target).await })
            .await
            .unwrap();

        assert_eq!(outcome.status, TechniqueStatus::Ok);
        let ports: Vec<u16> = outcome.entries.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![open]);
        drop(listener);
    }
}
