//! TCP connect probe units and name resolution

use super::{PortResult, PortState, Protocol, ServiceDatabase};
use log::debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Resolve a hostname (or IP literal) within `limit`.
///
/// Returns an empty list on resolution failure or timeout; neither is an error
/// for reconnaissance purposes.
pub async fn resolve_host(host: &str, limit: Duration) -> Vec<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return vec![ip];
    }

    match timeout(limit, tokio::net::lookup_host((host, 0))).await {
        Ok(Ok(addrs)) => {
            let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
            ips.dedup();
            ips
        }
        Ok(Err(e)) => {
            debug!("Resolution failed for {}: {}", host, e);
            Vec::new()
        }
        Err(_) => {
            debug!("Resolution timed out for {} after {:?}", host, limit);
            Vec::new()
        }
    }
}

/// TCP connect scanner: one bounded connect per port
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    timeout: Duration,
    services: ServiceDatabase,
}

impl TcpConnectProbe {
    pub fn new(timeout: Duration, services: ServiceDatabase) -> Self {
        Self { timeout, services }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn services(&self) -> &ServiceDatabase {
        &self.services
    }

    /// Connect to an already resolved address.
    ///
    /// The socket is dropped before returning on every path.
    pub async fn probe_addr(&self, addr: SocketAddr) -> PortResult {
        let state = match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                PortState::Open
            }
            Ok(Err(_)) => PortState::Closed,
            Err(_) => PortState::Timeout,
        };

        let result = PortResult::new(addr.port(), Protocol::Tcp, state);
        if state == PortState::Open {
            result.with_service(self.services.label(addr.port()))
        } else {
            result
        }
    }

    /// Resolve `host` and connect to `port`, all within the probe timeout.
    pub async fn probe(&self, host: &str, port: u16) -> PortResult {
        let started = std::time::Instant::now();
        let ips = resolve_host(host, self.timeout).await;
        let Some(ip) = ips.first().copied() else {
            return PortResult::new(port, Protocol::Tcp, PortState::Unresolvable);
        };

        let remaining = self.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return PortResult::new(port, Protocol::Tcp, PortState::Timeout);
        }

        let probe = Self {
            timeout: remaining,
            services: self.services.clone(),
        };
        probe.probe_addr(SocketAddr::new(ip, port)).await
    }
}
