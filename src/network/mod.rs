//! Network module: probe result types, TCP connect probes and banner reads

pub mod banner;
pub mod protocol;
pub mod socket;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use banner::BannerGrabber;
pub use protocol::ServiceDatabase;
pub use socket::TcpConnectProbe;

/// Maximum number of banner bytes kept on a port record
pub const MAX_BANNER_BYTES: usize = 200;

/// Outcome of a single probe unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Timeout,
    Unresolvable,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Timeout => write!(f, "timeout"),
            PortState::Unresolvable => write!(f, "unresolvable"),
        }
    }
}

/// Transport protocol of a port record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result for a single port, from a connect probe or a parsed tool line.
///
/// Rendered as `port/protocol/state[/service][/banner]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResult {
    pub port: u16,
    pub protocol: Protocol,
    pub state: PortState,
    pub service: Option<String>,
    pub banner: Option<String>,
}

impl PortResult {
    pub fn new(port: u16, protocol: Protocol, state: PortState) -> Self {
        Self {
            port,
            protocol,
            state,
            service: None,
            banner: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        let service = service.into();
        if !service.is_empty() {
            self.service = Some(service);
        }
        self
    }

    /// Attach a banner, truncated to [`MAX_BANNER_BYTES`] on a char boundary.
    pub fn with_banner(mut self, banner: impl AsRef<str>) -> Self {
        let banner = truncate_banner(banner.as_ref());
        if !banner.is_empty() {
            self.banner = Some(banner);
        }
        self
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }

    /// Dedup key shared by every technique that can report this port
    pub fn key(&self) -> String {
        format!("{}/{}", self.port, self.protocol)
    }
}

impl fmt::Display for PortResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.port, self.protocol, self.state)?;
        if let Some(service) = &self.service {
            write!(f, "/{}", service)?;
        }
        if let Some(banner) = &self.banner {
            write!(f, "/{}", banner.replace(['\r', '\n'], " "))?;
        }
        Ok(())
    }
}

/// Trim whitespace and cut to at most [`MAX_BANNER_BYTES`] bytes
pub fn truncate_banner(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() <= MAX_BANNER_BYTES {
        return trimmed.to_string();
    }
    let mut end = MAX_BANNER_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].trim_end().to_string()
}
