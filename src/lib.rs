//! AutoRecon - concurrent reconnaissance with graceful tool fallback
//!
//! Subdomain discovery, port scanning and technology fingerprinting for one
//! target. Every source of findings is optional: missing tools, timeouts and
//! unreachable hosts shrink the result, they never fail the run.

pub mod config;
pub mod consolidate;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod output;
pub mod portscan;
pub mod recon;
pub mod subdomain;
pub mod target;
pub mod tech;
pub mod techniques;
pub mod top_ports;

// Re-export commonly used types
pub use config::ReconConfig;
pub use consolidate::Consolidator;
pub use coordinator::{Coordinator, ResultAccumulator, TaskReport};
pub use error::ReconError;
pub use network::{PortResult, PortState, Protocol};
pub use output::ReportWriter;
pub use portscan::{PortScanReport, PortScanner};
pub use recon::{Recon, ReconResults};
pub use subdomain::{SubdomainEnumerator, SubdomainReport};
pub use target::Target;
pub use tech::TechDetector;
pub use techniques::{FallbackChain, Technique, TechniqueOutcome, TechniqueStatus, ToolInventory};
pub use top_ports::{get_port_list, PortListType};

pub type Result<T> = std::result::Result<T, ReconError>;
