//! Configuration module for autorecon runs

use crate::techniques::{NmapProfile, ToolKind};
use crate::{ReconError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wall-clock limit for the Certificate Transparency lookup
pub const CT_TIMEOUT: Duration = Duration::from_secs(10);

/// Certificate Transparency search endpoint; `{target}` is substituted
pub const DEFAULT_CT_URL: &str = "https://crt.sh/?q=%.{target}&output=json";

/// Extra wordlist picked up automatically when present
pub const DEFAULT_WORDLIST: &str = "config/wordlists.txt";

/// Main configuration structure for a reconnaissance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Target domain, host, or `host:port`
    pub target: String,

    /// Worker budget for each task
    pub threads: usize,

    /// Connect timeout for each probe unit in milliseconds
    pub timeout: u64,

    /// Timeout for each HTTP(S) existence check in milliseconds
    pub http_timeout: u64,

    /// Timeout for each banner read in milliseconds
    pub banner_timeout: u64,

    /// Base directory for run output
    pub output_dir: PathBuf,

    /// Additional subdomain labels, one per line
    pub wordlist: Option<PathBuf>,

    /// Add the top-ports list to the common ports for the connect sweep
    pub top_ports: bool,

    /// Read a banner from each open port
    pub banner_grab: bool,

    /// Run external tools when they are installed
    pub use_tools: bool,

    /// nmap argument profile
    pub scan_profile: NmapProfile,

    /// Per-tool wall-clock limits in seconds, keyed by binary name
    pub tool_timeouts: BTreeMap<String, u64>,

    /// Overall deadline for one task in seconds
    pub task_deadline: Option<u64>,

    /// Certificate Transparency search URL
    pub ct_url: String,

    pub skip_subdomains: bool,
    pub skip_ports: bool,
    pub skip_tech: bool,

    /// Print discoveries as they happen
    pub realtime_notifications: bool,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            threads: 20,
            timeout: 3000,
            http_timeout: 5000,
            banner_timeout: 5000,
            output_dir: PathBuf::from("output"),
            wordlist: None,
            top_ports: false,
            banner_grab: true,
            use_tools: true,
            scan_profile: NmapProfile::Basic,
            tool_timeouts: BTreeMap::new(),
            task_deadline: None,
            ct_url: DEFAULT_CT_URL.to_string(),
            skip_subdomains: false,
            skip_ports: false,
            skip_tech: false,
            realtime_notifications: true,
        }
    }
}

impl ReconConfig {
    /// Create a new configuration for `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the probe timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: u64) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_banner_timeout(mut self, timeout: u64) -> Self {
        self.banner_timeout = timeout;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_wordlist(mut self, path: impl Into<PathBuf>) -> Self {
        self.wordlist = Some(path.into());
        self
    }

    pub fn with_top_ports(mut self, enabled: bool) -> Self {
        self.top_ports = enabled;
        self
    }

    pub fn with_banner_grab(mut self, enabled: bool) -> Self {
        self.banner_grab = enabled;
        self
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.use_tools = enabled;
        self
    }

    pub fn with_scan_profile(mut self, profile: NmapProfile) -> Self {
        self.scan_profile = profile;
        self
    }

    pub fn with_tool_timeout(mut self, tool: &str, secs: u64) -> Self {
        self.tool_timeouts.insert(tool.to_string(), secs);
        self
    }

    /// Set the overall task deadline in seconds
    pub fn with_task_deadline(mut self, secs: u64) -> Self {
        self.task_deadline = Some(secs);
        self
    }

    pub fn with_ct_url(mut self, url: impl Into<String>) -> Self {
        self.ct_url = url.into();
        self
    }

    /// Get the probe timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    pub fn banner_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.banner_timeout)
    }

    pub fn task_deadline_duration(&self) -> Option<Duration> {
        self.task_deadline.map(Duration::from_secs)
    }

    /// Wall-clock limit for a tool: the configured override or its default
    pub fn tool_timeout(&self, kind: ToolKind) -> Duration {
        self.tool_timeouts
            .get(kind.binary())
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| kind.default_timeout())
    }

    /// Worst-case own time of any unit that runs under a task deadline.
    ///
    /// A subdomain check tries HTTPS, then HTTP, then name resolution. The
    /// CT lookup and the subdomain tools run as units of the same task. Port
    /// tools run in the sequential chain, outside any deadline.
    pub fn longest_unit_timeout(&self) -> (Duration, String) {
        let subdomain_check = self.http_timeout_duration() * 2 + self.timeout_duration();
        let mut units = vec![
            (self.timeout_duration(), "connect probe".to_string()),
            (self.banner_timeout_duration(), "banner read".to_string()),
            (subdomain_check, "subdomain check".to_string()),
            (CT_TIMEOUT, "CT lookup".to_string()),
        ];
        if self.use_tools {
            for kind in ToolKind::SUBDOMAIN_TOOLS {
                units.push((self.tool_timeout(kind), kind.binary().to_string()));
            }
        }
        units
            .into_iter()
            .max_by_key(|(limit, _)| *limit)
            .unwrap_or_default()
    }

    /// Wordlist to load and whether it was asked for explicitly.
    ///
    /// Falls back to [`DEFAULT_WORDLIST`] when it exists.
    pub fn wordlist_source(&self) -> Option<(PathBuf, bool)> {
        match &self.wordlist {
            Some(path) => Some((path.clone(), true)),
            None => {
                let default = PathBuf::from(DEFAULT_WORDLIST);
                default.is_file().then_some((default, false))
            }
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ReconError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ReconError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from `~/.autorecon.toml`, or defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = home_dir.join(".autorecon.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(ReconError::InvalidTarget("Target cannot be empty".to_string()));
        }

        if self.threads == 0 {
            return Err(ReconError::ConfigError(
                "Thread count must be greater than 0".to_string(),
            ));
        }

        if self.timeout == 0 || self.http_timeout == 0 {
            return Err(ReconError::ConfigError(
                "Probe timeouts must be greater than 0".to_string(),
            ));
        }

        if let Some(deadline) = self.task_deadline_duration() {
            let (longest, unit) = self.longest_unit_timeout();
            if deadline <= longest {
                return Err(ReconError::ConfigError(format!(
                    "Task deadline {:?} must exceed the {} limit {:?}; raise the deadline or lower that limit",
                    deadline, unit, longest
                )));
            }
        }

        if !self.ct_url.contains("{target}") {
            return Err(ReconError::ConfigError(
                "CT URL must contain a {target} placeholder".to_string(),
            ));
        }

        Ok(())
    }
}
