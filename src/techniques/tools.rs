//! External tool profiles and output recognizers

use super::process::{ProcessRunner, ToolInvocation};
use super::{Technique, TechniqueOutcome, TechniqueStatus};
use crate::coordinator::normalize_hostname;
use crate::network::{PortResult, PortState, Protocol};
use crate::target::Target;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

lazy_static::lazy_static! {
    static ref NMAP_PORT_LINE: Regex =
        Regex::new(r"^(\d{1,5})/(tcp|udp)\s+(\S+)(?:\s+(\S+))?(?:\s+(.+))?$").unwrap();
    static ref MASSCAN_PORT_LINE: Regex =
        Regex::new(r"Discovered open port (\d{1,5})/(tcp|udp) on (\S+)").unwrap();
    static ref UNICORNSCAN_PORT_LINE: Regex =
        Regex::new(r"^(TCP|UDP)\s+open\s+([^\s\[]*)\[\s*(\d{1,5})\]").unwrap();
}

/// nmap argument profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NmapProfile {
    #[default]
    Basic,
    Fast,
    Comprehensive,
    Stealth,
}

impl NmapProfile {
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            NmapProfile::Basic => &["-sS", "-O", "-sV", "--top-ports", "1000"],
            NmapProfile::Fast => &["-T4", "-F"],
            NmapProfile::Comprehensive => {
                &["-sS", "-sU", "-O", "-sV", "-sC", "--top-ports", "1000"]
            }
            NmapProfile::Stealth => &["-sS", "-T2", "--top-ports", "100"],
        }
    }
}

impl fmt::Display for NmapProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NmapProfile::Basic => "basic",
            NmapProfile::Fast => "fast",
            NmapProfile::Comprehensive => "comprehensive",
            NmapProfile::Stealth => "stealth",
        };
        f.write_str(name)
    }
}

impl FromStr for NmapProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(NmapProfile::Basic),
            "fast" => Ok(NmapProfile::Fast),
            "comprehensive" => Ok(NmapProfile::Comprehensive),
            "stealth" => Ok(NmapProfile::Stealth),
            other => Err(format!("unknown scan profile '{}'", other)),
        }
    }
}

/// External tools the run knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Subfinder,
    Sublist3r,
    Amass,
    Nmap(NmapProfile),
    Masscan,
    Unicornscan,
    WhatWeb,
}

impl ToolKind {
    pub const SUBDOMAIN_TOOLS: [ToolKind; 3] =
        [ToolKind::Subfinder, ToolKind::Sublist3r, ToolKind::Amass];

    /// Every binary name the capability probe should look for
    pub fn all_binaries() -> [&'static str; 7] {
        [
            "subfinder",
            "sublist3r",
            "amass",
            "nmap",
            "masscan",
            "unicornscan",
            "whatweb",
        ]
    }

    pub fn binary(&self) -> &'static str {
        match self {
            ToolKind::Subfinder => "subfinder",
            ToolKind::Sublist3r => "sublist3r",
            ToolKind::Amass => "amass",
            ToolKind::Nmap(_) => "nmap",
            ToolKind::Masscan => "masscan",
            ToolKind::Unicornscan => "unicornscan",
            ToolKind::WhatWeb => "whatweb",
        }
    }

    pub fn default_timeout(&self) -> Duration {
        let secs = match self {
            ToolKind::Subfinder => 60,
            ToolKind::Sublist3r => 120,
            ToolKind::Amass => 180,
            ToolKind::Nmap(_) => 300,
            ToolKind::Masscan => 120,
            ToolKind::Unicornscan => 120,
            ToolKind::WhatWeb => 60,
        };
        Duration::from_secs(secs)
    }

    /// Argument templates; `{target}` is filled in per invocation
    pub fn arg_templates(&self) -> Vec<&'static str> {
        match self {
            ToolKind::Subfinder => vec!["-d", "{target}", "-silent"],
            ToolKind::Sublist3r => vec!["-d", "{target}", "-n"],
            ToolKind::Amass => vec!["enum", "-d", "{target}", "-timeout", "5"],
            ToolKind::Nmap(profile) => {
                let mut args = profile.args().to_vec();
                args.push("{target}");
                args
            }
            ToolKind::Masscan => vec!["-p1-65535", "{target}", "--rate=100", "--wait=0"],
            ToolKind::Unicornscan => vec!["-mT", "-I", "{target}"],
            ToolKind::WhatWeb => vec!["--color=never", "--no-errors", "{target}"],
        }
    }

    pub fn invocation(&self, target: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation::for_target(self.binary(), &self.arg_templates(), target, timeout)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Nmap(profile) => write!(f, "nmap ({})", profile),
            other => f.write_str(other.binary()),
        }
    }
}

/// Reduce a discovery-tool line to an in-scope hostname.
///
/// Takes the first whitespace-separated token, so annotated output such as
/// `www.example.com (FQDN) --> ...` is accepted.
pub fn parse_hostname_line(line: &str, root: &Target) -> Option<String> {
    let token = line.split_whitespace().next()?;
    let host = normalize_hostname(token);
    let charset_ok = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '*'));
    if host.is_empty() || !charset_ok {
        return None;
    }
    if host == root.host() || host.ends_with(&root.dotted_suffix()) {
        Some(host)
    } else {
        None
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|port| *port != 0)
}

/// `22/tcp open ssh OpenSSH 9.6p1` from nmap normal output
pub fn parse_nmap_line(line: &str) -> Option<PortResult> {
    let caps = NMAP_PORT_LINE.captures(line.trim())?;
    if &caps[3] != "open" {
        return None;
    }
    let port = parse_port(&caps[1])?;
    let protocol = Protocol::parse(&caps[2])?;
    let mut record = PortResult::new(port, protocol, PortState::Open);
    if let Some(service) = caps.get(4) {
        record = record.with_service(service.as_str());
    }
    if let Some(version) = caps.get(5) {
        record = record.with_banner(version.as_str());
    }
    Some(record)
}

/// `Discovered open port 22/tcp on 10.0.0.1` from masscan
pub fn parse_masscan_line(line: &str) -> Option<PortResult> {
    let caps = MASSCAN_PORT_LINE.captures(line)?;
    let port = parse_port(&caps[1])?;
    let protocol = Protocol::parse(&caps[2])?;
    Some(PortResult::new(port, protocol, PortState::Open))
}

/// `TCP open                     ssh[   22]  from 10.0.0.1  ttl 64`
pub fn parse_unicornscan_line(line: &str) -> Option<PortResult> {
    let caps = UNICORNSCAN_PORT_LINE.captures(line.trim())?;
    let protocol = Protocol::parse(&caps[1])?;
    let port = parse_port(&caps[3])?;
    Some(PortResult::new(port, protocol, PortState::Open).with_service(&caps[2]))
}

fn nmap_entry(line: &str, _: &Target) -> Option<PortResult> {
    parse_nmap_line(line)
}

fn masscan_entry(line: &str, _: &Target) -> Option<PortResult> {
    parse_masscan_line(line)
}

fn unicornscan_entry(line: &str, _: &Target) -> Option<PortResult> {
    parse_unicornscan_line(line)
}

/// Recognizer turning one output line into an entry
pub type LineParser<T> = fn(&str, &Target) -> Option<T>;

/// A technique backed by one external tool invocation
#[derive(Clone)]
pub struct ProcessTechnique<T> {
    kind: ToolKind,
    timeout: Duration,
    runner: ProcessRunner,
    parse: LineParser<T>,
}

impl<T> fmt::Debug for ProcessTechnique<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTechnique")
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<T> ProcessTechnique<T> {
    pub fn new(kind: ToolKind, timeout: Duration, runner: ProcessRunner, parse: LineParser<T>) -> Self {
        Self {
            kind,
            timeout,
            runner,
            parse,
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ProcessTechnique<String> {
    /// Discovery tool emitting one hostname per line
    pub fn subdomains(kind: ToolKind, timeout: Duration, runner: ProcessRunner) -> Self {
        Self::new(kind, timeout, runner, parse_hostname_line)
    }
}

impl ProcessTechnique<PortResult> {
    /// Port scanner with the recognizer matching its output format
    pub fn ports(kind: ToolKind, timeout: Duration, runner: ProcessRunner) -> Self {
        let parse: LineParser<PortResult> = match kind {
            ToolKind::Masscan => masscan_entry,
            ToolKind::Unicornscan => unicornscan_entry,
            _ => nmap_entry,
        };
        Self::new(kind, timeout, runner, parse)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Technique<T> for ProcessTechnique<T> {
    fn name(&self) -> &str {
        self.kind.binary()
    }

    fn is_available(&self) -> bool {
        self.runner.is_available(self.kind.binary())
    }

    async fn run(&self, target: &Target) -> TechniqueOutcome<T> {
        let invocation = self.kind.invocation(target.host(), self.timeout);
        let output = self.runner.run(&invocation).await;

        let outcome = TechniqueOutcome::new(self.name(), output.status.clone(), output.elapsed);
        if output.status != TechniqueStatus::Ok {
            return outcome;
        }

        let mut recognized = Vec::new();
        let mut entries = Vec::new();
        for line in output.lines() {
            if let Some(entry) = (self.parse)(line, target) {
                recognized.push(line.to_string());
                entries.push(entry);
            }
        }
        let outcome = TechniqueOutcome {
            entries,
            ..outcome.with_raw_lines(recognized)
        };
        match self.kind {
            ToolKind::Nmap(_) => outcome.with_raw_output(output.stdout),
            _ => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Target {
        Target::parse("example.com").unwrap()
    }

    #[test]
    fn test_hostname_lines() {
        assert_eq!(
            parse_hostname_line("API.Example.com.", &root()).as_deref(),
            Some("api.example.com")
        );
        assert_eq!(
            parse_hostname_line("www.example.com (FQDN) --> a_record --> 1.2.3.4", &root())
                .as_deref(),
            Some("www.example.com")
        );
        assert_eq!(parse_hostname_line("", &root()), None);
        assert_eq!(parse_hostname_line("[INF] Enumerating", &root()), None);
        assert_eq!(parse_hostname_line("www.example.org", &root()), None);
        assert_eq!(parse_hostname_line("notexample.com", &root()), None);
    }

    #[test]
    fn test_nmap_lines() {
        let record = parse_nmap_line("22/tcp   open  ssh     OpenSSH 9.6p1 Ubuntu").unwrap();
        assert_eq!(record.port, 22);
        assert_eq!(record.service.as_deref(), Some("ssh"));
        assert_eq!(record.banner.as_deref(), Some("OpenSSH 9.6p1 Ubuntu"));

        let record = parse_nmap_line("53/udp open domain").unwrap();
        assert_eq!(record.protocol, Protocol::Udp);
        assert_eq!(record.banner, None);

        assert!(parse_nmap_line("25/tcp closed smtp").is_none());
        assert!(parse_nmap_line("161/udp open|filtered snmp").is_none());
        assert!(parse_nmap_line("Nmap scan report for example.com").is_none());
        assert!(parse_nmap_line("PORT   STATE SERVICE").is_none());
    }

    #[test]
    fn test_masscan_lines() {
        let record = parse_masscan_line("Discovered open port 8080/tcp on 93.184.216.34").unwrap();
        assert_eq!(record.key(), "8080/tcp");
        assert!(parse_masscan_line("Starting masscan 1.3.2").is_none());
    }

    #[test]
    fn test_unicornscan_lines() {
        let record =
            parse_unicornscan_line("TCP open                     ssh[   22]         from 10.0.0.1  ttl 64")
                .unwrap();
        assert_eq!(record.port, 22);
        assert_eq!(record.service.as_deref(), Some("ssh"));
        assert!(parse_unicornscan_line("TCP closed ssh[   22]").is_none());
    }

    #[test]
    fn test_tool_arguments() {
        let nmap = ToolKind::Nmap(NmapProfile::Stealth).invocation("example.com", Duration::from_secs(1));
        assert_eq!(nmap.args, vec!["-sS", "-T2", "--top-ports", "100", "example.com"]);

        let subfinder = ToolKind::Subfinder.invocation("example.com", Duration::from_secs(1));
        assert_eq!(subfinder.command_line(), "subfinder -d example.com -silent");
        assert_eq!(ToolKind::Amass.default_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("FAST".parse::<NmapProfile>(), Ok(NmapProfile::Fast));
        assert!("loud".parse::<NmapProfile>().is_err());
        assert_eq!(NmapProfile::default().to_string(), "basic");
    }

    #[test]
    fn test_tool_kinds_are_set_keys() {
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(ToolKind::Nmap(NmapProfile::Fast)));
        assert!(seen.insert(ToolKind::Nmap(NmapProfile::Stealth)));
        assert!(!seen.insert(ToolKind::Nmap(NmapProfile::Fast)));
        assert!(seen.insert(ToolKind::Amass));
        assert_eq!(seen.len(), 3);
    }
}
