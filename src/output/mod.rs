//! Output files for a reconnaissance run

use crate::portscan::PortScanReport;
use crate::recon::ReconResults;
use crate::target::Target;
use crate::tech::TechProfile;
use crate::{ReconError, Result};
use chrono::{DateTime, Local};
use log::info;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 70;

/// Writes result files into a per-run directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    /// Create `{base}/{host}_{YYYYmmdd_HHMMSS}`.
    ///
    /// Failing to create it is fatal for the run.
    pub fn create(base: &Path, target: &Target, started: DateTime<Local>) -> Result<Self> {
        let name = format!(
            "{}_{}",
            file_safe(target.host()),
            started.format("%Y%m%d_%H%M%S")
        );
        let dir = base.join(name);
        fs::create_dir_all(&dir).map_err(|e| {
            ReconError::OutputError(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, content).map_err(|e| {
            ReconError::OutputError(format!("cannot write {}: {}", path.display(), e))
        })?;
        info!("Saved {}", path.display());
        Ok(path)
    }

    /// `subdomains.txt`, one name per line
    pub fn write_subdomains(&self, subdomains: &[String]) -> Result<PathBuf> {
        let mut content = subdomains.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        self.write("subdomains.txt", &content)
    }

    /// `ports_{host}.txt`
    pub fn write_ports(&self, report: &PortScanReport, finished: DateTime<Local>) -> Result<PathBuf> {
        let mut content = String::new();
        let _ = writeln!(content, "Port Scan Results for {}", report.host);
        let _ = writeln!(content, "{}\n", "=".repeat(50));
        for record in &report.ports {
            let _ = writeln!(content, "{}", record);
        }
        let _ = writeln!(content, "\nTotal open ports: {}", report.ports.len());
        if let Some(technique) = &report.technique {
            let _ = writeln!(content, "Technique: {}", technique);
        }
        let _ = writeln!(content, "Scan completed: {}", finished.format("%Y-%m-%d %H:%M:%S"));
        self.write(&format!("ports_{}.txt", file_safe(&report.host)), &content)
    }

    /// `nmap_{host}.txt`, the scanner's own report, when nmap produced the ports
    pub fn write_nmap(&self, report: &PortScanReport) -> Result<Option<PathBuf>> {
        match (&report.technique, &report.raw_output) {
            (Some(technique), Some(raw)) if technique == "nmap" => self
                .write(&format!("nmap_{}.txt", file_safe(&report.host)), raw)
                .map(Some),
            _ => Ok(None),
        }
    }

    /// `tech_stack.json`
    pub fn write_tech(&self, tech: &BTreeMap<String, TechProfile>) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(tech)?;
        self.write("tech_stack.json", &json)
    }

    /// `results.json` with everything the run produced
    pub fn write_json(&self, results: &ReconResults) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(results)?;
        self.write("results.json", &json)
    }

    /// `recon_report.txt`
    pub fn write_report(&self, results: &ReconResults, finished: DateTime<Local>) -> Result<PathBuf> {
        self.write("recon_report.txt", &render_report(results, finished))
    }

    /// Write every file; returns the summary report path
    pub fn write_all(&self, results: &ReconResults) -> Result<PathBuf> {
        let finished = Local::now();
        self.write_subdomains(&results.subdomains)?;
        for report in &results.ports {
            self.write_ports(report, finished)?;
            self.write_nmap(report)?;
        }
        self.write_tech(&results.tech_stack)?;
        self.write_json(results)?;
        self.write_report(results, finished)
    }
}

/// Host names may carry a port or IPv6 colons; keep file names portable
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

/// Plain-text summary of a run
pub fn render_report(results: &ReconResults, finished: DateTime<Local>) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let section = "-".repeat(30);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "AutoRecon Report for {}", results.target);
    let _ = writeln!(out, "Generated: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    if results.cancelled {
        let _ = writeln!(out, "Status: interrupted, results are partial");
    }
    let _ = writeln!(out, "{}\n", rule);

    let _ = writeln!(out, "SUBDOMAINS FOUND ({}):", results.subdomains.len());
    let _ = writeln!(out, "{}", section);
    for subdomain in &results.subdomains {
        let _ = writeln!(out, "  • {}", subdomain);
    }
    out.push('\n');

    let _ = writeln!(out, "PORT SCAN RESULTS:");
    let _ = writeln!(out, "{}", section);
    for report in &results.ports {
        let _ = writeln!(out, "\n{}:", report.host);
        if report.ports.is_empty() {
            let _ = writeln!(out, "  (no open ports)");
        }
        for record in &report.ports {
            let _ = writeln!(out, "  • {}", record);
        }
    }
    out.push('\n');

    let _ = writeln!(out, "TECHNOLOGY STACK:");
    let _ = writeln!(out, "{}", section);
    for (host, profile) in &results.tech_stack {
        let _ = writeln!(out, "\n{}:", host);
        for (category, names) in profile {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let _ = writeln!(out, "  • {}: {}", category, names.join(", "));
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{PortResult, PortState, Protocol};
    use chrono::TimeZone;
    use std::time::Duration;

    fn sample() -> ReconResults {
        let mut results = ReconResults::new(Target::parse("example.com").unwrap());
        results.subdomains = vec!["api.example.com".into(), "www.example.com".into()];
        results.ports.push(PortScanReport {
            host: "example.com".into(),
            ports: vec![PortResult::new(22, Protocol::Tcp, PortState::Open).with_service("SSH")],
            technique: Some("connect-sweep".into()),
            attempts: Vec::new(),
            cancelled: false,
            elapsed: Duration::from_secs(1),
            raw_output: None,
        });
        results
    }

    #[test]
    fn test_run_directory_name() {
        let base = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let writer =
            ReportWriter::create(base.path(), &Target::parse("example.com:8443").unwrap(), started)
                .unwrap();
        assert!(writer.dir().ends_with("example.com_20240309_140507"));
        assert!(writer.dir().is_dir());
    }

    #[test]
    fn test_unwritable_base_is_output_error() {
        let base = tempfile::tempdir().unwrap();
        let blocker = base.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = ReportWriter::create(&blocker, &Target::parse("example.com").unwrap(), Local::now())
            .unwrap_err();
        assert!(matches!(err, ReconError::OutputError(_)));
    }

    #[test]
    fn test_write_all_files() {
        let base = tempfile::tempdir().unwrap();
        let results = sample();
        let writer = ReportWriter::create(base.path(), &results.target, Local::now()).unwrap();
        let report = writer.write_all(&results).unwrap();

        let subdomains = fs::read_to_string(writer.dir().join("subdomains.txt")).unwrap();
        assert_eq!(subdomains, "api.example.com\nwww.example.com\n");
        let ports = fs::read_to_string(writer.dir().join("ports_example.com.txt")).unwrap();
        assert!(ports.contains("22/tcp/open/SSH"));
        assert!(ports.contains("Total open ports: 1"));
        assert!(writer.dir().join("tech_stack.json").is_file());
        assert!(writer.dir().join("results.json").is_file());
        assert!(fs::read_to_string(report).unwrap().contains("SUBDOMAINS FOUND (2):"));
    }

    #[test]
    fn test_nmap_report_is_saved_only_when_nmap_won() {
        let base = tempfile::tempdir().unwrap();
        let mut results = sample();
        let writer = ReportWriter::create(base.path(), &results.target, Local::now()).unwrap();

        writer.write_all(&results).unwrap();
        assert!(!writer.dir().join("nmap_example.com.txt").exists());

        let raw = "Starting Nmap 7.94\n22/tcp open ssh\nNmap done: 1 IP address\n";
        results.ports[0].technique = Some("nmap".into());
        results.ports[0].raw_output = Some(raw.into());
        writer.write_all(&results).unwrap();
        let saved = fs::read_to_string(writer.dir().join("nmap_example.com.txt")).unwrap();
        assert_eq!(saved, raw);
    }

    #[test]
    fn test_partial_report_is_marked() {
        let mut results = sample();
        results.cancelled = true;
        let text = render_report(&results, Local::now());
        assert!(text.contains("interrupted"));
        assert!(text.contains("  • 22/tcp/open/SSH"));
    }
}
