//! Candidate labels for subdomain brute force

use crate::{ReconError, Result};
use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Built-in common subdomain labels
pub const COMMON_SUBDOMAINS: &[&str] = &[
    "www", "mail", "ftp", "localhost", "webmail", "smtp", "pop", "ns1", "webdisk",
    "ns2", "cpanel", "whm", "autodiscover", "autoconfig", "admin", "api", "blog",
    "dev", "test", "staging", "demo", "app", "mobile", "secure", "vpn", "remote",
    "support", "help", "portal", "shop", "store", "forum", "wiki", "news",
    "cdn", "static", "img", "images", "upload", "download", "assets", "media",
    "beta", "alpha", "stage", "prod", "production", "development", "server",
    "backup", "old", "new", "archive", "files", "docs", "documentation",
    "status", "monitor", "stats", "analytics", "tracking", "ads", "ad",
    "mx", "mail1", "mail2", "email", "exchange", "imap", "pop3",
    "mysql", "sql", "database", "db", "phpmyadmin", "adminer", "pma",
    "jenkins", "ci", "build", "deploy", "git", "svn", "repo", "code",
    "internal", "intranet", "extranet", "private", "public", "external",
    "sso", "auth", "login", "signin", "signup", "register", "oauth",
    "chat", "voice", "video", "call", "conference", "meet", "zoom",
    "calendar", "cal", "schedule", "booking", "appointment", "reserve",
    "crm", "erp", "hr", "payroll", "finance", "accounting", "billing",
    "payment", "checkout", "cart", "order", "invoice", "receipt",
];

/// A label usable as the leftmost part of a hostname
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 253
        && !label.starts_with('.')
        && !label.ends_with('.')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Parse wordlist text: one label per line, `#` comments and blanks skipped
pub fn parse_wordlist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_ascii_lowercase)
        .filter(|label| is_valid_label(label))
        .collect()
}

/// Read a wordlist file
pub fn load_wordlist<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        ReconError::ConfigError(format!("Failed to read wordlist {}: {}", path.display(), e))
    })?;
    let labels = parse_wordlist(&content);
    info!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

/// Built-in labels followed by `extra`, duplicates removed, order kept
pub fn candidate_labels<I, S>(extra: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let labels: Vec<String> = COMMON_SUBDOMAINS
        .iter()
        .map(|label| label.to_string())
        .chain(extra.into_iter().map(|label| label.as_ref().to_ascii_lowercase()))
        .filter(|label| seen.insert(label.clone()))
        .collect();
    debug!("{} candidate labels", labels.len());
    labels
}
