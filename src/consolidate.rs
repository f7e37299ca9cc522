//! Consolidation of accumulated task results into the canonical result set

use crate::coordinator::{normalize_hostname, AccumulatorKey};
use crate::network::PortResult;
use crate::target::Target;
use std::collections::{BTreeSet, HashSet};

/// Turns raw accumulated entries into the final, deterministic result set
pub struct Consolidator;

impl Consolidator {
    /// Subdomain validity predicate against `root`.
    ///
    /// Drops the root itself, wildcard entries, single-label names, and names
    /// outside the root's zone.
    pub fn is_valid_subdomain(root: &Target, candidate: &str) -> bool {
        let host = normalize_hostname(candidate);
        !host.is_empty()
            && host != root.host()
            && !host.contains('*')
            && host.contains('.')
            && host.ends_with(&root.dotted_suffix())
            && !host.split('.').any(str::is_empty)
    }

    /// Normalized, valid, unique subdomains in lexical order
    pub fn subdomains<S: AsRef<str>>(root: &Target, raw: &[S]) -> Vec<String> {
        raw.iter()
            .map(|entry| normalize_hostname(entry.as_ref()))
            .filter(|host| Self::is_valid_subdomain(root, host))
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// Open port records, unique per `port/protocol`, in discovery order.
    ///
    /// The first record seen for a key is kept with its detail.
    pub fn ports(raw: &[PortResult]) -> Vec<PortResult> {
        let mut seen = HashSet::new();
        raw.iter()
            .filter(|record| record.is_open())
            .filter(|record| seen.insert(record.accumulator_key()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{PortState, Protocol};

    fn root() -> Target {
        Target::parse("example.com").unwrap()
    }

    #[test]
    fn test_validity_filter() {
        let raw = ["www.example.com", "*.example.com", "example.com", "bad"];
        assert_eq!(Consolidator::subdomains(&root(), &raw), vec!["www.example.com"]);
    }

    #[test]
    fn test_subdomains_sorted_and_unique() {
        let raw = [
            "mail.example.com",
            "API.example.com",
            "api.example.com.",
            "dev..example.com",
            "www.example.org",
            "a.b.example.com",
        ];
        assert_eq!(
            Consolidator::subdomains(&root(), &raw),
            vec!["a.b.example.com", "api.example.com", "mail.example.com"]
        );
    }

    #[test]
    fn test_ports_keep_discovery_order_and_first_detail() {
        let raw = vec![
            PortResult::new(443, Protocol::Tcp, PortState::Open).with_service("https"),
            PortResult::new(22, Protocol::Tcp, PortState::Open).with_service("ssh"),
            PortResult::new(25, Protocol::Tcp, PortState::Closed),
            PortResult::new(443, Protocol::Tcp, PortState::Open).with_service("HTTPS"),
            PortResult::new(53, Protocol::Udp, PortState::Open),
            PortResult::new(53, Protocol::Tcp, PortState::Timeout),
        ];
        let ports = Consolidator::ports(&raw);
        let rendered: Vec<String> = ports.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["443/tcp/open/https", "22/tcp/open/ssh", "53/udp/open"]);
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let raw = ["b.example.com", "a.example.com", "B.example.com"];
        let once = Consolidator::subdomains(&root(), &raw);
        assert_eq!(Consolidator::subdomains(&root(), &once), once);
    }
}
