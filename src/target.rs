//! Target normalization
//!
//! Every task works on a [`Target`]: a bare hostname (or IP) with an
//! optional port, lower-cased, with any URL scheme and trailing slash
//! stripped.

use crate::{ReconError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A normalized scan target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    host: String,
    port: Option<u16>,
}

impl Target {
    /// Normalize raw user input into a target.
    ///
    /// Accepts `example.com`, `https://example.com/`, `Example.COM.`,
    /// `example.com:8443` and rejects empty input or anything that still looks
    /// like a path or contains whitespace after stripping.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut value = raw.trim();
        for scheme in ["http://", "https://"] {
            if value
                .get(..scheme.len())
                .map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme))
            {
                value = &value[scheme.len()..];
            }
        }
        let value = value.trim_end_matches('/');

        if value.is_empty() {
            return Err(ReconError::InvalidTarget("Target cannot be empty".to_string()));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(ReconError::InvalidTarget(format!(
                "'{}' is not a hostname or host:port",
                raw.trim()
            )));
        }

        let (host, port) = split_host_port(value)?;
        let host = host.trim_end_matches('.').to_ascii_lowercase();

        if host.is_empty() {
            return Err(ReconError::InvalidTarget(format!("'{}' has no host part", raw.trim())));
        }
        if !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
        {
            return Err(ReconError::InvalidTarget(format!(
                "'{}' contains characters not valid in a hostname",
                host
            )));
        }

        Ok(Self { host, port })
    }

    /// Build a target for a host that is already known to be normalized,
    /// e.g. a consolidated subdomain.
    pub fn from_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Host with a `.` prefix, used for in-scope suffix checks.
    pub fn dotted_suffix(&self) -> String {
        format!(".{}", self.host)
    }
}

fn split_host_port(value: &str) -> Result<(&str, Option<u16>)> {
    // Bracketed IPv6 with optional port: [::1]:8080
    if let Some(rest) = value.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| ReconError::InvalidTarget(format!("unterminated IPv6 literal '{}'", value)))?;
        let host = &rest[..end];
        let tail = &rest[end + 1..];
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None if tail.is_empty() => None,
            None => return Err(ReconError::InvalidTarget(format!("malformed target '{}'", value))),
        };
        return Ok((host, port));
    }

    match value.matches(':').count() {
        0 => Ok((value, None)),
        1 => {
            let (host, port) = value.split_once(':').unwrap_or((value, ""));
            Ok((host, Some(parse_port(port)?)))
        }
        // Bare IPv6 literal, no port
        _ => Ok((value, None)),
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(ReconError::InvalidTarget(format!("invalid port '{}'", raw))),
        Ok(port) => Ok(port),
    }
}

impl FromStr for Target {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}", self.host, port),
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scheme_and_slash() {
        let t = Target::parse("https://Example.com/").unwrap();
        assert_eq!(t.host(), "example.com");
        assert_eq!(t.port(), None);
        assert_eq!(t.to_string(), "example.com");

        let t = Target::parse("  HTTP://www.example.com// ").unwrap();
        assert_eq!(t.host(), "www.example.com");
    }

    #[test]
    fn test_host_port() {
        let t = Target::parse("example.com:8443").unwrap();
        assert_eq!(t.host(), "example.com");
        assert_eq!(t.port(), Some(8443));
        assert_eq!(t.to_string(), "example.com:8443");
    }

    #[test]
    fn test_ipv6_forms() {
        let t = Target::parse("[::1]:8080").unwrap();
        assert_eq!(t.host(), "::1");
        assert_eq!(t.port(), Some(8080));
        assert_eq!(t.to_string(), "[::1]:8080");

        let t = Target::parse("fe80::1").unwrap();
        assert_eq!(t.host(), "fe80::1");
        assert_eq!(t.port(), None);
    }

    #[test]
    fn test_trailing_root_dot() {
        assert_eq!(Target::parse("example.com.").unwrap().host(), "example.com");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Target::parse("").is_err());
        assert!(Target::parse("   ").is_err());
        assert!(Target::parse("https://").is_err());
        assert!(Target::parse("example.com/path").is_err());
        assert!(Target::parse("exa mple.com").is_err());
        assert!(Target::parse("example.com:0").is_err());
        assert!(Target::parse("example.com:http").is_err());
        assert!(Target::parse("ex$ample.com").is_err());
    }
}
