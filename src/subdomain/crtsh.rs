//! Certificate Transparency lookup via crt.sh

use crate::coordinator::normalize_hostname;
use crate::target::Target;
use crate::techniques::process::substitute_variables;
use crate::techniques::{Technique, TechniqueOutcome, TechniqueStatus};
use crate::{ReconError, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// One certificate record as returned by crt.sh
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtEntry {
    #[serde(default)]
    pub common_name: Option<String>,
    /// Newline-separated Subject Alternative Names
    #[serde(default)]
    pub name_value: Option<String>,
}

/// Candidate names from CT records: in the root's zone and wildcard-free
pub fn names_from_entries(entries: &[CtEntry], root: &Target) -> Vec<String> {
    let suffix = root.dotted_suffix();
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .common_name
                .iter()
                .map(String::as_str)
                .chain(entry.name_value.iter().flat_map(|names| names.split('\n')))
        })
        .map(normalize_hostname)
        .filter(|name| !name.is_empty() && !name.contains('*'))
        .filter(|name| name == root.host() || name.ends_with(&suffix))
        .collect()
}

/// Parse a crt.sh JSON body
pub fn parse_ct_response(body: &str, root: &Target) -> Result<Vec<String>> {
    let entries: Vec<CtEntry> = serde_json::from_str(body)
        .map_err(|e| ReconError::ParseError(format!("CT response: {}", e)))?;
    Ok(names_from_entries(&entries, root))
}

/// Passive subdomain source backed by a CT search endpoint
#[derive(Debug, Clone)]
pub struct CtLookup {
    client: Client,
    url_template: String,
}

impl CtLookup {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("autorecon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconError::HttpClientError(e.to_string()))?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    pub fn url_for(&self, root: &Target) -> String {
        substitute_variables(&self.url_template, &[("target", root.host())])
    }
}

#[async_trait]
impl Technique<String> for CtLookup {
    fn name(&self) -> &str {
        "crt.sh"
    }

    async fn run(&self, target: &Target) -> TechniqueOutcome<String> {
        let started = Instant::now();
        let url = self.url_for(target);
        debug!("Querying {}", url);

        let failed = |reason: String| {
            TechniqueOutcome::new("crt.sh", TechniqueStatus::Failed(reason), started.elapsed())
        };

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return TechniqueOutcome::new(self.name(), TechniqueStatus::Timeout, started.elapsed())
            }
            Err(e) => return failed(e.to_string()),
        };
        if !response.status().is_success() {
            return failed(format!("HTTP {}", response.status()));
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return failed(e.to_string()),
        };

        match parse_ct_response(&body, target) {
            Ok(names) => TechniqueOutcome::ok(self.name(), names, started.elapsed()),
            Err(e) => failed(e.to_string()),
        }
    }
}
