//! Technology fingerprinting for discovered web hosts

pub mod signatures;

pub use signatures::TechProfile;

use crate::config::ReconConfig;
use crate::coordinator::{AccumulatorKey, Coordinator, ResultAccumulator};
use crate::techniques::{ProcessRunner, TechniqueStatus, ToolKind};
use crate::{ReconError, Result};
use colored::*;
use log::{debug, info};
use reqwest::{Client, Response};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Fingerprint of one host
#[derive(Debug, Clone)]
pub struct HostTech {
    pub host: String,
    pub profile: TechProfile,
}

impl AccumulatorKey for HostTech {
    fn accumulator_key(&self) -> String {
        self.host.clone()
    }
}

/// Header/content/cookie matching plus whatweb when installed
#[derive(Debug, Clone)]
pub struct TechDetector {
    client: Client,
    runner: Option<ProcessRunner>,
    whatweb_timeout: Duration,
    workers: usize,
    notify: bool,
    cancel: CancellationToken,
}

impl TechDetector {
    pub fn new(config: &ReconConfig, runner: ProcessRunner, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("autorecon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReconError::HttpClientError(e.to_string()))?;
        Ok(Self {
            client,
            runner: config.use_tools.then_some(runner),
            whatweb_timeout: config.tool_timeout(ToolKind::WhatWeb),
            workers: config.threads,
            notify: config.realtime_notifications,
            cancel,
        })
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    /// Fingerprint every host; hosts with nothing detected are left out
    pub async fn detect(&self, hosts: &[String]) -> BTreeMap<String, TechProfile> {
        let accumulator: ResultAccumulator<HostTech> = ResultAccumulator::new();
        let units = hosts.iter().cloned().map(|host| {
            let detector = self.clone();
            async move {
                let profile = detector.analyze(&host).await;
                if profile.is_empty() {
                    Vec::new()
                } else {
                    if detector.notify {
                        print_profile(&host, &profile);
                    }
                    vec![HostTech { host, profile }]
                }
            }
        })
        .collect::<Vec<_>>();

        Coordinator::new(self.workers, self.cancel.clone())
            .run("tech", units, &accumulator)
            .await;

        accumulator
            .snapshot()
            .into_iter()
            .map(|entry| (entry.host, entry.profile))
            .collect()
    }

    /// Fingerprint one host
    pub async fn analyze(&self, host: &str) -> TechProfile {
        let mut profile = TechProfile::new();

        for scheme in ["https", "http"] {
            let url = format!("{}://{}", scheme, host);
            let response = match self.client.get(&url).send().await {
                Ok(response) if response.status().as_u16() == 200 => response,
                Ok(response) => {
                    debug!("{} answered {}", url, response.status());
                    continue;
                }
                Err(e) => {
                    debug!("{} failed: {}", url, e);
                    continue;
                }
            };

            signatures::analyze_headers(response.headers(), &mut profile);
            let cookies = signatures::cookie_names(response.headers());
            signatures::analyze_cookies(&cookies, &mut profile);
            let body = read_capped_body(response, MAX_BODY_BYTES).await;
            signatures::analyze_content(&String::from_utf8_lossy(&body), &mut profile);
            break;
        }

        if let Some(output) = self.run_whatweb(host).await {
            signatures::merge_whatweb(&output, &mut profile);
        }
        profile
    }

    /// whatweb over http, then https when the first attempt fails
    async fn run_whatweb(&self, host: &str) -> Option<String> {
        let runner = self.runner.as_ref()?;
        if !runner.is_available(ToolKind::WhatWeb.binary()) {
            return None;
        }

        for scheme in ["http", "https"] {
            let url = format!("{}://{}", scheme, host);
            let invocation = ToolKind::WhatWeb.invocation(&url, self.whatweb_timeout);
            let output = runner.run(&invocation).await;
            match output.status {
                TechniqueStatus::Ok => return Some(output.stdout),
                TechniqueStatus::Timeout => {
                    info!("whatweb timed out for {}", url);
                    return None;
                }
                status => debug!("whatweb for {}: {}", url, status),
            }
        }
        None
    }
}

/// Read at most `max` body bytes; the rest is never pulled off the socket
async fn read_capped_body(mut response: Response, max: usize) -> Vec<u8> {
    let mut body = Vec::new();
    while body.len() < max {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = max - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Body read from {} failed: {}", response.url(), e);
                break;
            }
        }
    }
    body
}

fn print_profile(host: &str, profile: &TechProfile) {
    println!("{}", format!("[+] Technology stack for {}:", host).green());
    for (category, names) in profile {
        let title = category.replace('_', " ");
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        println!("  {}: {}", title.blue(), names.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::techniques::ToolInventory;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_detects_from_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let body = "<script src=\"/js/jquery.js\"></script>";
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nServer: nginx/1.25\r\nSet-Cookie: PHPSESSID=1\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        let config = ReconConfig::new("127.0.0.1").with_tools(false);
        let runner = ProcessRunner::new(Arc::new(ToolInventory::default()));
        let detector = TechDetector::new(&config, runner, CancellationToken::new())
            .unwrap()
            .with_notifications(false);

        let host = format!("127.0.0.1:{}", port);
        let results = detector.detect(&[host.clone()]).await;
        let profile = &results[&host];
        assert!(profile["web_server"].contains("Nginx"));
        assert!(profile["frameworks"].contains("PHP"));
        assert!(profile["other"].contains("jQuery"));
    }

    #[tokio::test]
    async fn test_endless_body_is_read_up_to_the_cap() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html>wp-content";
            let _ = socket.write_all(head.as_bytes()).await;
            let padding = vec![b' '; 8192];
            while socket.write_all(&padding).await.is_ok() {}
        });

        let response = Client::new()
            .get(format!("http://127.0.0.1:{}/", port))
            .send()
            .await
            .unwrap();
        let started = std::time::Instant::now();
        let body = read_capped_body(response, 64 * 1024).await;

        assert_eq!(body.len(), 64 * 1024);
        assert!(body.starts_with(b"<html>wp-content"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
