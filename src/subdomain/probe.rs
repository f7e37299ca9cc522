//! Subdomain existence probe unit

use crate::network::socket::resolve_host;
use crate::{ReconError, Result};
use log::debug;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;

const MAX_REDIRECTS: usize = 10;

/// How a candidate was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    Https(u16),
    Http(u16),
    Resolves,
}

/// Checks whether a fully-qualified candidate exists.
///
/// HTTPS then HTTP, following redirects with certificate validation off; a
/// status below 400 on either is enough. Otherwise a successful name
/// resolution counts on its own.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    dns_timeout: Duration,
}

impl HttpProbe {
    pub fn new(http_timeout: Duration, dns_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .connect_timeout(http_timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("autorecon/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .build()
            .map_err(|e| ReconError::HttpClientError(e.to_string()))?;
        Ok(Self {
            client,
            dns_timeout,
        })
    }

    pub async fn check(&self, fqdn: &str) -> Option<Evidence> {
        for scheme in ["https", "http"] {
            let url = format!("{}://{}", scheme, fqdn);
            match self.client.get(&url).send().await {
                Ok(response) if response.status().as_u16() < 400 => {
                    let code = response.status().as_u16();
                    return Some(if scheme == "https" {
                        Evidence::Https(code)
                    } else {
                        Evidence::Http(code)
                    });
                }
                Ok(response) => debug!("{} answered {}", url, response.status()),
                Err(e) => debug!("{} failed: {}", url, e),
            }
        }

        if resolve_host(fqdn, self.dns_timeout).await.is_empty() {
            None
        } else {
            Some(Evidence::Resolves)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn http_fixture(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_plain_http_success() {
        let port = http_fixture("200 OK").await;
        let probe = HttpProbe::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
        let evidence = probe.check(&format!("127.0.0.1:{}", port)).await;
        assert_eq!(evidence, Some(Evidence::Http(200)));
    }

    #[tokio::test]
    async fn test_error_status_does_not_count() {
        let port = http_fixture("404 Not Found").await;
        let probe = HttpProbe::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
        // `host:port` is not a resolvable name, so nothing confirms it
        let evidence = probe.check(&format!("127.0.0.1:{}", port)).await;
        assert_eq!(evidence, None);
    }

    #[tokio::test]
    async fn test_resolution_alone_is_enough() {
        let probe = HttpProbe::new(Duration::from_millis(300), Duration::from_secs(1)).unwrap();
        // Local 80/443 may or may not answer; the literal always resolves
        let evidence = probe.check("127.0.0.1").await;
        assert!(matches!(
            evidence,
            Some(Evidence::Resolves) | Some(Evidence::Http(_)) | Some(Evidence::Https(_))
        ));
    }

    #[tokio::test]
    async fn test_nonexistent_name() {
        let probe = HttpProbe::new(Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        assert_eq!(probe.check("nothing-here.invalid").await, None);
    }
}
