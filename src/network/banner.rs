//! Banner augmentation for confirmed open ports
//!
//! One extra bounded read per port after a protocol-appropriate trigger.
//! Any failure yields `None`; a banner never fails the port record.

use super::socket::resolve_host;
use super::truncate_banner;
use log::debug;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;

const READ_BUFFER: usize = 1024;

/// Ports that get an HTTP request line as trigger
const HTTP_PORTS: &[u16] = &[80, 81, 3000, 5000, 8000, 8008, 8080, 8081, 8888];

/// Ports that speak TLS first; 443/8443 then get the HTTP trigger
const TLS_PORTS: &[u16] = &[443, 465, 993, 995, 8443];

/// Protocols that greet unprompted
const GREETING_PORTS: &[u16] = &[21, 22, 25, 110, 143, 587, 3306, 5900];

/// What to send before reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerTrigger {
    /// Send nothing and wait for the server greeting
    Silent,
    /// Send an HTTP/1.1 GET for `/`
    HttpRequest,
    /// Send a bare CRLF
    Newline,
    /// TLS handshake (verification disabled), then the inner trigger
    Tls(TlsInner),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsInner {
    Silent,
    HttpRequest,
}

impl BannerTrigger {
    /// Pick the trigger for a port
    pub fn for_port(port: u16) -> Self {
        if TLS_PORTS.contains(&port) {
            if port == 443 || port == 8443 {
                BannerTrigger::Tls(TlsInner::HttpRequest)
            } else {
                BannerTrigger::Tls(TlsInner::Silent)
            }
        } else if HTTP_PORTS.contains(&port) {
            BannerTrigger::HttpRequest
        } else if GREETING_PORTS.contains(&port) {
            BannerTrigger::Silent
        } else {
            BannerTrigger::Newline
        }
    }
}

fn http_request(host: &str) -> Vec<u8> {
    format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUser-Agent: autorecon/{}\r\nConnection: close\r\n\r\n",
        host,
        env!("CARGO_PKG_VERSION")
    )
    .into_bytes()
}

/// Bounded banner reader
#[derive(Debug, Clone)]
pub struct BannerGrabber {
    timeout: Duration,
}

impl BannerGrabber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Grab a banner from `host:port`, at most `timeout` wall-clock.
    pub async fn grab(&self, host: &str, port: u16) -> Option<String> {
        let started = Instant::now();
        let ip = resolve_host(host, self.timeout).await.first().copied()?;
        let remaining = self.timeout.checked_sub(started.elapsed())?;
        self.grab_addr(host, SocketAddr::new(ip, port), remaining).await
    }

    async fn grab_addr(&self, host: &str, addr: SocketAddr, limit: Duration) -> Option<String> {
        grab_with(host, addr, BannerTrigger::for_port(addr.port()), limit).await
    }
}

/// One bounded read with an explicit trigger.
///
/// The whole exchange, TLS handshake included, is a single future under
/// `limit`; the socket is closed when it returns or is dropped.
async fn grab_with(
    host: &str,
    addr: SocketAddr,
    trigger: BannerTrigger,
    limit: Duration,
) -> Option<String> {
    let exchange = async {
        match trigger {
            BannerTrigger::Tls(inner) => tls_read(host, addr, inner).await,
            trigger => plain_read(host, addr, trigger).await,
        }
    };
    let raw = timeout(limit, exchange).await.ok().flatten()?;

    let text = String::from_utf8_lossy(&raw);
    let banner = truncate_banner(&text);
    if banner.is_empty() {
        None
    } else {
        Some(banner)
    }
}

async fn read_first<S: AsyncRead + Unpin>(stream: &mut S, addr: SocketAddr) -> Option<Vec<u8>> {
    let mut buffer = vec![0u8; READ_BUFFER];
    match stream.read(&mut buffer).await {
        Ok(n) if n > 0 => {
            buffer.truncate(n);
            Some(buffer)
        }
        Ok(_) => None,
        Err(e) => {
            debug!("Banner read from {} failed: {}", addr, e);
            None
        }
    }
}

async fn plain_read(host: &str, addr: SocketAddr, trigger: BannerTrigger) -> Option<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await.ok()?;
    let _ = stream.set_nodelay(true);

    match trigger {
        BannerTrigger::HttpRequest => stream.write_all(&http_request(host)).await.ok()?,
        BannerTrigger::Newline => stream.write_all(b"\r\n").await.ok()?,
        BannerTrigger::Silent | BannerTrigger::Tls(_) => {}
    }

    read_first(&mut stream, addr).await
}

async fn tls_read(host: &str, addr: SocketAddr, inner: TlsInner) -> Option<Vec<u8>> {
    let tcp = TcpStream::connect(addr).await.ok()?;

    let mut builder = SslConnector::builder(SslMethod::tls()).ok()?;
    builder.set_verify(SslVerifyMode::NONE);
    let connector = builder.build();
    let mut config = connector.configure().ok()?;
    config.set_verify_hostname(false);
    // SNI carries names only
    if host.parse::<IpAddr>().is_ok() {
        config.set_use_server_name_indication(false);
    }
    let ssl = config.into_ssl(host).ok()?;

    let mut tls = SslStream::new(ssl, tcp).ok()?;
    if let Err(e) = Pin::new(&mut tls).connect().await {
        debug!("TLS handshake with {} failed: {}", addr, e);
        return None;
    }

    if inner == TlsInner::HttpRequest {
        tls.write_all(&http_request(host)).await.ok()?;
    }

    read_first(&mut tls, addr).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_trigger_selection() {
        assert_eq!(BannerTrigger::for_port(22), BannerTrigger::Silent);
        assert_eq!(BannerTrigger::for_port(21), BannerTrigger::Silent);
        assert_eq!(BannerTrigger::for_port(80), BannerTrigger::HttpRequest);
        assert_eq!(BannerTrigger::for_port(8080), BannerTrigger::HttpRequest);
        assert_eq!(BannerTrigger::for_port(443), BannerTrigger::Tls(TlsInner::HttpRequest));
        assert_eq!(BannerTrigger::for_port(993), BannerTrigger::Tls(TlsInner::Silent));
        assert_eq!(BannerTrigger::for_port(6379), BannerTrigger::Newline);
    }

    #[tokio::test]
    async fn test_reads_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Generic port: the grabber sends a newline first
            let mut buf = [0u8; 8];
            let _ = socket.read(&mut buf).await;
            socket.write_all(b"+PONG hello\r\n").await.unwrap();
        });

        let grabber = BannerGrabber::new(Duration::from_secs(2));
        let banner = grabber.grab("127.0.0.1", port).await;
        assert_eq!(banner.as_deref(), Some("+PONG hello"));
    }

    #[tokio::test]
    async fn test_silent_server_returns_none_within_bound() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let grabber = BannerGrabber::new(Duration::from_millis(300));
        let started = Instant::now();
        let banner = grabber.grab("127.0.0.1", port).await;
        assert_eq!(banner, None);
        assert!(started.elapsed() < Duration::from_millis(300) + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_trickling_tls_peer_is_released_at_the_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let accepted = Instant::now();
            // A 16 KiB handshake record header, then one byte at a time
            let _ = socket.write_all(&[0x16, 0x03, 0x03, 0x40, 0x00]).await;
            while accepted.elapsed() < Duration::from_secs(5) {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if socket.write_all(&[0u8]).await.is_err() {
                    break;
                }
            }
            let _ = closed_tx.send(accepted.elapsed());
        });

        let started = Instant::now();
        let banner = grab_with(
            "127.0.0.1",
            addr,
            BannerTrigger::Tls(TlsInner::HttpRequest),
            Duration::from_millis(300),
        )
        .await;
        assert_eq!(banner, None);
        assert!(started.elapsed() < Duration::from_secs(1));

        let held_for = closed_rx.await.unwrap();
        assert!(held_for < Duration::from_secs(2), "socket held for {:?}", held_for);
    }

    #[tokio::test]
    async fn test_long_banner_is_truncated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8];
            let _ = socket.read(&mut buf).await;
            socket.write_all(&[b'x'; 900]).await.unwrap();
        });

        let grabber = BannerGrabber::new(Duration::from_secs(2));
        let banner = grabber.grab("127.0.0.1", port).await.unwrap();
        assert!(banner.len() <= crate::network::MAX_BANNER_BYTES);
    }
}
