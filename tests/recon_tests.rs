//! End-to-end runs against localhost

use autorecon::{Recon, ReconConfig, ReconError, ToolInventory};
use std::fs;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn config(target: &str, output: &std::path::Path) -> ReconConfig {
    let mut config = ReconConfig::new(target)
        .with_tools(false)
        .with_banner_grab(false)
        .with_timeout(300)
        .with_output_dir(output);
    config.skip_tech = true;
    config.realtime_notifications = false;
    config
}

#[tokio::test]
async fn test_run_writes_every_file() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let output = tempfile::tempdir().unwrap();

    let target = format!("127.0.0.1:{}", port);
    let recon = Recon::new(config(&target, output.path()), CancellationToken::new())
        .unwrap()
        .with_inventory(ToolInventory::default());
    let (results, report) = recon.run().await.unwrap();

    assert!(!results.cancelled);
    assert!(results.subdomains.is_empty());
    assert_eq!(results.open_port_count(), 1);

    let dir = report.parent().unwrap();
    assert!(dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("127.0.0.1_"));
    for name in ["subdomains.txt", "tech_stack.json", "results.json", "recon_report.txt"] {
        assert!(dir.join(name).is_file(), "{} missing", name);
    }

    let ports = fs::read_to_string(dir.join("ports_127.0.0.1.txt")).unwrap();
    assert!(ports.starts_with("Port Scan Results for 127.0.0.1"));
    assert!(ports.contains(&format!("{}/tcp/open", port)));
    assert!(ports.contains("Total open ports: 1"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("results.json")).unwrap()).unwrap();
    assert_eq!(json["ports"][0]["ports"][0]["port"], port);
    assert_eq!(json["cancelled"], false);
}

#[tokio::test]
async fn test_interrupted_run_reports_partial_results() {
    let output = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let recon = Recon::new(config("example.com", output.path()), cancel).unwrap();
    let (results, report) = recon.run().await.unwrap();

    assert!(results.cancelled);
    assert!(results.subdomains.is_empty());
    let text = fs::read_to_string(report).unwrap();
    assert!(text.contains("interrupted"));
}

#[test]
fn test_zero_workers_is_a_configuration_error() {
    let output = tempfile::tempdir().unwrap();
    let config = config("example.com", output.path()).with_threads(0);
    let err = Recon::new(config, CancellationToken::new()).err().unwrap();
    assert!(matches!(err, ReconError::ConfigError(_)));
}

#[tokio::test]
async fn test_explicit_missing_wordlist_is_a_configuration_error() {
    let output = tempfile::tempdir().unwrap();
    let config = config("example.com", output.path()).with_wordlist("/nonexistent/words.txt");
    let recon = Recon::new(config, CancellationToken::new()).unwrap();

    let err = recon.run().await.unwrap_err();
    assert!(matches!(err, ReconError::ConfigError(_)));
}
