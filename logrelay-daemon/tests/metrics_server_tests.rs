//! Prometheus recorder installation tests.
//!
//! The recorder is process-global, so only one test here installs it
//! successfully and all of them run serially.

use logrelay_core::config::MetricsConfig;
use logrelay_daemon::metrics_server;
use serial_test::serial;

fn metrics_config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

#[test]
#[serial]
fn test_install_rejects_unsupported_endpoint() {
    let config = metrics_config("127.0.0.1", 19201, "/custom");
    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("unsupported metrics endpoint"));
}

#[test]
#[serial]
fn test_install_rejects_invalid_address() {
    let config = metrics_config("999.999.999.999", 19202, "/metrics");
    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("invalid metrics listen address"));
}

#[tokio::test]
#[serial]
async fn test_install_succeeds_once_and_records() {
    let config = metrics_config("127.0.0.1", 19203, "/metrics");
    metrics_server::install_metrics_recorder(&config).unwrap();

    metrics::counter!(logrelay_core::metrics::TAIL_LINES_READ_TOTAL, "source" => "tron")
        .increment(1);

    let second = metrics_server::install_metrics_recorder(&metrics_config(
        "127.0.0.1",
        19204,
        "/metrics",
    ));
    assert!(second.is_err(), "a second global recorder must be refused");
}
