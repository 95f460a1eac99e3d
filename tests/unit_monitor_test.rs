use std::time::Duration;
use wanderer_sync::core::monitor::{
    ConnectionKind, ConnectionMonitor, ConnectionStatus, Quality,
};

#[test]
fn test_register_and_report() {
    let monitor = ConnectionMonitor::new();
    monitor.register("sse:m1", ConnectionKind::Sse);
    let report = monitor.report("sse:m1").unwrap();
    assert_eq!(report.status, ConnectionStatus::Disconnected);
    assert_eq!(report.disconnect_count, 0);
    assert!(!report.recommendation.is_empty());
}

#[test]
fn test_unknown_connection_has_no_report() {
    let monitor = ConnectionMonitor::new();
    assert!(monitor.report("ghost").is_none());
}

#[test]
fn test_fresh_connected_reports_99_percent_uptime() {
    let monitor = ConnectionMonitor::new();
    monitor.register("sse:m1", ConnectionKind::Sse);
    monitor.set_status("sse:m1", ConnectionStatus::Connecting);
    monitor.set_status("sse:m1", ConnectionStatus::Connected);
    let report = monitor.report("sse:m1").unwrap();
    // A new connection with no outage history reports optimistically.
    assert!(report.uptime_percent >= 99.0);
    assert_eq!(report.quality, Quality::Excellent);
}

#[tokio::test]
async fn test_disconnect_bookkeeping() {
    let monitor = ConnectionMonitor::new();
    monitor.register("sse:m1", ConnectionKind::Sse);
    monitor.set_status("sse:m1", ConnectionStatus::Connected);
    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.set_status("sse:m1", ConnectionStatus::Disconnected);
    let report = monitor.report("sse:m1").unwrap();
    assert_eq!(report.disconnect_count, 1);

    // Reconnect closes the outage and resumes uptime accrual.
    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.set_status("sse:m1", ConnectionStatus::Connected);
    let report = monitor.report("sse:m1").unwrap();
    assert_eq!(report.status, ConnectionStatus::Connected);
    assert!(report.uptime_percent > 0.0);
    assert!(report.uptime_percent <= 100.0);
}

#[test]
fn test_reconnecting_transition_opens_an_outage() {
    let monitor = ConnectionMonitor::new();
    monitor.register("sse:m1", ConnectionKind::Sse);
    monitor.set_status("sse:m1", ConnectionStatus::Connected);
    monitor.set_status("sse:m1", ConnectionStatus::Reconnecting);
    let report = monitor.report("sse:m1").unwrap();
    assert_eq!(report.disconnect_count, 1);
    assert_eq!(report.status, ConnectionStatus::Reconnecting);
}

#[test]
fn test_mark_dead_fails_the_connection() {
    let monitor = ConnectionMonitor::new();
    monitor.register("ws:m1", ConnectionKind::WebSocket);
    monitor.set_status("ws:m1", ConnectionStatus::Connected);
    monitor.mark_dead("ws:m1");
    let report = monitor.report("ws:m1").unwrap();
    assert_eq!(report.status, ConnectionStatus::Failed);
    assert_eq!(report.quality, Quality::Critical);
    assert!(report.recommendation.contains("failed"));
}

#[test]
fn test_ping_samples_rolling_window() {
    let monitor = ConnectionMonitor::new();
    monitor.register("ws:m1", ConnectionKind::WebSocket);
    for ping in [50, 60, 70, 80, 90, 100, 110, 120, 130, 140, 2000] {
        monitor.record_ping("ws:m1", ping);
    }
    // Only the last ten samples count; the first (50) has rolled out.
    let report = monitor.report("ws:m1").unwrap();
    let average = report.average_ping_ms.unwrap();
    assert!(average > 200.0);
    assert!(average < 400.0);
}

#[test]
fn test_quality_degrades_with_high_ping() {
    let monitor = ConnectionMonitor::new();
    monitor.register("ws:good", ConnectionKind::WebSocket);
    monitor.register("ws:slow", ConnectionKind::WebSocket);
    monitor.set_status("ws:good", ConnectionStatus::Connected);
    monitor.set_status("ws:slow", ConnectionStatus::Connected);
    monitor.record_heartbeat("ws:good");
    monitor.record_heartbeat("ws:slow");
    monitor.record_ping("ws:good", 40);
    monitor.record_ping("ws:slow", 5000);

    let good = monitor.report("ws:good").unwrap();
    let slow = monitor.report("ws:slow").unwrap();
    assert!(good.quality_score > slow.quality_score);
}

#[test]
fn test_reports_cover_all_connections() {
    let monitor = ConnectionMonitor::new();
    monitor.register("sse:m1", ConnectionKind::Sse);
    monitor.register("sse:m2", ConnectionKind::Sse);
    assert_eq!(monitor.reports().len(), 2);
    monitor.unregister("sse:m1");
    assert_eq!(monitor.reports().len(), 1);
}

#[test]
fn test_status_query() {
    let monitor = ConnectionMonitor::new();
    monitor.register("sse:m1", ConnectionKind::Sse);
    assert_eq!(monitor.status("sse:m1"), Some(ConnectionStatus::Disconnected));
    monitor.set_status("sse:m1", ConnectionStatus::Connecting);
    assert_eq!(monitor.status("sse:m1"), Some(ConnectionStatus::Connecting));
    assert_eq!(monitor.status("ghost"), None);
}
