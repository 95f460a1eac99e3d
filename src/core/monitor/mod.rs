// src/core/monitor/mod.rs

//! Health tracking for live ingestion connections (SSE or WebSocket):
//! status transitions, uptime bookkeeping, ping sampling, quality scoring,
//! and operator recommendations.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How many ping samples the rolling window keeps.
const PING_SAMPLE_WINDOW: usize = 10;
/// How many disconnect events are retained per connection.
const DISCONNECT_HISTORY: usize = 50;
/// A heartbeat older than this counts against the quality score.
const HEARTBEAT_FRESHNESS: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Sse,
    WebSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Excellent,
    Good,
    Poor,
    Critical,
}

/// One completed or in-progress outage.
#[derive(Debug, Clone)]
struct DisconnectEvent {
    at: Instant,
    duration: Option<Duration>,
}

#[derive(Debug)]
struct ConnectionHealth {
    kind: ConnectionKind,
    status: ConnectionStatus,
    connected_at: Option<Instant>,
    last_heartbeat: Option<Instant>,
    ping_samples: VecDeque<u64>,
    total_connected: Duration,
    total_disconnected: Duration,
    last_disconnect_at: Option<Instant>,
    disconnect_events: Vec<DisconnectEvent>,
}

impl ConnectionHealth {
    fn new(kind: ConnectionKind) -> Self {
        Self {
            kind,
            status: ConnectionStatus::Disconnected,
            connected_at: None,
            last_heartbeat: None,
            ping_samples: VecDeque::with_capacity(PING_SAMPLE_WINDOW),
            total_connected: Duration::ZERO,
            total_disconnected: Duration::ZERO,
            last_disconnect_at: None,
            disconnect_events: Vec::new(),
        }
    }

    /// Uptime over the recorded totals; segments still in progress count at
    /// their next status transition. A connection with no history that is
    /// currently up reports 99.0.
    fn uptime_percent(&self) -> f64 {
        let total = self.total_connected + self.total_disconnected;
        if total.is_zero() {
            return if self.status == ConnectionStatus::Connected {
                99.0
            } else {
                0.0
            };
        }
        let pct = self.total_connected.as_secs_f64() / total.as_secs_f64() * 100.0;
        (pct * 10.0).round() / 10.0
    }

    fn average_ping(&self) -> Option<f64> {
        if self.ping_samples.is_empty() {
            return None;
        }
        let sum: u64 = self.ping_samples.iter().sum();
        Some(sum as f64 / self.ping_samples.len() as f64)
    }

    fn ping_health(&self) -> f64 {
        match self.average_ping() {
            None => 1.0,
            Some(avg) if avg <= 100.0 => 1.0,
            Some(avg) if avg <= 300.0 => 0.8,
            Some(avg) if avg <= 1000.0 => 0.5,
            Some(_) => 0.2,
        }
    }

    fn heartbeat_health(&self, now: Instant) -> f64 {
        match self.last_heartbeat {
            Some(at) if now - at <= HEARTBEAT_FRESHNESS => 1.0,
            Some(at) if now - at <= HEARTBEAT_FRESHNESS * 2 => 0.5,
            Some(_) => 0.0,
            // A fresh connection has not had time to heartbeat yet.
            None => match self.connected_at {
                Some(since) if now - since <= HEARTBEAT_FRESHNESS => 1.0,
                _ => 0.0,
            },
        }
    }

    fn status_health(&self) -> f64 {
        match self.status {
            ConnectionStatus::Connected => 1.0,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => 0.5,
            ConnectionStatus::Disconnected => 0.25,
            ConnectionStatus::Failed => 0.0,
        }
    }

    /// Weighted quality score. SSE streams carry no heartbeats, so their
    /// weight shifts onto uptime and status.
    fn quality_score(&self, now: Instant) -> f64 {
        let (w_ping, w_uptime, w_heartbeat, w_status) = match self.kind {
            ConnectionKind::WebSocket => (0.3, 0.4, 0.2, 0.1),
            ConnectionKind::Sse => (0.3, 0.5, 0.0, 0.2),
        };
        self.ping_health() * w_ping
            + (self.uptime_percent() / 100.0) * w_uptime
            + self.heartbeat_health(now) * w_heartbeat
            + self.status_health() * w_status
    }
}

fn categorize(score: f64) -> Quality {
    if score >= 0.9 {
        Quality::Excellent
    } else if score >= 0.7 {
        Quality::Good
    } else if score >= 0.5 {
        Quality::Poor
    } else {
        Quality::Critical
    }
}

/// A point-in-time health report for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub id: String,
    pub kind: ConnectionKind,
    pub status: ConnectionStatus,
    pub uptime_percent: f64,
    pub quality_score: f64,
    pub quality: Quality,
    pub average_ping_ms: Option<f64>,
    pub disconnect_count: usize,
    pub recommendation: String,
}

/// Tracks every registered live connection by id.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    connections: DashMap<String, ConnectionHealth>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&self, id: &str, kind: ConnectionKind) {
        self.connections
            .insert(id.to_string(), ConnectionHealth::new(kind));
        debug!(id, ?kind, "Connection registered with the monitor.");
    }

    pub fn unregister(&self, id: &str) {
        self.connections.remove(id);
    }

    /// Applies a status transition and its uptime bookkeeping.
    pub fn set_status(&self, id: &str, status: ConnectionStatus) {
        let Some(mut health) = self.connections.get_mut(id) else {
            return;
        };
        let now = Instant::now();
        let previous = health.status;
        if previous == status {
            return;
        }

        match status {
            ConnectionStatus::Disconnected | ConnectionStatus::Failed => {
                if let Some(since) = health.connected_at.take() {
                    health.total_connected += now - since;
                }
                if health.last_disconnect_at.is_none() {
                    health.last_disconnect_at = Some(now);
                    health.disconnect_events.push(DisconnectEvent {
                        at: now,
                        duration: None,
                    });
                    if health.disconnect_events.len() > DISCONNECT_HISTORY {
                        health.disconnect_events.remove(0);
                    }
                }
            }
            ConnectionStatus::Connected => {
                if let Some(since) = health.last_disconnect_at.take() {
                    let outage = now - since;
                    health.total_disconnected += outage;
                    if let Some(event) = health.disconnect_events.last_mut() {
                        if event.duration.is_none() {
                            event.duration = Some(outage);
                        }
                    }
                }
                health.connected_at = Some(now);
            }
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
                // Transitional states: a drop that skipped `disconnected`
                // still closes the connected segment.
                if let Some(since) = health.connected_at.take() {
                    health.total_connected += now - since;
                    if health.last_disconnect_at.is_none() {
                        health.last_disconnect_at = Some(now);
                        health.disconnect_events.push(DisconnectEvent {
                            at: now,
                            duration: None,
                        });
                    }
                }
            }
        }

        health.status = status;
        debug!(id, ?previous, ?status, "Connection status changed.");
    }

    /// Transitions a connection to `failed` when its owning task died.
    pub fn mark_dead(&self, id: &str) {
        warn!(id, "Monitored connection's task terminated; marking failed.");
        self.set_status(id, ConnectionStatus::Failed);
    }

    pub fn record_heartbeat(&self, id: &str) {
        if let Some(mut health) = self.connections.get_mut(id) {
            health.last_heartbeat = Some(Instant::now());
        }
    }

    pub fn record_ping(&self, id: &str, ping_ms: u64) {
        if let Some(mut health) = self.connections.get_mut(id) {
            if health.ping_samples.len() == PING_SAMPLE_WINDOW {
                health.ping_samples.pop_front();
            }
            health.ping_samples.push_back(ping_ms);
        }
    }

    pub fn status(&self, id: &str) -> Option<ConnectionStatus> {
        self.connections.get(id).map(|health| health.status)
    }

    /// Builds the health report for one connection.
    pub fn report(&self, id: &str) -> Option<ConnectionReport> {
        let health = self.connections.get(id)?;
        let now = Instant::now();
        let score = health.quality_score(now);
        let quality = categorize(score);
        let uptime = health.uptime_percent();
        let average_ping = health.average_ping();

        Some(ConnectionReport {
            id: id.to_string(),
            kind: health.kind,
            status: health.status,
            uptime_percent: uptime,
            quality_score: (score * 1000.0).round() / 1000.0,
            quality,
            average_ping_ms: average_ping,
            disconnect_count: health.disconnect_events.len(),
            recommendation: recommend(quality, uptime, average_ping, health.status),
        })
    }

    /// Reports for all registered connections.
    pub fn reports(&self) -> Vec<ConnectionReport> {
        let ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.report(id)).collect()
    }
}

fn recommend(
    quality: Quality,
    uptime: f64,
    average_ping: Option<f64>,
    status: ConnectionStatus,
) -> String {
    if status == ConnectionStatus::Failed {
        return "Connection has failed; restart the client or check credentials.".to_string();
    }
    match quality {
        Quality::Excellent => "No action needed.".to_string(),
        Quality::Good => "Connection is healthy; keep monitoring.".to_string(),
        Quality::Poor => {
            if uptime < 70.0 {
                "Frequent disconnects; verify the remote endpoint and network stability."
                    .to_string()
            } else if average_ping.is_some_and(|p| p > 300.0) {
                "High latency observed; check the upstream network path.".to_string()
            } else {
                "Degraded connection quality; watch for recurring drops.".to_string()
            }
        }
        Quality::Critical => {
            "Connection is unstable; investigate the network path or restart the client."
                .to_string()
        }
    }
}
