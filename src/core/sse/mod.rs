// src/core/sse/mod.rs

//! The per-map SSE ingestion client: a long-lived task that holds the
//! streaming HTTP connection, parses and validates events, routes them onto
//! the bus, and reconnects with bounded exponential backoff.

use crate::core::SyncError;
use crate::core::metrics;
use crate::core::monitor::{ConnectionKind, ConnectionMonitor, ConnectionStatus};
use crate::core::pubsub::{BusMessage, PubSubManager};
use futures::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod events;
pub mod parser;

use events::{DEFAULT_EVENT_FILTER, EventCategory, EventKind, MapEvent};
use parser::SseParser;

/// The ceiling on the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// The first reconnect delay; doubles per failed attempt.
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Jitter applied to reconnect delays, as a fraction of the delay.
const RECONNECT_JITTER: f64 = 0.4;

/// Per-map client configuration.
#[derive(Debug, Clone)]
pub struct SseClientConfig {
    pub map_id: String,
    /// The map's stable identity; also the bus topic its events land on.
    pub map_url: String,
    pub api_token: String,
    /// Event types requested from the remote stream.
    pub events: Vec<String>,
    /// Resume point for the first connect.
    pub last_event_id: Option<String>,
    pub connect_timeout: Duration,
    /// `None`: the stream is never idle-closed from our side.
    pub recv_timeout: Option<Duration>,
    /// Cadence of the liveness check; a stream quiet for two intervals is
    /// flagged (but not closed).
    pub keepalive_interval: Duration,
}

impl SseClientConfig {
    pub fn new(map_id: &str, map_url: &str, api_token: &str) -> Self {
        Self {
            map_id: map_id.to_string(),
            map_url: map_url.to_string(),
            api_token: api_token.to_string(),
            events: DEFAULT_EVENT_FILTER.iter().map(|s| s.to_string()).collect(),
            last_event_id: None,
            connect_timeout: Duration::from_secs(30),
            recv_timeout: None,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// The SSE ingestion client for one map.
pub struct SseClient {
    config: SseClientConfig,
    pubsub: Arc<PubSubManager>,
    monitor: Arc<ConnectionMonitor>,
    client: reqwest::Client,
    last_event_id: Option<String>,
    reconnect_attempts: u32,
}

impl SseClient {
    pub fn new(
        config: SseClientConfig,
        pubsub: Arc<PubSubManager>,
        monitor: Arc<ConnectionMonitor>,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(SyncError::from)?;
        let last_event_id = config.last_event_id.clone();
        Ok(Self {
            config,
            pubsub,
            monitor,
            client,
            last_event_id,
            reconnect_attempts: 0,
        })
    }

    /// The monitor id for this client.
    pub fn connection_id(&self) -> String {
        format!("sse:{}", self.config.map_id)
    }

    /// Assembles the stream URL: scheme+host of the map url, the map's path
    /// as slug, the event filter, and the resume point when one is known.
    pub fn stream_url(&self) -> Result<String, SyncError> {
        let map_url = url::Url::parse(&self.config.map_url)?;
        let host = map_url
            .host_str()
            .ok_or_else(|| SyncError::MalformedUrl(self.config.map_url.clone()))?;
        let slug = map_url.path().trim_matches('/');

        let mut stream = url::Url::parse(&format!("{}://{}", map_url.scheme(), host))?;
        if let Some(port) = map_url.port() {
            stream
                .set_port(Some(port))
                .map_err(|_| SyncError::MalformedUrl(self.config.map_url.clone()))?;
        }
        stream.set_path(&format!("/api/maps/{slug}/events/stream"));
        stream
            .query_pairs_mut()
            .append_pair("events", &self.config.events.join(","));
        if let Some(last_event_id) = &self.last_event_id {
            stream
                .query_pairs_mut()
                .append_pair("last_event_id", last_event_id);
        }
        Ok(stream.to_string())
    }

    /// Runs the client until shutdown. A failed connect schedules a
    /// reconnect and keeps the client alive.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let id = self.connection_id();
        self.monitor.register(&id, ConnectionKind::Sse);
        info!(map_id = %self.config.map_id, "SSE client started.");

        loop {
            let status = if self.reconnect_attempts == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            };
            self.monitor.set_status(&id, status);

            match self.connect_and_stream(&id, &mut shutdown_rx).await {
                StreamEnd::Shutdown => {
                    self.monitor.set_status(&id, ConnectionStatus::Disconnected);
                    info!(map_id = %self.config.map_id, "SSE client stopped.");
                    return;
                }
                StreamEnd::Lost(error) => {
                    warn!(
                        map_id = %self.config.map_id,
                        %error,
                        "SSE stream lost; scheduling reconnect"
                    );
                }
            }

            self.reconnect_attempts += 1;
            metrics::SSE_RECONNECTS_TOTAL.inc();
            let delay = reconnect_delay(self.reconnect_attempts);
            debug!(
                map_id = %self.config.map_id,
                attempt = self.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "SSE reconnect armed"
            );

            // The pending reconnect timer is dropped (cancelled) if shutdown
            // arrives first.
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.recv() => {
                    self.monitor.set_status(&id, ConnectionStatus::Disconnected);
                    return;
                }
            }
        }
    }

    /// One connection lifetime: connect, then pump the stream until it ends.
    async fn connect_and_stream(
        &mut self,
        id: &str,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> StreamEnd {
        let url = match self.stream_url() {
            Ok(url) => url,
            Err(error) => return StreamEnd::Lost(error),
        };

        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_token))
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive");

        let response = tokio::select! {
            result = request.send() => match result {
                Ok(response) => response,
                Err(error) => return StreamEnd::Lost(SyncError::from(error)),
            },
            _ = shutdown_rx.recv() => return StreamEnd::Shutdown,
        };

        if !response.status().is_success() {
            return StreamEnd::Lost(SyncError::from_status(response.status().as_u16(), None));
        }

        self.monitor.set_status(id, ConnectionStatus::Connected);
        self.reconnect_attempts = 0;
        info!(map_id = %self.config.map_id, "SSE stream connected.");

        let mut stream = Box::pin(response.bytes_stream());
        let mut sse_parser = SseParser::new();
        let mut keepalive = tokio::time::interval(self.config.keepalive_interval);
        keepalive.reset();
        let mut last_activity = tokio::time::Instant::now();

        enum Pump {
            Chunk(Result<Option<bytes::Bytes>, SyncError>),
            Keepalive,
        }

        loop {
            let pump = tokio::select! {
                chunk = next_chunk(&mut stream, self.config.recv_timeout) => Pump::Chunk(chunk),
                _ = keepalive.tick() => Pump::Keepalive,
                _ = shutdown_rx.recv() => return StreamEnd::Shutdown,
            };

            match pump {
                Pump::Chunk(Ok(Some(bytes))) => {
                    last_activity = tokio::time::Instant::now();
                    // Any traffic, keep-alive comments included, is liveness.
                    self.monitor.record_heartbeat(id);
                    for raw in sse_parser.push(&bytes) {
                        self.handle_frame(id, raw);
                    }
                }
                Pump::Chunk(Ok(None)) => return StreamEnd::Lost(SyncError::ConnectionReset),
                Pump::Chunk(Err(error)) => return StreamEnd::Lost(error),
                Pump::Keepalive => {
                    let quiet = tokio::time::Instant::now() - last_activity;
                    if quiet >= self.config.keepalive_interval * 2 {
                        warn!(
                            map_id = %self.config.map_id,
                            quiet_secs = quiet.as_secs(),
                            "SSE stream has gone quiet"
                        );
                    }
                }
            }
        }
    }

    /// Decodes, validates, and routes one frame. Bad frames are dropped
    /// with a log; they never abort the stream.
    fn handle_frame(&mut self, id: &str, raw: parser::RawSseEvent) {
        let event = match raw.decode() {
            Ok(event) => event,
            Err(error) => {
                metrics::SSE_EVENTS_DISCARDED_TOTAL.inc();
                warn!(map_id = %self.config.map_id, %error, "Discarding invalid SSE event");
                return;
            }
        };

        let event_id = event.id.clone();
        if self.route(id, event) {
            // Resume point advances only after a successful handoff.
            self.last_event_id = Some(event_id);
        }
    }

    /// Routes a validated event by category. Returns whether the event was
    /// handed off (or consumed) successfully.
    fn route(&self, id: &str, event: MapEvent) -> bool {
        metrics::SSE_EVENTS_TOTAL
            .with_label_values(&[event.kind.as_str()])
            .inc();

        match event.kind.category() {
            EventCategory::System | EventCategory::Connection => {
                self.pubsub
                    .broadcast(&self.config.map_url, BusMessage::Event(event));
                true
            }
            EventCategory::Special => {
                match &event.kind {
                    EventKind::Connected => {
                        info!(
                            map_id = %self.config.map_id,
                            server_time = event.server_time.as_deref().unwrap_or("unknown"),
                            "SSE stream acknowledged connection"
                        );
                        self.monitor.record_heartbeat(id);
                    }
                    _ => {
                        // map_kill is intentionally not synchronized.
                        debug!(map_id = %self.config.map_id, kind = event.kind.as_str(), "Ignoring special event");
                    }
                }
                true
            }
            EventCategory::Other => {
                debug!(
                    map_id = %self.config.map_id,
                    kind = event.kind.as_str(),
                    "Ignoring unhandled event type"
                );
                true
            }
        }
    }

    /// The resume point the next connect will request.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }
}

/// Why a connection lifetime ended.
enum StreamEnd {
    Shutdown,
    Lost(SyncError),
}

/// Pulls the next chunk, applying the receive timeout when one is set.
async fn next_chunk<S>(
    stream: &mut S,
    recv_timeout: Option<Duration>,
) -> Result<Option<bytes::Bytes>, SyncError>
where
    S: futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    let next = async {
        match stream.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(error)) => Err(SyncError::from(error)),
            None => Ok(None),
        }
    };
    match recv_timeout {
        Some(timeout) => tokio::time::timeout(timeout, next)
            .await
            .map_err(|_| SyncError::Timeout)?,
        None => next.await,
    }
}

/// `min(30 s, 1 s × 2^(attempts-1))` with ±40% jitter, re-capped at 30 s.
pub fn reconnect_delay(attempts: u32) -> Duration {
    let base = INITIAL_RECONNECT_DELAY
        .saturating_mul(2u32.saturating_pow(attempts.saturating_sub(1).min(31)))
        .min(MAX_RECONNECT_DELAY);
    let jitter = rand::thread_rng().gen_range(-RECONNECT_JITTER..=RECONNECT_JITTER);
    let jittered = base.as_secs_f64() * (1.0 + jitter);
    Duration::from_secs_f64(jittered.max(0.0)).min(MAX_RECONNECT_DELAY)
}
