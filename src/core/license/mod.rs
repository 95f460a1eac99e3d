// src/core/license/mod.rs

//! The license validator: a singleton actor that validates the deployment's
//! license against the remote manager, caches the result, and backs its
//! refresh schedule off under rate limiting. It never raises to callers; the
//! public handle always returns a structured state.

use crate::config::{AppEnv, LicenseConfig};
use crate::core::SyncError;
use crate::core::cache::{Cache, CacheKind, Ttl};
use crate::core::http::{Auth, HttpClient, Service};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

/// The product identifier sent to the license manager.
const PRODUCT: &str = "wanderer_notifier";
/// The cache key the last validation result is stored under.
const STATUS_CACHE_KEY: &str = "license:status";
/// The `backoff_multiplier` ceiling.
const MAX_BACKOFF_MULTIPLIER: u32 = 32;
/// The refresh delay never exceeds this many base intervals.
const MAX_REFRESH_STRETCH: u32 = 10;
/// Callers are never blocked longer than this on the validator.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters for outbound notifications, by category.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationCounts {
    pub system: u64,
    pub character: u64,
    pub killmail: u64,
}

/// The notification categories tracked by the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    System,
    Character,
    Killmail,
}

/// The validator's full state, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LicenseState {
    pub valid: bool,
    pub bot_assigned: bool,
    pub details: Option<Value>,
    pub error: Option<String>,
    pub error_message: Option<String>,
    /// Epoch seconds of the last completed validation.
    pub last_validated: u64,
    pub notification_counts: NotificationCounts,
    pub backoff_multiplier: u32,
}

impl LicenseState {
    /// The safe fallback when validation cannot complete.
    pub fn invalid_default() -> Self {
        Self {
            valid: false,
            bot_assigned: false,
            details: None,
            error: Some("validation_unavailable".to_string()),
            error_message: Some("License validation did not complete".to_string()),
            last_validated: 0,
            notification_counts: NotificationCounts::default(),
            backoff_multiplier: 1,
        }
    }

    /// The synthetic state for dev/test deployments without credentials.
    pub fn dev_default() -> Self {
        Self {
            valid: true,
            bot_assigned: true,
            details: Some(json!({"license_valid": true, "message": "Development mode"})),
            error: None,
            error_message: None,
            last_validated: now_epoch_secs(),
            notification_counts: NotificationCounts::default(),
            backoff_multiplier: 1,
        }
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

enum Command {
    Validate {
        force_refresh: bool,
        reply: oneshot::Sender<LicenseState>,
    },
    State {
        reply: oneshot::Sender<LicenseState>,
    },
    IncrementNotification {
        kind: NotificationKind,
    },
}

/// The cloneable public API of the validator.
#[derive(Clone)]
pub struct LicenseHandle {
    tx: mpsc::Sender<Command>,
}

impl LicenseHandle {
    /// Validates (or returns the cached status). Wrapped in the safety
    /// timeout; on timeout or a dead actor the safe invalid state comes back.
    pub async fn validate(&self, force_refresh: bool) -> LicenseState {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Command::Validate {
                force_refresh,
                reply,
            })
            .await;
        if sent.is_err() {
            return LicenseState::invalid_default();
        }
        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(state)) => state,
            _ => {
                error!("License validation timed out; returning safe default.");
                LicenseState::invalid_default()
            }
        }
    }

    /// The current state without triggering a validation.
    pub async fn state(&self) -> LicenseState {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::State { reply }).await.is_err() {
            return LicenseState::invalid_default();
        }
        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(state)) => state,
            _ => LicenseState::invalid_default(),
        }
    }

    pub async fn increment_notification(&self, kind: NotificationKind) {
        let _ = self.tx.send(Command::IncrementNotification { kind }).await;
    }
}

/// The long-lived validator actor.
pub struct LicenseValidator {
    config: LicenseConfig,
    env: AppEnv,
    http: Arc<HttpClient>,
    cache: Arc<Cache>,
    state: LicenseState,
    rx: mpsc::Receiver<Command>,
}

impl LicenseValidator {
    pub fn new(
        config: LicenseConfig,
        env: AppEnv,
        http: Arc<HttpClient>,
        cache: Arc<Cache>,
    ) -> (Self, LicenseHandle) {
        let (tx, rx) = mpsc::channel(16);
        let validator = Self {
            config,
            env,
            http,
            cache,
            state: LicenseState::invalid_default(),
            rx,
        };
        (validator, LicenseHandle { tx })
    }

    /// Runs the actor: an initial validation, then scheduled refreshes
    /// stretched by the backoff multiplier, interleaved with caller commands.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("License validator started.");
        self.perform_validation().await;

        enum Wake {
            Command(Option<Command>),
            Refresh,
            Shutdown,
        }

        loop {
            let refresh_in = self.next_refresh_delay();
            let wake = tokio::select! {
                command = self.rx.recv() => Wake::Command(command),
                _ = tokio::time::sleep(refresh_in) => Wake::Refresh,
                _ = shutdown_rx.recv() => Wake::Shutdown,
            };

            match wake {
                Wake::Command(Some(Command::Validate {
                    force_refresh,
                    reply,
                })) => {
                    let state = self.validate(force_refresh).await;
                    let _ = reply.send(state);
                }
                Wake::Command(Some(Command::State { reply })) => {
                    let _ = reply.send(self.state.clone());
                }
                Wake::Command(Some(Command::IncrementNotification { kind })) => {
                    let counts = &mut self.state.notification_counts;
                    match kind {
                        NotificationKind::System => counts.system += 1,
                        NotificationKind::Character => counts.character += 1,
                        NotificationKind::Killmail => counts.killmail += 1,
                    }
                }
                Wake::Command(None) => return,
                Wake::Refresh => self.perform_validation().await,
                Wake::Shutdown => {
                    info!("License validator shutting down.");
                    return;
                }
            }
        }
    }

    /// The delay before the next scheduled refresh: the base interval
    /// stretched by the multiplier, clamped at ten intervals.
    fn next_refresh_delay(&self) -> Duration {
        let stretch = self.state.backoff_multiplier.min(MAX_REFRESH_STRETCH);
        Duration::from_millis(self.config.refresh_interval_ms.saturating_mul(stretch as u64))
    }

    /// Cached-or-fresh validation, per the caller's `force_refresh`.
    async fn validate(&mut self, force_refresh: bool) -> LicenseState {
        if !force_refresh {
            if let Ok(value) = self.cache.get(STATUS_CACHE_KEY) {
                if let Ok(mut cached) = serde_json::from_value::<LicenseState>(value) {
                    cached.notification_counts = self.state.notification_counts;
                    return cached;
                }
            }
        }
        self.perform_validation().await;
        self.state.clone()
    }

    /// One remote validation round; folds the outcome into the state.
    async fn perform_validation(&mut self) {
        // Dev-mode shortcut: missing credentials in dev/test are fine.
        if self.env.is_dev_or_test()
            && (self.config.license_key.is_none() || self.config.manager_api_key.is_none())
        {
            let mut state = LicenseState::dev_default();
            state.notification_counts = self.state.notification_counts;
            self.state = state;
            return;
        }

        match self.call_license_manager().await {
            Ok(body) => self.apply_success(body),
            Err(SyncError::RateLimited { .. }) => {
                // Rate limiting preserves the previous verdict.
                warn!("License manager rate limited; keeping previous state and backing off.");
                self.state.error = Some("rate_limited".to_string());
                self.state.error_message =
                    Some("License manager rate limited the validation call".to_string());
                self.state.last_validated = now_epoch_secs();
                self.double_backoff();
            }
            Err(error) => {
                warn!(%error, "License validation failed.");
                self.state.valid = false;
                self.state.bot_assigned = false;
                self.state.error = Some(error_tag(&error).to_string());
                self.state.error_message = Some(error.to_string());
                self.state.last_validated = now_epoch_secs();
                self.double_backoff();
            }
        }
    }

    async fn call_license_manager(&self) -> Result<Value, SyncError> {
        let license_key = self
            .config
            .license_key
            .as_deref()
            .ok_or(SyncError::InvalidConfig("LICENSE_KEY missing".to_string()))?;
        let api_key = self.config.manager_api_key.as_deref().ok_or(
            SyncError::InvalidConfig("LICENSE_MANAGER_API_KEY missing".to_string()),
        )?;

        let url = format!(
            "{}/validate_bot",
            self.config.manager_api_url.trim_end_matches('/')
        );
        let body = json!({"license_key": license_key, "product": PRODUCT});
        let response = self
            .http
            .post_json(&url, Service::License, &Auth::Bearer(api_key.to_string()), body)
            .await?;
        response.json()
    }

    /// Decodes the manager's response: both `license_valid`/`valid` and
    /// `bot_assigned`/`bot_associated` spellings are accepted.
    fn apply_success(&mut self, body: Value) {
        let valid = body
            .get("license_valid")
            .or_else(|| body.get("valid"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let bot_assigned = body
            .get("bot_assigned")
            .or_else(|| body.get("bot_associated"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if valid && !bot_assigned {
            warn!("License is valid but no notification bot is assigned.");
        }

        self.state.valid = valid;
        self.state.bot_assigned = bot_assigned;
        self.state.details = Some(body);
        self.state.error = None;
        self.state.error_message = None;
        self.state.last_validated = now_epoch_secs();
        self.state.backoff_multiplier = 1;

        if let Ok(value) = serde_json::to_value(&self.state) {
            let _ = self
                .cache
                .put(STATUS_CACHE_KEY, value, Ttl::Millis(CacheKind::License.ttl_ms()));
        }
    }

    fn double_backoff(&mut self) {
        self.state.backoff_multiplier =
            (self.state.backoff_multiplier.saturating_mul(2)).min(MAX_BACKOFF_MULTIPLIER);
    }
}

fn error_tag(error: &SyncError) -> &'static str {
    match error {
        SyncError::Timeout | SyncError::ConnectTimeout => "timeout",
        SyncError::Unauthorized => "unauthorized",
        SyncError::Forbidden => "forbidden",
        SyncError::NotFound => "not_found",
        SyncError::InvalidJson(_) => "invalid_response",
        SyncError::InvalidConfig(_) => "missing_credentials",
        _ => "request_failed",
    }
}
