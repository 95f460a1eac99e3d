use std::sync::Arc;
use tokio::sync::broadcast;
use wanderer_sync::config::{AppEnv, LicenseConfig};
use wanderer_sync::core::cache::Cache;
use wanderer_sync::core::http::HttpClient;
use wanderer_sync::core::license::{LicenseState, LicenseValidator, NotificationKind};

fn dev_validator(config: LicenseConfig) -> (LicenseValidator, wanderer_sync::core::license::LicenseHandle) {
    let cache = Arc::new(Cache::new(1000));
    let http = Arc::new(HttpClient::new(cache.clone(), false).unwrap());
    LicenseValidator::new(config, AppEnv::Dev, http, cache)
}

#[tokio::test]
async fn test_dev_mode_shortcut_without_credentials() {
    // No license key and no manager token: dev mode answers synthetically,
    // without any HTTP call.
    let (validator, handle) = dev_validator(LicenseConfig {
        license_key: None,
        manager_api_key: None,
        ..Default::default()
    });
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(validator.run(shutdown_tx.subscribe()));

    let state = handle.validate(false).await;
    assert!(state.valid);
    assert!(state.bot_assigned);
    let details = state.details.unwrap();
    assert_eq!(details["license_valid"], serde_json::json!(true));
    assert_eq!(details["message"], serde_json::json!("Development mode"));
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_notification_counters_accumulate() {
    let (validator, handle) = dev_validator(LicenseConfig {
        license_key: None,
        manager_api_key: None,
        ..Default::default()
    });
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(validator.run(shutdown_tx.subscribe()));

    handle.increment_notification(NotificationKind::System).await;
    handle.increment_notification(NotificationKind::System).await;
    handle.increment_notification(NotificationKind::Killmail).await;

    let state = handle.state().await;
    assert_eq!(state.notification_counts.system, 2);
    assert_eq!(state.notification_counts.character, 0);
    assert_eq!(state.notification_counts.killmail, 1);
}

#[tokio::test]
async fn test_dead_actor_returns_safe_default() {
    let (validator, handle) = dev_validator(LicenseConfig::default());
    drop(validator); // The actor never runs.

    let state = handle.validate(true).await;
    assert_eq!(state, LicenseState::invalid_default());
    assert!(!state.valid);
    assert!(state.error.is_some());
}

#[test]
fn test_invalid_default_is_safe() {
    let state = LicenseState::invalid_default();
    assert!(!state.valid);
    assert!(!state.bot_assigned);
    assert_eq!(state.backoff_multiplier, 1);
}

#[test]
fn test_state_serialization_roundtrip() {
    let state = LicenseState::dev_default();
    let value = serde_json::to_value(&state).unwrap();
    let back: LicenseState = serde_json::from_value(value).unwrap();
    assert_eq!(back, state);
}
