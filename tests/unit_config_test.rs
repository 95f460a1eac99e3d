use wanderer_sync::config::{AppEnv, Config, LicenseConfig, parse_bool};
use wanderer_sync::core::map::MapRecord;

fn map(id: &str, is_main: bool) -> MapRecord {
    MapRecord {
        id: id.to_string(),
        url: format!("https://map.example.com/{id}"),
        public_api_key: "key".to_string(),
        color: None,
        title: None,
        is_main,
        main_system_eve_id: None,
    }
}

#[test]
fn test_parse_bool_accepted_spellings() {
    for truthy in ["true", "1", "yes", "on", "TRUE", "Yes", " on "] {
        assert!(parse_bool(truthy).unwrap(), "{truthy} should parse true");
    }
    for falsy in ["false", "0", "no", "off", "FALSE", "No", " off "] {
        assert!(!parse_bool(falsy).unwrap(), "{falsy} should parse false");
    }
    assert!(parse_bool("maybe").is_err());
    assert!(parse_bool("").is_err());
}

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 4000);
    assert_eq!(config.sse.connect_timeout_ms, 30_000);
    assert_eq!(config.sse.recv_timeout_ms, None);
    assert_eq!(config.sse.keepalive_interval_secs, 30);
    assert_eq!(config.license.refresh_interval_ms, 3_600_000);
    assert_eq!(config.license.manager_api_url, "https://lm.wanderer.ltd/api");
    assert!(config.notifications_enabled);
    assert!(!config.telemetry_logging_enabled);
    assert_eq!(config.map_refresh_interval_ms, 30 * 60 * 1000);
}

#[test]
fn test_prod_requires_license_credentials() {
    let mut config = Config {
        env: AppEnv::Prod,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    config.license = LicenseConfig {
        license_key: Some("lk".into()),
        manager_api_key: Some("mk".into()),
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_dev_and_test_skip_license_requirement() {
    for env in [AppEnv::Dev, AppEnv::Test] {
        let config = Config {
            env,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(env.is_dev_or_test());
    }
    assert!(!AppEnv::Prod.is_dev_or_test());
}

#[test]
fn test_exactly_one_main_map() {
    let base = Config {
        env: AppEnv::Dev,
        ..Default::default()
    };

    let none_main = Config {
        maps: vec![map("a", false), map("b", false)],
        ..base.clone()
    };
    assert!(none_main.validate().is_err());

    let two_main = Config {
        maps: vec![map("a", true), map("b", true)],
        ..base.clone()
    };
    assert!(two_main.validate().is_err());

    let one_main = Config {
        maps: vec![map("a", true), map("b", false)],
        ..base
    };
    assert!(one_main.validate().is_ok());
}

#[test]
fn test_malformed_map_url_rejected() {
    let mut bad = map("a", true);
    bad.url = "not a url".to_string();
    let config = Config {
        env: AppEnv::Dev,
        maps: vec![bad],
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_roster_is_valid() {
    let config = Config {
        env: AppEnv::Dev,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}
