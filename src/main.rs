// src/main.rs

//! The main entry point for the wanderer-sync service.

use anyhow::Result;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use wanderer_sync::config::Config;
use wanderer_sync::server;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("wanderer-sync version {VERSION}");
        return Ok(());
    }

    // The map roster file can be provided via --roster; environment
    // variables drive everything else.
    let roster_path = args
        .iter()
        .position(|arg| arg == "--roster")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match Config::load(roster_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(config).await {
        error!("Service runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
