//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a JSON `tracing` subscriber filtered by `service.log_level`
///
/// `RUST_LOG`-style directives are accepted; an unparsable level falls back
/// to `info`. Fails when a global subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(env_filter(&config.service.log_level))
        .try_init()
        .map_err(|e| crate::error::Error::Configuration(format!("tracing: {}", e)))?;

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Tracing initialized"
    );

    Ok(())
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_accepts_directives() {
        assert_eq!(env_filter("jsonapi_service=debug").to_string(), "jsonapi_service=debug");
    }

    #[test]
    fn test_init_tracing_twice_fails() {
        let config = Config::default();
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(first.is_err() || second.is_err());
    }
}
