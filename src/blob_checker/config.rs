use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::blob_checker::{BlobChecker, CachedBlobChecker, HttpProbe};
use crate::configuration;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "Config::default_positive_ttl")]
    pub positive_ttl: u64,
    #[serde(default = "Config::default_negative_ttl")]
    pub negative_ttl: u64,
    #[serde(default = "Config::default_capacity")]
    pub capacity: usize,
    #[serde(default = "Config::default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "Config::default_probe_backoff_ms")]
    pub probe_backoff_ms: u64,
    #[serde(default = "Config::default_probe_timeout")]
    pub probe_timeout: u64,
    #[serde(default)]
    pub server_ca_bundle: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            positive_ttl: Self::default_positive_ttl(),
            negative_ttl: Self::default_negative_ttl(),
            capacity: Self::default_capacity(),
            probe_attempts: Self::default_probe_attempts(),
            probe_backoff_ms: Self::default_probe_backoff_ms(),
            probe_timeout: Self::default_probe_timeout(),
            server_ca_bundle: None,
        }
    }
}

impl Config {
    fn default_positive_ttl() -> u64 {
        86_400
    }

    fn default_negative_ttl() -> u64 {
        60
    }

    fn default_capacity() -> usize {
        100_000
    }

    fn default_probe_attempts() -> u32 {
        5
    }

    fn default_probe_backoff_ms() -> u64 {
        1_000
    }

    fn default_probe_timeout() -> u64 {
        10
    }

    pub fn to_checker(&self) -> Result<Arc<dyn BlobChecker>, configuration::Error> {
        let probe = HttpProbe::new(
            self.server_ca_bundle.as_deref(),
            Duration::from_secs(self.probe_timeout),
        )?;

        Ok(Arc::new(CachedBlobChecker::new(self, Arc::new(probe))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.positive_ttl, 86_400);
        assert_eq!(config.negative_ttl, 60);
        assert_eq!(config.capacity, 100_000);
        assert_eq!(config.probe_attempts, 5);
        assert_eq!(config.probe_backoff_ms, 1_000);
        assert_eq!(config.probe_timeout, 10);
        assert_eq!(config.server_ca_bundle, None);
    }

    #[test]
    fn test_overrides() {
        let config: Config = toml::from_str(
            r#"
            negative_ttl = 5
            capacity = 10
            server_ca_bundle = "/etc/ssl/mirror-ca.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.negative_ttl, 5);
        assert_eq!(config.capacity, 10);
        assert_eq!(config.positive_ttl, 86_400);
        assert_eq!(
            config.server_ca_bundle.as_deref(),
            Some("/etc/ssl/mirror-ca.pem")
        );
    }

    #[tokio::test]
    async fn test_to_checker_with_platform_roots() {
        assert!(Config::default().to_checker().is_ok());
    }
}
