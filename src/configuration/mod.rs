use std::fs;
use std::net::IpAddr;
use std::path::Path;

use hyper::Uri;
use serde::Deserialize;
use tracing::warn;

mod error;

use crate::geoip::{load_ranges, PrefixEntry, RegionTrie};
use crate::router::ClientAddressPolicy;
use crate::{blob_checker, mirror};
pub use error::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct Configuration {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub regions: RegionsConfig,
    #[serde(default)]
    pub mirror: mirror::Config,
    #[serde(default)]
    pub blob_cache: blob_checker::Config,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "ServerConfig::default_query_timeout_grace_period")]
    pub query_timeout_grace_period: u64,
    #[serde(default)]
    pub client_address: ClientAddressPolicy,
}

impl ServerConfig {
    fn default_port() -> u16 {
        8000
    }

    fn default_query_timeout() -> u64 {
        3600
    }

    fn default_query_timeout_grace_period() -> u64 {
        60
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    pub url: String,
    #[serde(default = "UpstreamConfig::default_repository_prefix")]
    pub repository_prefix: String,
    #[serde(default = "UpstreamConfig::default_info_url")]
    pub info_url: String,
}

impl UpstreamConfig {
    fn default_repository_prefix() -> String {
        "k8s-artifacts-prod".to_string()
    }

    fn default_info_url() -> String {
        "https://github.com/kubernetes/k8s.io/tree/main/registry.k8s.io".to_string()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RegionsConfig {
    #[serde(default)]
    pub ranges_file: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

impl RegionsConfig {
    pub fn to_region_trie(&self) -> Result<RegionTrie, Error> {
        let Some(ranges_file) = &self.ranges_file else {
            warn!("No ranges file configured");
            return Ok(RegionTrie::build(Vec::<PrefixEntry>::new())?);
        };

        let entries = load_ranges(ranges_file, &self.services)?;
        Ok(RegionTrie::build(entries)?)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MetricsConfig {
    pub bind_address: IpAddr,
    #[serde(default = "MetricsConfig::default_port")]
    pub port: u16,
}

impl MetricsConfig {
    fn default_port() -> u16 {
        9000
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TracingConfig {
    pub endpoint: String,
    pub sampling_rate: f64,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config_str = fs::read_to_string(path)?;
        Self::load_from_str(&config_str)
    }

    pub fn load_from_str(slice: &str) -> Result<Self, Error> {
        let config: Configuration = toml::from_str(slice).map_err(|e| {
            println!("Configuration file format error:");
            println!("{e}");
            Error::ConfigurationFileFormat(e.to_string())
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if !is_absolute_http_url(&self.upstream.url) {
            return Err(Error::InvalidValue(format!(
                "upstream.url must be an absolute http(s) URL, got '{}'",
                self.upstream.url
            )));
        }

        if !self.mirror.has_region_placeholder() {
            return Err(Error::InvalidValue(
                "mirror.url_template must contain '{region}'".to_string(),
            ));
        }

        if self.blob_cache.capacity == 0 {
            return Err(Error::InvalidValue(
                "blob_cache.capacity must be at least 1".to_string(),
            ));
        }

        if self.blob_cache.probe_attempts == 0 {
            return Err(Error::InvalidValue(
                "blob_cache.probe_attempts must be at least 1".to_string(),
            ));
        }

        if let Some(ObservabilityConfig {
            tracing: Some(tracing),
        }) = &self.observability
        {
            if !(0.0..=1.0).contains(&tracing.sampling_rate) {
                return Err(Error::InvalidValue(
                    "observability.tracing.sampling_rate must be between 0 and 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn is_absolute_http_url(url: &str) -> bool {
    url.parse::<Uri>().is_ok_and(|uri| {
        matches!(uri.scheme_str(), Some("http" | "https")) && uri.authority().is_some()
    })
}
