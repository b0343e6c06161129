use std::collections::HashMap;

use serde::Deserialize;

const REGION_PLACEHOLDER: &str = "{region}";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "Config::default_url_template")]
    pub url_template: String,
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default)]
    pub known_regions: Vec<String>,
    #[serde(default)]
    pub region_aliases: HashMap<String, String>,
}

impl Config {
    fn default_url_template() -> String {
        "https://prod-registry-k8s-io-{region}.s3.dualstack.{region}.amazonaws.com".to_string()
    }

    pub fn has_region_placeholder(&self) -> bool {
        self.url_template.contains(REGION_PLACEHOLDER)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url_template: Self::default_url_template(),
            default_region: None,
            known_regions: Vec::new(),
            region_aliases: HashMap::new(),
        }
    }
}

/// Maps a client region to the base URL of the mirror that should serve it.
#[derive(Clone, Debug)]
pub struct MirrorResolver {
    url_template: String,
    default_region: Option<String>,
    known_regions: Vec<String>,
    region_aliases: HashMap<String, String>,
}

impl MirrorResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            url_template: config.url_template.trim_end_matches('/').to_string(),
            default_region: config.default_region.clone(),
            known_regions: config.known_regions.clone(),
            region_aliases: config.region_aliases.clone(),
        }
    }

    /// Returns the mirror base URL for `region`, or `None` when no mirror
    /// is configured to serve it.
    pub fn mirror_for(&self, region: &str) -> Option<String> {
        let mirror_region = if let Some(alias) = self.region_aliases.get(region) {
            alias.as_str()
        } else if self.known_regions.is_empty() || self.known_regions.iter().any(|r| r == region) {
            region
        } else {
            self.default_region.as_deref()?
        };

        Some(self.url_template.replace(REGION_PLACEHOLDER, mirror_region))
    }
}

/// Location of a blob inside a mirror, following the GCS layout used by the
/// upstream registry buckets.
pub fn blob_url(mirror: &str, digest_hex: &str) -> String {
    format!("{mirror}/containers/images/sha256%3A{digest_hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://mirror-{region}.example.com";

    fn resolver(
        known: &[&str],
        default_region: Option<&str>,
        aliases: &[(&str, &str)],
    ) -> MirrorResolver {
        MirrorResolver::new(&Config {
            url_template: TEMPLATE.to_string(),
            default_region: default_region.map(str::to_string),
            known_regions: known.iter().map(|r| (*r).to_string()).collect(),
            region_aliases: aliases
                .iter()
                .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                .collect(),
        })
    }

    #[test]
    fn test_every_region_has_a_mirror_by_default() {
        let resolver = resolver(&[], None, &[]);

        assert_eq!(
            resolver.mirror_for("eu-west-3"),
            Some("https://mirror-eu-west-3.example.com".to_string())
        );
    }

    #[test]
    fn test_alias_takes_precedence() {
        let resolver = resolver(&["ap-southeast-1"], None, &[("ap-east-1", "ap-southeast-1")]);

        assert_eq!(
            resolver.mirror_for("ap-east-1"),
            Some("https://mirror-ap-southeast-1.example.com".to_string())
        );
    }

    #[test]
    fn test_unknown_region_uses_default() {
        let resolver = resolver(&["us-east-2", "eu-west-1"], Some("us-east-2"), &[]);

        assert_eq!(
            resolver.mirror_for("eu-west-1"),
            Some("https://mirror-eu-west-1.example.com".to_string())
        );
        assert_eq!(
            resolver.mirror_for("sa-east-1"),
            Some("https://mirror-us-east-2.example.com".to_string())
        );
    }

    #[test]
    fn test_unknown_region_without_default_has_no_mirror() {
        let resolver = resolver(&["us-east-2"], None, &[]);

        assert_eq!(resolver.mirror_for("sa-east-1"), None);
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let resolver = MirrorResolver::new(&Config {
            url_template: "https://bucket.example.com/".to_string(),
            ..Config::default()
        });

        assert_eq!(
            resolver.mirror_for("us-east-1"),
            Some("https://bucket.example.com".to_string())
        );
    }

    #[test]
    fn test_default_template() {
        let config = Config::default();
        assert!(config.has_region_placeholder());

        let resolver = MirrorResolver::new(&config);
        assert_eq!(
            resolver.mirror_for("us-west-2"),
            Some(
                "https://prod-registry-k8s-io-us-west-2.s3.dualstack.us-west-2.amazonaws.com"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_blob_url_percent_encodes_separator() {
        let digest = "a".repeat(64);

        assert_eq!(
            blob_url("https://mirror.example.com", &digest),
            format!("https://mirror.example.com/containers/images/sha256%3A{digest}")
        );
    }
}
