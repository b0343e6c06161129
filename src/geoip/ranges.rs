use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::geoip::{Error, PrefixEntry};

// Published IP range document, e.g. https://ip-ranges.amazonaws.com/ip-ranges.json
// syncToken, createDate and network_border_group are ignored.
#[derive(Debug, Deserialize)]
struct RangeDocument {
    #[serde(default)]
    prefixes: Vec<Ipv4Range>,
    #[serde(default)]
    ipv6_prefixes: Vec<Ipv6Range>,
}

#[derive(Debug, Deserialize)]
struct Ipv4Range {
    ip_prefix: String,
    region: String,
    #[serde(default)]
    service: String,
}

#[derive(Debug, Deserialize)]
struct Ipv6Range {
    ipv6_prefix: String,
    region: String,
    #[serde(default)]
    service: String,
}

/// Parses a published range document into prefix entries.
///
/// When `services` is not empty, only ranges tagged with one of them are kept.
pub fn parse_ranges(document: &str, services: &[String]) -> Result<Vec<PrefixEntry>, Error> {
    let document: RangeDocument = serde_json::from_str(document)?;
    let keep = |service: &str| services.is_empty() || services.iter().any(|s| s == service);

    let v4 = document
        .prefixes
        .into_iter()
        .filter(|range| keep(&range.service))
        .map(|range| PrefixEntry::new(range.ip_prefix, range.region));

    let v6 = document
        .ipv6_prefixes
        .into_iter()
        .filter(|range| keep(&range.service))
        .map(|range| PrefixEntry::new(range.ipv6_prefix, range.region));

    Ok(v4.chain(v6).collect())
}

pub fn load_ranges<P: AsRef<Path>>(
    path: P,
    services: &[String],
) -> Result<Vec<PrefixEntry>, Error> {
    let path = path.as_ref();
    let document = fs::read_to_string(path)?;
    let entries = parse_ranges(&document, services)?;

    info!("Loaded {} IP ranges from {}", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOCUMENT: &str = r#"{
        "syncToken": "1700000000",
        "createDate": "2023-11-14-00-00-00",
        "prefixes": [
            {
                "ip_prefix": "35.180.0.0/16",
                "region": "eu-west-3",
                "service": "AMAZON",
                "network_border_group": "eu-west-3"
            },
            {
                "ip_prefix": "52.94.76.0/22",
                "region": "us-west-2",
                "service": "EC2",
                "network_border_group": "us-west-2"
            }
        ],
        "ipv6_prefixes": [
            {
                "ipv6_prefix": "2400:6500:0:9::2/128",
                "region": "ap-southeast-1",
                "service": "AMAZON",
                "network_border_group": "ap-southeast-1"
            }
        ]
    }"#;

    #[test]
    fn test_parse_all_services() {
        let entries = parse_ranges(DOCUMENT, &[]).unwrap();

        assert_eq!(
            entries,
            vec![
                PrefixEntry::new("35.180.0.0/16", "eu-west-3"),
                PrefixEntry::new("52.94.76.0/22", "us-west-2"),
                PrefixEntry::new("2400:6500:0:9::2/128", "ap-southeast-1"),
            ]
        );
    }

    #[test]
    fn test_parse_service_filter() {
        let entries = parse_ranges(DOCUMENT, &["EC2".to_string()]).unwrap();

        assert_eq!(entries, vec![PrefixEntry::new("52.94.76.0/22", "us-west-2")]);
    }

    #[test]
    fn test_parse_empty_document() {
        let entries = parse_ranges("{}", &[]).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_invalid_document() {
        let result = parse_ranges(r#"{"prefixes": [{"region": "x"}]}"#, &[]);
        assert!(matches!(result, Err(Error::RangeDocument(_))));

        let result = parse_ranges("not json", &[]);
        assert!(matches!(result, Err(Error::RangeDocument(_))));
    }

    #[test]
    fn test_load_ranges_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();

        let entries = load_ranges(file.path(), &[]).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_load_ranges_missing_file() {
        let result = load_ranges("/nonexistent/ip-ranges.json", &[]);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
