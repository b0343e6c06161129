use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::geoip::Error;

/// A raw `(prefix, region)` pair as supplied by a range list.
///
/// The prefix is kept in its textual form; it is only parsed when the
/// [`RegionTrie`](crate::geoip::RegionTrie) is built, so that a malformed
/// table is rejected as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixEntry {
    pub prefix: String,
    pub region: String,
}

impl PrefixEntry {
    pub fn new(prefix: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            region: region.into(),
        }
    }
}

/// A parsed CIDR prefix. Host bits past `len` are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prefix {
    address: IpAddr,
    len: u8,
}

impl Prefix {
    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    #[cfg(test)]
    pub fn contains(&self, address: IpAddr) -> bool {
        match (self.address, address.to_canonical()) {
            (IpAddr::V4(network), IpAddr::V4(address)) => matches_bits(
                u128::from(network.to_bits()),
                u128::from(address.to_bits()),
                32,
                self.len,
            ),
            (IpAddr::V6(network), IpAddr::V6(address)) => {
                matches_bits(network.to_bits(), address.to_bits(), 128, self.len)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
fn matches_bits(network: u128, address: u128, width: u32, len: u8) -> bool {
    let len = u32::from(len);
    if len == 0 {
        return true;
    }
    let shift = width - len;
    network >> shift == address >> shift
}

fn max_len(address: IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Error::MalformedPrefix(s.to_string());

        let (address, len) = s.split_once('/').ok_or_else(malformed)?;
        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let address = address.parse::<IpAddr>().map_err(|_| malformed())?;
        let len = len.parse::<u8>().map_err(|_| malformed())?;
        if len > max_len(address) {
            return Err(malformed());
        }

        Ok(Self { address, len })
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_prefix() {
        let prefix: Prefix = "52.94.76.0/22".parse().unwrap();
        assert_eq!(prefix.address(), "52.94.76.0".parse::<IpAddr>().unwrap());
        assert_eq!(prefix.prefix_len(), 22);
        assert_eq!(prefix.to_string(), "52.94.76.0/22");
    }

    #[test]
    fn test_parse_ipv6_prefix() {
        let prefix: Prefix = "2400:6500:0:9::2/128".parse().unwrap();
        assert_eq!(prefix.prefix_len(), 128);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "52.94.76.0",
            "52.94.76.0/",
            "52.94.76.0/33",
            "52.94.76/22",
            "52.94.76.0/+2",
            "2400:6500::/129",
            "not-an-ip/8",
            "",
        ] {
            assert!(
                matches!(raw.parse::<Prefix>(), Err(Error::MalformedPrefix(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_contains() {
        let prefix: Prefix = "35.180.0.0/16".parse().unwrap();
        assert!(prefix.contains("35.180.1.1".parse().unwrap()));
        assert!(!prefix.contains("35.250.1.1".parse().unwrap()));
        assert!(prefix.contains("::ffff:35.180.1.1".parse().unwrap()));
        assert!(!prefix.contains("2400:6500:0:9::2".parse().unwrap()));

        let any: Prefix = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains("8.8.8.8".parse().unwrap()));
    }
}
