use std::collections::HashMap;
use std::net::IpAddr;

use tracing::{debug, info};

use crate::geoip::{Error, Prefix, PrefixEntry};

// Index 0 is always the root, so it doubles as the "no child" marker.
const NO_CHILD: usize = 0;

#[derive(Debug, Default)]
struct Node {
    children: [usize; 2],
    region: Option<usize>,
}

/// A binary trie over the bits of one address family.
#[derive(Debug)]
struct Tree {
    width: u32,
    nodes: Vec<Node>,
}

impl Tree {
    fn new(width: u32) -> Self {
        Self {
            width,
            nodes: vec![Node::default()],
        }
    }

    fn bit(&self, bits: u128, depth: u32) -> usize {
        usize::from((bits >> (self.width - 1 - depth)) & 1 == 1)
    }

    /// Returns the region previously stored for the exact same prefix, if any.
    fn insert(&mut self, bits: u128, len: u8, region: usize) -> Option<usize> {
        let mut index = 0;

        for depth in 0..u32::from(len) {
            let bit = self.bit(bits, depth);
            let child = self.nodes[index].children[bit];

            index = if child == NO_CHILD {
                self.nodes.push(Node::default());
                let created = self.nodes.len() - 1;
                self.nodes[index].children[bit] = created;
                created
            } else {
                child
            };
        }

        self.nodes[index].region.replace(region)
    }

    fn longest_match(&self, bits: u128) -> Option<usize> {
        let mut index = 0;
        let mut best = self.nodes[index].region;

        for depth in 0..self.width {
            let child = self.nodes[index].children[self.bit(bits, depth)];
            if child == NO_CHILD {
                break;
            }

            index = child;
            if let Some(region) = self.nodes[index].region {
                best = Some(region);
            }
        }

        best
    }
}

/// Longest-prefix-match index from client addresses to region labels.
///
/// Built once from a range list and never mutated afterwards, so it can be
/// shared behind an `Arc` and queried concurrently without locking.
#[derive(Debug)]
pub struct RegionTrie {
    v4: Tree,
    v6: Tree,
    regions: Vec<String>,
    prefix_count: usize,
}

impl RegionTrie {
    /// Builds the trie from raw range entries.
    ///
    /// Any malformed prefix fails the whole build: a partially loaded table
    /// would silently route some regional clients to the upstream. An empty
    /// input yields an empty trie that never matches.
    pub fn build<I>(entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = PrefixEntry>,
    {
        let mut trie = Self {
            v4: Tree::new(32),
            v6: Tree::new(128),
            regions: Vec::new(),
            prefix_count: 0,
        };
        let mut region_ids: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            let prefix = entry.prefix.parse::<Prefix>()?;

            let region = match region_ids.get(&entry.region) {
                Some(id) => *id,
                None => {
                    let id = trie.regions.len();
                    region_ids.insert(entry.region.clone(), id);
                    trie.regions.push(entry.region);
                    id
                }
            };

            let previous = match prefix.address() {
                IpAddr::V4(address) => {
                    trie.v4
                        .insert(u128::from(address.to_bits()), prefix.prefix_len(), region)
                }
                IpAddr::V6(address) => {
                    trie.v6
                        .insert(address.to_bits(), prefix.prefix_len(), region)
                }
            };

            match previous {
                None => trie.prefix_count += 1,
                Some(previous) if previous != region => {
                    debug!(
                        "Prefix {prefix} re-registered: '{}' replaces '{}'",
                        trie.regions[region], trie.regions[previous]
                    );
                }
                Some(_) => {}
            }
        }

        info!(
            "Region trie built: {} prefixes across {} regions",
            trie.prefix_count,
            trie.regions.len()
        );

        Ok(trie)
    }

    /// Resolves an address to the region of its most specific covering
    /// prefix. `None` means the address is outside every known range.
    ///
    /// IPv4-mapped IPv6 addresses are looked up in the IPv4 tree.
    pub fn resolve(&self, address: IpAddr) -> Option<&str> {
        let region = match address.to_canonical() {
            IpAddr::V4(address) => self.v4.longest_match(u128::from(address.to_bits())),
            IpAddr::V6(address) => self.v6.longest_match(address.to_bits()),
        };

        region.map(|id| self.regions[id].as_str())
    }

    pub fn prefix_count(&self) -> usize {
        self.prefix_count
    }

    pub fn is_empty(&self) -> bool {
        self.prefix_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn trie(entries: &[(&str, &str)]) -> RegionTrie {
        RegionTrie::build(
            entries
                .iter()
                .map(|(prefix, region)| PrefixEntry::new(*prefix, *region)),
        )
        .unwrap()
    }

    #[test]
    fn test_more_specific_prefix_wins() {
        let trie = trie(&[
            ("52.0.0.0/8", "us-east-1"),
            ("52.94.0.0/16", "us-west-2"),
            ("52.94.76.0/22", "eu-west-3"),
        ]);

        assert_eq!(trie.resolve(ip("52.94.76.1")), Some("eu-west-3"));
        assert_eq!(trie.resolve(ip("52.94.80.1")), Some("us-west-2"));
        assert_eq!(trie.resolve(ip("52.1.2.3")), Some("us-east-1"));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let trie = trie(&[
            ("52.94.76.0/22", "eu-west-3"),
            ("52.94.0.0/16", "us-west-2"),
            ("52.0.0.0/8", "us-east-1"),
        ]);

        assert_eq!(trie.resolve(ip("52.94.76.1")), Some("eu-west-3"));
        assert_eq!(trie.resolve(ip("52.94.80.1")), Some("us-west-2"));
    }

    #[test]
    fn test_unknown_address_is_not_found() {
        let trie = trie(&[("35.180.0.0/16", "eu-west-3")]);

        assert_eq!(trie.resolve(ip("35.250.1.1")), None);
        assert_eq!(trie.resolve(ip("127.0.0.1")), None);
        assert_eq!(trie.resolve(ip("2001:db8::1")), None);
    }

    #[test]
    fn test_empty_trie() {
        let trie = RegionTrie::build(Vec::new()).unwrap();

        assert!(trie.is_empty());
        assert_eq!(trie.resolve(ip("52.94.76.1")), None);
        assert_eq!(trie.resolve(ip("::1")), None);
    }

    #[test]
    fn test_default_route() {
        let trie = trie(&[("0.0.0.0/0", "everywhere"), ("10.0.0.0/8", "private")]);

        assert_eq!(trie.resolve(ip("8.8.8.8")), Some("everywhere"));
        assert_eq!(trie.resolve(ip("10.1.1.1")), Some("private"));
        assert_eq!(trie.resolve(ip("2001:db8::1")), None);
    }

    #[test]
    fn test_host_routes() {
        let trie = trie(&[
            ("52.93.127.172/31", "us-east-1"),
            ("52.93.127.173/32", "us-west-1"),
        ]);

        assert_eq!(trie.resolve(ip("52.93.127.172")), Some("us-east-1"));
        assert_eq!(trie.resolve(ip("52.93.127.173")), Some("us-west-1"));
        assert_eq!(trie.resolve(ip("52.93.127.174")), None);
    }

    #[test]
    fn test_ipv6() {
        let trie = trie(&[
            ("2600:1f00::/24", "us-east-1"),
            ("2600:1f18::/33", "us-east-2"),
            ("2400:6500:0:9::2/128", "ap-southeast-1"),
        ]);

        assert_eq!(trie.resolve(ip("2600:1f18::1")), Some("us-east-2"));
        assert_eq!(trie.resolve(ip("2600:1f01::1")), Some("us-east-1"));
        assert_eq!(trie.resolve(ip("2400:6500:0:9::2")), Some("ap-southeast-1"));
        assert_eq!(trie.resolve(ip("2400:6500:0:9::3")), None);
    }

    #[test]
    fn test_families_are_independent() {
        // ::/0 must not capture IPv4 clients, and vice versa.
        let trie = trie(&[("::/0", "v6-only")]);

        assert_eq!(trie.resolve(ip("1.2.3.4")), None);
        assert_eq!(trie.resolve(ip("2001:db8::1")), Some("v6-only"));
    }

    #[test]
    fn test_ipv4_mapped_address() {
        let trie = trie(&[("35.180.0.0/16", "eu-west-3")]);

        assert_eq!(trie.resolve(ip("::ffff:35.180.1.1")), Some("eu-west-3"));
    }

    #[test]
    fn test_host_bits_are_ignored() {
        let trie = trie(&[("10.1.2.3/8", "private")]);

        assert_eq!(trie.resolve(ip("10.200.0.1")), Some("private"));
    }

    #[test]
    fn test_duplicate_prefix_last_wins() {
        let trie = trie(&[("10.0.0.0/8", "first"), ("10.0.0.0/8", "second")]);

        assert_eq!(trie.resolve(ip("10.0.0.1")), Some("second"));
        assert_eq!(trie.prefix_count(), 1);
    }

    #[test]
    fn test_malformed_prefix_fails_build() {
        let result = RegionTrie::build(vec![
            PrefixEntry::new("10.0.0.0/8", "ok"),
            PrefixEntry::new("10.0.0.0/40", "broken"),
        ]);

        assert!(matches!(result, Err(Error::MalformedPrefix(p)) if p == "10.0.0.0/40"));
    }

    #[test]
    fn test_matches_naive_scan() {
        let prefixes = [
            "35.180.0.0/16",
            "52.94.76.0/22",
            "52.93.127.170/32",
            "52.93.127.172/31",
            "52.93.127.173/32",
            "52.93.127.174/32",
            "52.93.127.175/32",
            "52.93.127.176/32",
            "52.93.127.177/32",
            "52.93.127.178/32",
            "52.93.127.179/32",
            "2400:6500:0:9::2/128",
        ];
        let addresses = [
            "35.180.1.1",
            "35.250.1.1",
            "52.94.76.1",
            "52.94.77.1",
            "52.94.80.1",
            "52.93.127.172",
            "52.93.127.171",
            "2400:6500:0:9::2",
            "2400:6500:0:9::1",
        ];

        let trie = RegionTrie::build(prefixes.iter().map(|p| PrefixEntry::new(*p, *p))).unwrap();

        for address in addresses {
            let address = ip(address);
            let naive = prefixes
                .iter()
                .map(|p| p.parse::<Prefix>().unwrap())
                .filter(|p| p.contains(address))
                .max_by_key(Prefix::prefix_len)
                .map(|p| p.to_string());

            assert_eq!(
                trie.resolve(address).map(str::to_string),
                naive,
                "trie does not match naive scan for {address}"
            );
        }
    }
}
