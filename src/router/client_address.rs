use std::fmt;
use std::net::{IpAddr, SocketAddr};

use hyper::header::HeaderName;
use hyper::HeaderMap;
use serde::Deserialize;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[derive(Debug, PartialEq)]
pub enum Error {
    MissingPeer,
    MalformedHeader(String),
    NotEnoughHops { entries: usize, trusted_hops: usize },
    InvalidAddress(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingPeer => write!(f, "unable to determine client address"),
            Error::MalformedHeader(err) => write!(f, "malformed X-Forwarded-For header: {err}"),
            Error::NotEnoughHops {
                entries,
                trusted_hops,
            } => write!(
                f,
                "X-Forwarded-For has {entries} entries, expected more than {trusted_hops}"
            ),
            Error::InvalidAddress(address) => {
                write!(f, "invalid client address in X-Forwarded-For: '{address}'")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Where the client address of a request is taken from.
///
/// ```toml
/// [server]
/// client_address = { mode = "forwarded_for", trusted_hops = 1 }
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClientAddressPolicy {
    #[default]
    Peer,
    ForwardedFor {
        #[serde(default = "ClientAddressPolicy::default_trusted_hops")]
        trusted_hops: usize,
    },
}

impl ClientAddressPolicy {
    fn default_trusted_hops() -> usize {
        1
    }

    pub fn client_address(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<IpAddr, Error> {
        let peer_address = || {
            peer.map(|peer| peer.ip().to_canonical())
                .ok_or(Error::MissingPeer)
        };

        let ClientAddressPolicy::ForwardedFor { trusted_hops } = self else {
            return peer_address();
        };

        let mut values = headers.get_all(&X_FORWARDED_FOR).iter().peekable();
        if values.peek().is_none() {
            return peer_address();
        }

        let mut entries = Vec::new();
        for value in values {
            let value = value
                .to_str()
                .map_err(|error| Error::MalformedHeader(error.to_string()))?;
            entries.extend(value.split(',').map(str::trim));
        }

        if entries.len() <= *trusted_hops {
            return Err(Error::NotEnoughHops {
                entries: entries.len(),
                trusted_hops: *trusted_hops,
            });
        }

        let entry = entries[entries.len() - 1 - trusted_hops];
        parse_entry(entry)
            .map(|address| address.to_canonical())
            .ok_or_else(|| Error::InvalidAddress(entry.to_string()))
    }
}

// Proxies may append the source port.
fn parse_entry(entry: &str) -> Option<IpAddr> {
    entry
        .parse::<IpAddr>()
        .ok()
        .or_else(|| entry.parse::<SocketAddr>().ok().map(|address| address.ip()))
}
