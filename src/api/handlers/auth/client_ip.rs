//! Client address resolution behind optional reverse proxies.
//!
//! Security boundaries: proxy headers are attacker controlled unless the TCP
//! peer is a known proxy. `resolve_client_ip` is the only function that reads
//! them and it does so only after `TrustedProxies::contains` accepts the peer.

use anyhow::{Context, Result};
use axum::http::HeaderMap;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Single-value headers, most specific first.
const SINGLE_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "true-client-ip", "x-real-ip"];
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pub const DEFAULT_TRUSTED_PROXIES: &str = "127.0.0.0/8,::1/128";

/// Networks whose members may speak for the real client.
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies(Vec<IpNetwork>);

impl TrustedProxies {
    #[must_use]
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self(networks)
    }

    /// Parse a comma separated list of CIDR networks or bare addresses.
    ///
    /// # Errors
    /// Returns an error naming the first entry that does not parse.
    pub fn parse(list: &str) -> Result<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse::<IpNetwork>()
                    .with_context(|| format!("invalid trusted proxy network: {entry}"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.0.iter().any(|network| network.contains(ip))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolved client address for a single request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp {
    peer: IpAddr,
    ip: IpAddr,
    trusted: bool,
}

impl ClientIp {
    /// TCP peer address; the only value fit for rate-limit keys.
    #[must_use]
    pub fn peer(&self) -> IpAddr {
        self.peer
    }

    /// Best guess at the real client, for audit logs.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Whether the peer was a trusted proxy and headers were consulted.
    #[must_use]
    pub fn trusted(&self) -> bool {
        self.trusted
    }
}

#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, peer: IpAddr, trusted: &TrustedProxies) -> ClientIp {
    let peer = peer.to_canonical();
    if !trusted.contains(peer) {
        return ClientIp {
            peer,
            ip: peer,
            trusted: false,
        };
    }

    let ip = forwarded_ip(headers).unwrap_or(peer);
    ClientIp {
        peer,
        ip,
        trusted: true,
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    };

    SINGLE_IP_HEADERS
        .iter()
        .find_map(|name| header_ip(name))
        .or_else(|| {
            headers
                .get(FORWARDED_FOR_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .and_then(|value| value.trim().parse::<IpAddr>().ok())
        })
}
