//! Client address resolution behind a chain of proxies.
//!
//! `X-Forwarded-For` is read right to left: the nearest hop is appended last,
//! so the first address that is not one of our own proxies is the client as
//! seen by infrastructure we trust. Anything further left is client-supplied
//! and may be spoofed.
//!
//! If every hop is trusted, or there is no forwarded-for chain, `X-Real-IP`
//! is used, and failing that the sentinel [`UNKNOWN_CLIENT`].
//!
//! When no hop in the chain is trusted the rightmost entry is still returned.
//! This is lenient (the header could have been sent directly by a client),
//! but it is deliberate and kept as-is.

use std::collections::HashSet;
use std::net::IpAddr;

use axum::http::HeaderMap;
use tracing::{debug, trace};

use crate::error::{GatehouseError, Result};

/// Returned when no usable address can be found.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Addresses of proxies allowed to report a client address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    addrs: HashSet<IpAddr>,
}

impl TrustedProxies {
    /// Parse a list of IP literals.
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addrs = HashSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let addr = entry.parse::<IpAddr>().map_err(|_| {
                GatehouseError::Config(format!(
                    "proxy.trusted_proxies: '{}' is not an IP address",
                    entry
                ))
            })?;
            addrs.insert(addr);
        }
        Ok(Self { addrs })
    }

    /// Only the IPv4 and IPv6 loopback addresses.
    pub fn loopback() -> Self {
        Self {
            addrs: ["127.0.0.1", "::1"]
                .iter()
                .filter_map(|addr| addr.parse().ok())
                .collect(),
        }
    }

    /// Whether `addr` belongs to a trusted proxy.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.addrs.contains(addr)
    }

    /// Number of trusted addresses.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether no proxy is trusted.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Resolves the real client address of a request.
#[derive(Debug, Clone)]
pub struct ClientIpResolver {
    trusted: TrustedProxies,
}

impl ClientIpResolver {
    /// Create a resolver trusting `trusted`.
    pub fn new(trusted: TrustedProxies) -> Self {
        Self { trusted }
    }

    /// The configured proxy set.
    pub fn trusted(&self) -> &TrustedProxies {
        &self.trusted
    }

    /// Resolve from raw header values. Never fails.
    ///
    /// The walk stops at the first non-empty hop that is not a trusted proxy.
    /// If that hop is not an IP literal (`ip:port`, bracketed IPv6, a name),
    /// the chain is abandoned rather than read further left.
    pub fn resolve(&self, forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
        if let Some(chain) = forwarded_for {
            let hop = chain
                .rsplit(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .find(|token| !self.is_trusted(token));

            match hop.map(|token| (token, token.parse::<IpAddr>())) {
                Some((_, Ok(addr))) => {
                    trace!(client_ip = %addr, "Resolved client from forwarded-for chain");
                    return addr.to_string();
                }
                Some((token, Err(_))) => {
                    debug!(hop = token, "Untrusted forwarded-for hop is not an IP literal");
                }
                None => {}
            }
        }

        real_ip
            .map(str::trim)
            .and_then(|value| value.parse::<IpAddr>().ok())
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    /// Resolve from a request's headers.
    ///
    /// Repeated `X-Forwarded-For` headers are joined in order, as if sent as
    /// one comma-separated list. Values that are not valid UTF-8 are ignored.
    pub fn resolve_headers(&self, headers: &HeaderMap) -> String {
        let forwarded: Vec<&str> = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        let forwarded = (!forwarded.is_empty()).then(|| forwarded.join(","));

        let real_ip = headers.get(X_REAL_IP).and_then(|value| value.to_str().ok());

        self.resolve(forwarded.as_deref(), real_ip)
    }

    fn is_trusted(&self, token: &str) -> bool {
        token
            .parse::<IpAddr>()
            .map_or(false, |addr| self.trusted.contains(&addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver(trusted: &[&str]) -> ClientIpResolver {
        ClientIpResolver::new(TrustedProxies::parse(trusted).unwrap())
    }

    #[test]
    fn test_skips_trusted_nearest_hop() {
        let resolver = resolver(&["127.0.0.1"]);
        assert_eq!(resolver.resolve(Some("1.2.3.4, 127.0.0.1"), None), "1.2.3.4");
    }

    #[test]
    fn test_untrusted_chain_returns_rightmost() {
        let resolver = resolver(&["127.0.0.1"]);
        assert_eq!(resolver.resolve(Some("1.2.3.4, 5.6.7.8"), None), "5.6.7.8");
    }

    #[test]
    fn test_spoofed_prefix_is_ignored() {
        let resolver = resolver(&["10.0.0.1", "10.0.0.2"]);
        let chain = "6.6.6.6, 203.0.113.7, 10.0.0.1, 10.0.0.2";
        assert_eq!(resolver.resolve(Some(chain), None), "203.0.113.7");
    }

    #[test]
    fn test_all_trusted_falls_back_to_real_ip() {
        let resolver = resolver(&["127.0.0.1", "::1"]);
        assert_eq!(
            resolver.resolve(Some("127.0.0.1, ::1"), Some("198.51.100.4")),
            "198.51.100.4"
        );
    }

    #[test]
    fn test_no_headers_is_unknown() {
        let resolver = resolver(&["127.0.0.1"]);
        assert_eq!(resolver.resolve(None, None), UNKNOWN_CLIENT);
        assert_eq!(resolver.resolve(Some(""), None), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_malformed_chain_degrades_gracefully() {
        let resolver = resolver(&["127.0.0.1"]);
        assert_eq!(resolver.resolve(Some(" , ,garbage, "), None), UNKNOWN_CLIENT);
        assert_eq!(resolver.resolve(Some("1.2.3.4,,not-an-ip"), None), UNKNOWN_CLIENT);
        assert_eq!(resolver.resolve(Some("1.2.3.4,, 127.0.0.1"), None), "1.2.3.4");
        assert_eq!(resolver.resolve(None, Some("nonsense")), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_unparseable_hop_stops_the_walk() {
        let resolver = resolver(&["127.0.0.1", "::1"]);
        let chain = "6.6.6.6, 203.0.113.5:4711, 127.0.0.1";

        assert_eq!(resolver.resolve(Some(chain), None), UNKNOWN_CLIENT);
        assert_eq!(
            resolver.resolve(Some(chain), Some("198.51.100.4")),
            "198.51.100.4"
        );
        assert_eq!(
            resolver.resolve(Some("6.6.6.6, [2001:db8::7], ::1"), None),
            UNKNOWN_CLIENT
        );
    }

    #[test]
    fn test_ipv6_literals_compare_by_value() {
        let resolver = resolver(&["::1"]);
        assert_eq!(
            resolver.resolve(Some("2001:db8::1, 0:0:0:0:0:0:0:1"), None),
            "2001:db8::1"
        );
    }

    #[test]
    fn test_resolve_headers_joins_repeated_values() {
        let resolver = resolver(&["127.0.0.1"]);
        let mut headers = HeaderMap::new();
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("1.2.3.4"));
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("127.0.0.1"));

        assert_eq!(resolver.resolve_headers(&headers), "1.2.3.4");
    }

    #[test]
    fn test_resolve_headers_uses_real_ip() {
        let resolver = resolver(&["127.0.0.1"]);
        let mut headers = HeaderMap::new();
        headers.insert(X_REAL_IP, HeaderValue::from_static("192.0.2.10"));

        assert_eq!(resolver.resolve_headers(&headers), "192.0.2.10");
    }

    #[test]
    fn test_trusted_proxies_parse() {
        let trusted = TrustedProxies::parse(["127.0.0.1", " ::1 ", ""]).unwrap();
        assert_eq!(trusted.len(), 2);
        assert!(trusted.contains(&"::1".parse().unwrap()));

        assert!(TrustedProxies::parse(["localhost"]).is_err());
        assert_eq!(TrustedProxies::loopback().len(), 2);
    }
}
