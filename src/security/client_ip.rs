//! Client address derivation.
//!
//! `X-Forwarded-For` is attacker controlled unless a trusted proxy sits in
//! front, so it is only read when `trust_proxy` is set.

use axum::http::HeaderMap;
use std::net::IpAddr;

pub const UNKNOWN_IP: &str = "unknown";

/// Client address as resolved by the guard middleware, stored in the
/// request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Derive the client identifier for a request.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return normalize(ip);
        }
    }

    match peer {
        Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Some(ip) => ip.to_string(),
        None => UNKNOWN_IP.to_string(),
    }
}

fn normalize(ip: &str) -> String {
    ip.strip_prefix("::ffff:").unwrap_or(ip).to_string()
}

/// Shorten an address for logs: last IPv4 octet or trailing IPv6 groups
/// are masked.
pub fn truncate_ip(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let o = v4.octets();
            format!("{}.{}.{}.x", o[0], o[1], o[2])
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}:{:x}::x", s[0], s[1], s[2], s[3])
        }
        Err(_) => UNKNOWN_IP.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_forwarded_ignored_without_trust() {
        let peer = Some("10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&forwarded("203.0.113.9"), peer, false), "10.0.0.1");
    }

    #[test]
    fn test_forwarded_first_hop_with_trust() {
        let peer = Some("10.0.0.1".parse().unwrap());
        let headers = forwarded("203.0.113.9, 10.0.0.2");
        assert_eq!(client_ip(&headers, peer, true), "203.0.113.9");
    }

    #[test]
    fn test_mapped_ipv6_peer() {
        let peer = Some("::ffff:192.0.2.7".parse().unwrap());
        assert_eq!(client_ip(&HeaderMap::new(), peer, false), "192.0.2.7");
        assert_eq!(client_ip(&HeaderMap::new(), None, false), UNKNOWN_IP);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_ip("192.168.10.42"), "192.168.10.x");
        assert_eq!(truncate_ip("2001:db8:1:2:3:4:5:6"), "2001:db8:1:2::x");
        assert_eq!(truncate_ip("garbage"), "unknown");
    }
}
