// src/utils/url.rs

//! URL safety policy for remote list sources.
//!
//! Every fetched URL, and every redirect hop, must pass the policy:
//! HTTPS only (unless explicitly relaxed), no blocked hosts, and no
//! loopback/private/link-local IP literals.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::models::FetcherConfig;

/// Which URLs the fetcher may contact.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    allow_http: bool,
    allow_private: bool,
    blocked_hosts: HashSet<String>,
}

impl UrlPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            allow_http: config.allow_http,
            allow_private: config.allow_private_addresses,
            blocked_hosts: config
                .blocked_hosts
                .iter()
                .map(|h| normalize_host(h))
                .collect(),
        }
    }

    /// Parse and check a URL string.
    pub fn check_str(&self, raw: &str) -> Result<Url, String> {
        let url = Url::parse(raw).map_err(|e| format!("invalid URL: {e}"))?;
        self.check(&url)?;
        Ok(url)
    }

    /// Check an already parsed URL.
    pub fn check(&self, url: &Url) -> Result<(), String> {
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            other => return Err(format!("scheme '{other}' is not allowed")),
        }

        let host = url.host().ok_or_else(|| "URL has no host".to_string())?;
        let host_str = normalize_host(&host.to_string());
        if self.blocked_hosts.contains(&host_str) {
            return Err(format!("host '{host_str}' is blocked"));
        }

        let ip = match host {
            Host::Ipv4(v4) => Some(IpAddr::V4(v4)),
            Host::Ipv6(v6) => Some(IpAddr::V6(v6)),
            Host::Domain(_) => None,
        };
        if let Some(ip) = ip {
            if !self.allow_private && is_private_ip(ip) {
                return Err(format!("private address '{ip}' is not allowed"));
            }
        }

        Ok(())
    }
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_lowercase()
}

/// Loopback, private, link-local or unspecified addresses.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(v4),
            None => is_private_v6(v6),
        },
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}
