//! Forwarded-header rewriting.
//!
//! # Responsibilities
//! - Add X-Real-IP, X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Rewrite Host to the externally visible name
//! - Strip hop-by-hop headers, passing Connection/Upgrade through for
//!   protocol-upgrade requests
//!
//! # Design Decisions
//! - Preserve original client IP in X-Forwarded-For
//! - Never trust existing X-Forwarded-* from untrusted sources
//! - Configurable trusted proxy list for header trust

use std::net::{IpAddr, SocketAddr};

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST, UPGRADE};

use crate::config::HeaderConfig;

pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Hop-by-hop headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-authenticate"),
    HeaderName::from_static("proxy-authorization"),
    HeaderName::from_static("te"),
    HeaderName::from_static("trailer"),
    HeaderName::from_static("proxy-connection"),
];

/// Header rewriting policy, built once from configuration.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    trusted_proxies: Vec<IpAddr>,
    external_host: Option<HeaderValue>,
    inbound_scheme: HeaderValue,
}

impl HeaderPolicy {
    /// Build the policy from configuration.
    ///
    /// Entries that fail to parse were already reported by validation and
    /// are skipped here.
    pub fn from_config(config: &HeaderConfig) -> Self {
        let trusted_proxies = config
            .trusted_proxies
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect();
        let external_host = config
            .external_host_name
            .as_deref()
            .and_then(|h| HeaderValue::from_str(h).ok());
        let inbound_scheme = HeaderValue::from_str(&config.inbound_scheme)
            .unwrap_or(HeaderValue::from_static("http"));
        Self {
            trusted_proxies,
            external_host,
            inbound_scheme,
        }
    }

    /// Whether the immediate peer may assert forwarded headers.
    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        self.trusted_proxies.contains(&peer)
    }

    /// Rewrite request headers in place for forwarding to a backend.
    pub fn rewrite(&self, headers: &mut HeaderMap, client: SocketAddr) {
        let trusted = self.is_trusted(client.ip());
        let client_ip = client.ip().to_string();
        let client_value = HeaderValue::from_str(&client_ip)
            .unwrap_or(HeaderValue::from_static("unknown"));

        // X-Forwarded-For: append to a trusted chain, overwrite a forged one.
        let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if trusted => {
                HeaderValue::from_str(&format!("{}, {}", prior, client_ip))
                    .unwrap_or_else(|_| client_value.clone())
            }
            _ => client_value.clone(),
        };
        headers.insert(X_FORWARDED_FOR, forwarded_for);

        // The immediate client socket address, always.
        headers.insert(X_REAL_IP, client_value);

        // The scheme the client used toward the proxy, not the upstream leg.
        headers.insert(X_FORWARDED_PROTO, self.inbound_scheme.clone());

        // Externally visible host toward the backend.
        let inbound_host = headers.get(HOST).cloned();
        let visible_host = self.external_host.clone().or(inbound_host);
        if let Some(host) = visible_host {
            headers.insert(X_FORWARDED_HOST, host.clone());
            headers.insert(HOST, host);
        }

        // Connection/Upgrade pass through unmodified for protocol
        // upgrades; everything else hop-by-hop is dropped.
        let upgrade = is_upgrade_request(headers);
        for name in &HOP_BY_HOP {
            headers.remove(name);
        }
        if !upgrade {
            headers.remove(UPGRADE);
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
    }
}

/// True when the request asks to switch protocols.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let wants_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    wants_upgrade && headers.contains_key(UPGRADE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(trusted: &[&str], external_host: Option<&str>, scheme: &str) -> HeaderPolicy {
        HeaderPolicy::from_config(&HeaderConfig {
            trusted_proxies: trusted.iter().map(|s| s.to_string()).collect(),
            external_host_name: external_host.map(String::from),
            inbound_scheme: scheme.to_string(),
        })
    }

    fn get<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
        headers.get(name).unwrap().to_str().unwrap()
    }

    #[test]
    fn test_fresh_client_over_https() {
        let policy = policy(&[], Some("www.example.com"), "https");
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("proxy.internal"));

        policy.rewrite(&mut headers, "203.0.113.7:52100".parse().unwrap());

        assert_eq!(get(&headers, &X_FORWARDED_FOR), "203.0.113.7");
        assert_eq!(get(&headers, &X_REAL_IP), "203.0.113.7");
        assert_eq!(get(&headers, &X_FORWARDED_PROTO), "https");
        assert_eq!(get(&headers, &X_FORWARDED_HOST), "www.example.com");
        assert_eq!(headers.get(HOST).unwrap(), "www.example.com");
    }

    #[test]
    fn test_trusted_peer_chain_appended() {
        let policy = policy(&["10.0.0.2"], None, "http");
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR.clone(), HeaderValue::from_static("198.51.100.9"));

        policy.rewrite(&mut headers, "10.0.0.2:40000".parse().unwrap());

        assert_eq!(get(&headers, &X_FORWARDED_FOR), "198.51.100.9, 10.0.0.2");
    }

    #[test]
    fn test_untrusted_peer_overwritten() {
        let policy = policy(&[], None, "http");
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR.clone(), HeaderValue::from_static("1.2.3.4"));
        headers.insert(X_REAL_IP.clone(), HeaderValue::from_static("1.2.3.4"));

        policy.rewrite(&mut headers, "203.0.113.50:1234".parse().unwrap());

        assert_eq!(get(&headers, &X_FORWARDED_FOR), "203.0.113.50");
        assert_eq!(get(&headers, &X_REAL_IP), "203.0.113.50");
    }

    #[test]
    fn test_host_preserved_without_external_name() {
        let policy = policy(&[], None, "http");
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("site.example"));

        policy.rewrite(&mut headers, "192.0.2.1:5000".parse().unwrap());

        assert_eq!(headers.get(HOST).unwrap(), "site.example");
        assert_eq!(get(&headers, &X_FORWARDED_HOST), "site.example");
    }

    #[test]
    fn test_plain_request_gets_keepalive() {
        let policy = policy(&[], None, "http");
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        headers.insert(HeaderName::from_static("te"), HeaderValue::from_static("trailers"));

        policy.rewrite(&mut headers, "192.0.2.1:5000".parse().unwrap());

        assert_eq!(headers.get(CONNECTION).unwrap(), "keep-alive");
        assert!(headers.get("te").is_none());
    }

    #[test]
    fn test_upgrade_passes_through() {
        let policy = policy(&[], None, "http");
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));

        assert!(is_upgrade_request(&headers));
        policy.rewrite(&mut headers, "192.0.2.1:5000".parse().unwrap());

        assert_eq!(headers.get(CONNECTION).unwrap(), "Upgrade");
        assert_eq!(headers.get(UPGRADE).unwrap(), "websocket");
    }
}
