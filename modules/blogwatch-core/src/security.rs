//! SSRF guard applied before any adapter fetch or browser render.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::CoreError;

/// Validates URLs before they're handed to a resilient-fetch or
/// browser-rendering call, blocking:
/// - loopback/localhost
/// - RFC1918 private ranges
/// - link-local / cloud metadata ranges
/// - non-HTTP(S) schemes
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: vec![
                "10.0.0.0/8".parse().unwrap(),
                "172.16.0.0/12".parse().unwrap(),
                "192.168.0.0/16".parse().unwrap(),
                "169.254.0.0/16".parse().unwrap(),
                "127.0.0.0/8".parse().unwrap(),
                "::1/128".parse().unwrap(),
                "fc00::/7".parse().unwrap(),
                "fe80::/10".parse().unwrap(),
            ],
            allowed_hosts: HashSet::new(),
        }
    }

    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    pub fn block_cidr(mut self, cidr: ipnet::IpNet) -> Self {
        self.blocked_cidrs.push(cidr);
        self
    }

    pub fn validate(&self, url: &str) -> Result<(), CoreError> {
        let parsed = url::Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(CoreError::Config(format!(
                "disallowed scheme: {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::Config("URL has no host".into()))?;

        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        if self.blocked_hosts.contains(host) {
            return Err(CoreError::Config(format!("blocked host: {host}")));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            for cidr in &self.blocked_cidrs {
                if cidr.contains(&ip) {
                    return Err(CoreError::Config(format!("blocked CIDR match: {ip}")));
                }
            }
        }

        Ok(())
    }

    /// Resolve DNS and re-check the resolved IPs, catching DNS-rebinding attacks
    /// where a hostname resolves to an internal address at fetch time.
    pub async fn validate_with_dns(&self, url: &str) -> Result<(), CoreError> {
        self.validate(url)?;

        let parsed = url::Url::parse(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::Config("URL has no host".into()))?;

        if self.allowed_hosts.contains(host) || host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let port = parsed.port().unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });

        let addrs = tokio::net::lookup_host(format!("{host}:{port}"))
            .await
            .map_err(|e| CoreError::Network(format!("DNS resolution failed: {e}")))?;

        for addr in addrs {
            let ip = addr.ip();
            for cidr in &self.blocked_cidrs {
                if cidr.contains(&ip) {
                    return Err(CoreError::Config(format!(
                        "DNS for {host} resolved to blocked IP {ip}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_localhost() {
        let v = UrlValidator::new();
        assert!(v.validate("http://localhost/").is_err());
        assert!(v.validate("http://127.0.0.1/").is_err());
        assert!(v.validate("http://[::1]/").is_err());
    }

    #[test]
    fn blocks_private_ips() {
        let v = UrlValidator::new();
        assert!(v.validate("http://10.0.0.1/").is_err());
        assert!(v.validate("http://172.16.0.1/").is_err());
        assert!(v.validate("http://192.168.1.1/").is_err());
    }

    #[test]
    fn blocks_metadata_services() {
        let v = UrlValidator::new();
        assert!(v.validate("http://169.254.169.254/").is_err());
        assert!(v.validate("http://metadata.google.internal/").is_err());
    }

    #[test]
    fn blocks_non_http() {
        let v = UrlValidator::new();
        assert!(v.validate("file:///etc/passwd").is_err());
        assert!(v.validate("ftp://example.com/").is_err());
    }

    #[test]
    fn allows_public_urls() {
        let v = UrlValidator::new();
        assert!(v.validate("https://example.com/").is_ok());
        assert!(v.validate("http://example.org/").is_ok());
    }

    #[test]
    fn allowed_hosts_bypass() {
        let v = UrlValidator::new().allow_host("localhost");
        assert!(v.validate("http://localhost/").is_ok());
    }
}
