//! Endpoint resolution: turn user-supplied IP/hostname/URL text into a
//! concrete IPv4 socket address, the way `DeskServer::onStartClicked` in the
//! original program resolves its IP and Relay IP fields before connecting.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: SocketAddr,
}

impl Endpoint {
    /// Resolve `host` (a raw IPv4 address, a bare hostname, or a `host:port`
    /// string embedded in a URL-ish value) against `default_port`, preferring
    /// a direct IP parse and falling back to DNS resolution for the first
    /// IPv4 result, matching the original's "try address, then resolve,
    /// then filter to IPv4" order.
    pub fn resolve(host: &str, port: u16) -> Result<Self> {
        let host = strip_scheme(host.trim());
        if host.is_empty() {
            return Err(AgentError::InvalidEndpoint("empty host".to_string()));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self {
                addr: SocketAddr::new(ip, port),
            });
        }

        let lookup = format!("{host}:{port}");
        let mut addrs = lookup
            .to_socket_addrs()
            .map_err(|e| AgentError::InvalidEndpoint(format!("failed to resolve {host}: {e}")))?;

        addrs
            .find(|a| a.is_ipv4())
            .map(|addr| Self { addr })
            .ok_or_else(|| AgentError::InvalidEndpoint(format!("no IPv4 address for {host}")))
    }
}

/// Strip an optional `scheme://` prefix and any trailing path, leaving a bare
/// host (with optional `:port`, which we ignore since the port is supplied
/// separately by the caller's config).
fn strip_scheme(input: &str) -> &str {
    let without_scheme = input.split("://").nth(1).unwrap_or(input);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_raw_ipv4() {
        let ep = Endpoint::resolve("127.0.0.1", 21116).unwrap();
        assert_eq!(ep.addr, "127.0.0.1:21116".parse().unwrap());
    }

    #[test]
    fn strips_url_scheme_and_path() {
        assert_eq!(strip_scheme("http://127.0.0.1/foo"), "127.0.0.1");
        assert_eq!(strip_scheme("127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(Endpoint::resolve("", 21116).is_err());
    }
}
