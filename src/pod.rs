//! Identity of the pod the fetcher runs in.

use std::net::Ipv4Addr;

use nix::ifaddrs::getifaddrs;
use nix::unistd::gethostname;
use tracing::{debug, warn};

/// Pod IPv4 address and hostname, used to fill certificate SANs and CNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodIdentity {
    /// `None` when no override is set and no non-loopback IPv4 interface exists
    pub ip: Option<Ipv4Addr>,
    pub hostname: String,
}

impl PodIdentity {
    pub fn new(ip: Option<Ipv4Addr>, hostname: impl Into<String>) -> Self {
        Self { ip, hostname: hostname.into() }
    }

    /// Use the overrides when given, otherwise ask the operating system.
    pub fn discover(ip: Option<Ipv4Addr>, hostname: Option<String>) -> Self {
        let ip = ip.or_else(first_non_loopback_ipv4);
        let hostname = hostname.filter(|h| !h.is_empty()).unwrap_or_else(system_hostname);

        debug!(pod_ip = ?ip, pod_hostname = %hostname, "Pod identity");
        Self { ip, hostname }
    }
}

fn first_non_loopback_ipv4() -> Option<Ipv4Addr> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!(error = %e, "Failed to list network interfaces");
            return None;
        }
    };

    addrs
        .filter_map(|ifaddr| ifaddr.address)
        .filter_map(|address| address.as_sockaddr_in().map(|sin| Ipv4Addr::from(sin.ip())))
        .find(|ip| !ip.is_loopback())
}

fn system_hostname() -> String {
    match gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "Failed to read hostname");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        let pod = PodIdentity::discover(Some(Ipv4Addr::new(10, 1, 2, 3)), Some("web-0".to_string()));
        assert_eq!(pod, PodIdentity::new(Some(Ipv4Addr::new(10, 1, 2, 3)), "web-0"));
    }

    #[test]
    fn test_discovered_address_is_not_loopback() {
        let pod = PodIdentity::discover(None, None);
        if let Some(ip) = pod.ip {
            assert!(!ip.is_loopback());
        }
    }
}
