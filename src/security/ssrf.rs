//! SSRF protection: block requests that reach internal infrastructure.
//!
//! A fetch tool is an open door into whatever network the server runs in.
//! Before any connection is made, the target host is checked by name, by
//! literal address, and by every address it resolves to. The HTTP client
//! resolves through [`SsrfGuard::resolve`] as well, so the addresses that
//! passed the check are the ones it connects to.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::{Host, Url};

/// Hostnames that always point at the local machine or a cloud metadata
/// service.
const DEFAULT_BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "metadata",
    "metadata.google.internal",
    "metadata.goog",
    "instance-data",
    "instance-data.ec2.internal",
];

/// SSRF guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrfConfig {
    /// Enable SSRF protection.
    pub enabled: bool,
    /// Resolve domain names and check every resulting address.
    pub resolve_dns: bool,
    /// Hosts exempt from the check (exact match, e.g. an internal API the
    /// operator explicitly trusts).
    pub allowed_hosts: Vec<String>,
    /// Hostnames refused without resolution.
    pub blocked_hostnames: Vec<String>,
}

impl Default for SsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolve_dns: true,
            allowed_hosts: Vec::new(),
            blocked_hostnames: DEFAULT_BLOCKED_HOSTNAMES
                .iter()
                .map(|h| (*h).to_string())
                .collect(),
        }
    }
}

/// Why a target was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SsrfViolation {
    /// URL has no host component
    #[error("URL has no host")]
    MissingHost,
    /// Host is on the blocked hostname list
    #[error("host '{0}' is a blocked internal hostname")]
    BlockedHostname(String),
    /// Host is a literal private/reserved address
    #[error("URL targets private/reserved IP address {0}")]
    PrivateAddress(IpAddr),
    /// Host resolves to a private/reserved address
    #[error("host '{host}' resolves to private/reserved IP address {addr}")]
    ResolvesToPrivate {
        /// Hostname as given
        host: String,
        /// Offending address
        addr: IpAddr,
    },
    /// Host could not be resolved at all
    #[error("failed to resolve host '{host}': {reason}")]
    Unresolvable {
        /// Hostname as given
        host: String,
        /// Resolver error
        reason: String,
    },
}

impl SsrfViolation {
    /// Whether this is a blocked target (as opposed to a lookup failure).
    #[must_use]
    pub fn is_block(&self) -> bool {
        !matches!(self, Self::Unresolvable { .. })
    }
}

/// Check whether an IP address is a private/loopback/link-local address
/// that should be blocked for outbound requests.
#[must_use]
pub fn is_private_or_reserved(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

/// Check if an IPv4 address is private, loopback, link-local or otherwise
/// not a public unicast destination.
fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback()          // 127.0.0.0/8
    || addr.is_private()        // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
    || addr.is_link_local()     // 169.254.0.0/16 (incl. 169.254.169.254)
    || addr.is_broadcast()      // 255.255.255.255
    || addr.is_unspecified()    // 0.0.0.0
    || addr.is_multicast()      // 224.0.0.0/4
    || is_this_network(addr)    // 0.0.0.0/8
    || is_shared_address(addr)  // 100.64.0.0/10 (CGN)
    || is_ietf_protocol(addr)   // 192.0.0.0/24
    || is_documentation(addr)   // 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
    || is_benchmarking(addr)    // 198.18.0.0/15
    || is_reserved(addr)        // 240.0.0.0/4
}

fn is_this_network(addr: Ipv4Addr) -> bool {
    addr.octets()[0] == 0
}

/// Check 100.64.0.0/10 (Carrier-Grade NAT / shared address space).
fn is_shared_address(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

fn is_ietf_protocol(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 192 && octets[1] == 0 && octets[2] == 0
}

/// Check documentation ranges (TEST-NET-1/2/3).
fn is_documentation(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
    || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
    || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
}

fn is_benchmarking(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 198 && (octets[1] & 0xFE) == 18
}

fn is_reserved(addr: Ipv4Addr) -> bool {
    addr.octets()[0] >= 240
}

/// Check if an IPv6 address is private, loopback, link-local, multicast, or
/// embeds an IPv4 address that is.
#[allow(clippy::cast_possible_truncation)] // Extracting u8 octets from u16 IPv6 segments is intentional
fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() || addr.is_multicast() {
        return true;
    }

    let segments = addr.segments();

    // Link-local (fe80::/10)
    if segments[0] & 0xFFC0 == 0xFE80 {
        return true;
    }

    // Site-local, deprecated but still routable on old networks (fec0::/10)
    if segments[0] & 0xFFC0 == 0xFEC0 {
        return true;
    }

    // Unique Local Address (fc00::/7)
    if segments[0] & 0xFE00 == 0xFC00 {
        return true;
    }

    // IPv4-mapped IPv6 (`::ffff:x.x.x.x`) -- the classic filter bypass
    if let Some(ipv4) = addr.to_ipv4_mapped() {
        return is_private_ipv4(ipv4);
    }

    // IPv4-compatible IPv6 (deprecated but still parseable: `::x.x.x.x`)
    if segments[..6].iter().all(|s| *s == 0) {
        return is_private_ipv4(embedded_ipv4(segments[6], segments[7]));
    }

    // NAT64 well-known prefix (64:ff9b::/96)
    if segments[0] == 0x0064 && segments[1] == 0xFF9B && segments[2..6].iter().all(|s| *s == 0) {
        return is_private_ipv4(embedded_ipv4(segments[6], segments[7]));
    }

    // 6to4 (2002::/16) embeds an IPv4 address in segments 1-2
    if segments[0] == 0x2002 {
        return is_private_ipv4(embedded_ipv4(segments[1], segments[2]));
    }

    // Teredo (2001:0000::/32): client IPv4 is XOR-obfuscated in segments 6-7
    if segments[0] == 0x2001 && segments[1] == 0x0000 {
        return is_private_ipv4(embedded_ipv4(!segments[6], !segments[7]));
    }

    false
}

#[allow(clippy::cast_possible_truncation)] // Extracting u8 octets from u16 IPv6 segments is intentional
fn embedded_ipv4(hi: u16, lo: u16) -> Ipv4Addr {
    Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
}

/// Compiled SSRF guard. Cheap to clone; shared with the redirect policy.
#[derive(Debug, Clone)]
pub struct SsrfGuard {
    inner: Arc<GuardState>,
}

#[derive(Debug)]
struct GuardState {
    enabled: bool,
    resolve_dns: bool,
    allowed_hosts: HashSet<String>,
    blocked_hostnames: HashSet<String>,
}

impl SsrfGuard {
    /// Compile a guard from configuration.
    #[must_use]
    pub fn from_config(config: &SsrfConfig) -> Self {
        let normalize = |h: &String| h.trim().trim_end_matches('.').to_ascii_lowercase();
        Self {
            inner: Arc::new(GuardState {
                enabled: config.enabled,
                resolve_dns: config.resolve_dns,
                allowed_hosts: config.allowed_hosts.iter().map(normalize).collect(),
                blocked_hostnames: config.blocked_hostnames.iter().map(normalize).collect(),
            }),
        }
    }

    /// Whether the guard is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Check the URL's host without touching the network.
    ///
    /// Covers blocked hostnames and literal IP hosts, including the
    /// decimal/octal/hex IPv4 spellings the URL parser normalizes
    /// (`http://2130706433/` is `127.0.0.1`).
    pub fn check_literal(&self, url: &Url) -> Result<(), SsrfViolation> {
        if !self.inner.enabled {
            return Ok(());
        }

        let host = url.host().ok_or(SsrfViolation::MissingHost)?;
        if self.is_allowed(&host) {
            return Ok(());
        }

        match host {
            Host::Ipv4(addr) => check_addr(IpAddr::V4(addr)),
            Host::Ipv6(addr) => check_addr(IpAddr::V6(addr)),
            Host::Domain(domain) => {
                let name = domain.trim_end_matches('.').to_ascii_lowercase();
                if self.inner.blocked_hostnames.contains(&name) || name.ends_with(".localhost") {
                    return Err(SsrfViolation::BlockedHostname(name));
                }
                Ok(())
            }
        }
    }

    /// Whether connections should resolve through [`SsrfGuard::resolve`].
    #[must_use]
    pub fn resolves_dns(&self) -> bool {
        self.inner.enabled && self.inner.resolve_dns
    }

    /// Full check: literal host, then every address the host resolves to.
    ///
    /// Any single private address fails the check, so a name that resolves
    /// to both a public and a private address is refused.
    pub async fn check(&self, url: &Url) -> Result<(), SsrfViolation> {
        self.check_literal(url)?;

        if !self.resolves_dns() {
            return Ok(());
        }
        let Some(Host::Domain(domain)) = url.host() else {
            return Ok(());
        };

        let port = url.port_or_known_default().unwrap_or(80);
        self.resolve(domain, port).await.map(|_| ())
    }

    /// Resolve `host` and return its addresses only if none of them is
    /// private or reserved. Allow-listed hosts resolve unchecked.
    ///
    /// The HTTP client dials exactly the addresses returned here.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, SsrfViolation> {
        let name = host.trim_end_matches('.').to_ascii_lowercase();
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| SsrfViolation::Unresolvable {
                host: name.clone(),
                reason: e.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(SsrfViolation::Unresolvable {
                host: name,
                reason: "no addresses returned".to_string(),
            });
        }
        if !self.inner.enabled || self.is_allowed(&Host::Domain(&name)) {
            return Ok(addrs);
        }
        if self.inner.blocked_hostnames.contains(&name) || name.ends_with(".localhost") {
            return Err(SsrfViolation::BlockedHostname(name));
        }

        if let Some(private) = addrs.iter().find(|a| is_private_or_reserved(a.ip())) {
            return Err(SsrfViolation::ResolvesToPrivate {
                host: name,
                addr: private.ip(),
            });
        }

        debug!(host = %name, addresses = addrs.len(), "SSRF check passed");
        Ok(addrs)
    }

    fn is_allowed(&self, host: &Host<&str>) -> bool {
        if self.inner.allowed_hosts.is_empty() {
            return false;
        }
        let key = match host {
            Host::Domain(d) => d.trim_end_matches('.').to_ascii_lowercase(),
            Host::Ipv4(a) => a.to_string(),
            Host::Ipv6(a) => a.to_string(),
        };
        self.inner.allowed_hosts.contains(&key)
    }
}

fn check_addr(addr: IpAddr) -> Result<(), SsrfViolation> {
    if is_private_or_reserved(addr) {
        Err(SsrfViolation::PrivateAddress(addr))
    } else {
        Ok(())
    }
}
