//! Outbound target policy: which hosts, addresses and ports a fetch may
//! reach.
//!
//! The policy is enforced three times: on the literal URL before any
//! request, inside the HTTP client's DNS resolver (so a hostname that
//! resolves to a private address is refused at connection time, whatever
//! it resolved to earlier), and on every redirect hop.

use std::error::Error as StdError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use url::{Host, Url};

use crate::{CardError, Result};

/// Ports allowed by default.
pub const DEFAULT_ALLOWED_PORTS: [u16; 3] = [80, 443, 8080];

/// Redirect hops followed before giving up.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// A refused outbound target. Travels through reqwest's error chain so the
/// fetch layer can tell policy refusals from ordinary connect failures.
#[derive(Debug, Clone, thiserror::Error)]
#[error("blocked address {target}: {reason}")]
pub struct BlockedAddress {
    pub target: String,
    pub reason: &'static str,
}

impl BlockedAddress {
    fn new(target: impl Into<String>, reason: &'static str) -> Self {
        Self {
            target: target.into(),
            reason,
        }
    }
}

impl From<BlockedAddress> for CardError {
    fn from(blocked: BlockedAddress) -> Self {
        CardError::BlockedTarget(blocked.to_string())
    }
}

/// Outbound target policy.
///
/// ```rust
/// # use cardcrafter::TargetPolicy;
/// let policy = TargetPolicy::default();
/// assert!(!policy.allow_private_networks);
/// assert_eq!(policy.max_redirects, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPolicy {
    /// Permit loopback/private/link-local targets. Off in production.
    pub allow_private_networks: bool,
    /// Allowed destination ports; `None` allows any.
    pub allowed_ports: Option<Vec<u16>>,
    pub max_redirects: usize,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self {
            allow_private_networks: false,
            allowed_ports: Some(DEFAULT_ALLOWED_PORTS.to_vec()),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl TargetPolicy {
    /// Any address, any port. For local development and tests.
    pub fn permissive() -> Self {
        Self {
            allow_private_networks: true,
            allowed_ports: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.allow_private_networks = allow;
        self
    }

    pub fn allowed_ports(mut self, ports: Option<Vec<u16>>) -> Self {
        self.allowed_ports = ports;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn check_ip(&self, ip: IpAddr) -> std::result::Result<(), BlockedAddress> {
        if self.allow_private_networks {
            return Ok(());
        }
        match blocked_reason(ip) {
            Some(reason) => Err(BlockedAddress::new(ip.to_string(), reason)),
            None => Ok(()),
        }
    }

    /// Port and literal-host checks. Hostnames are checked again at
    /// resolution time.
    pub fn check_url(&self, url: &Url) -> std::result::Result<(), BlockedAddress> {
        let port = url.port_or_known_default().unwrap_or(0);
        if let Some(ports) = &self.allowed_ports
            && !ports.contains(&port)
        {
            return Err(BlockedAddress::new(url.as_str(), "port not allowed"));
        }
        match url.host() {
            Some(Host::Ipv4(ip)) => self.check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if !self.allow_private_networks
                    && (domain == "localhost" || domain.ends_with(".localhost"))
                {
                    Err(BlockedAddress::new(domain, "loopback host"))
                } else {
                    Ok(())
                }
            }
            None => Err(BlockedAddress::new(url.as_str(), "missing host")),
        }
    }
}

/// Parse and shape-check a fetch URL: absolute, http(s), with a host and
/// without embedded credentials.
pub fn validate_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CardError::InvalidUrl("empty URL".into()));
    }
    let url = Url::parse(raw).map_err(|e| CardError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CardError::InvalidUrl(format!(
            "{raw}: unsupported scheme {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(CardError::InvalidUrl(format!("{raw}: missing host")));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(CardError::InvalidUrl(format!("{raw}: credentials in URL")));
    }
    Ok(url)
}

/// Why `ip` is not a public unicast address, if it isn't.
pub fn blocked_reason(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => blocked_v4(v4),
        IpAddr::V6(v6) => blocked_v6(v6),
    }
}

pub fn is_blocked_ip(ip: IpAddr) -> bool {
    blocked_reason(ip).is_some()
}

fn blocked_v4(ip: Ipv4Addr) -> Option<&'static str> {
    let [a, b, ..] = ip.octets();
    if ip.is_loopback() {
        Some("loopback")
    } else if ip.is_private() {
        Some("private network")
    } else if ip.is_link_local() {
        Some("link-local")
    } else if ip.is_unspecified() || a == 0 {
        Some("unspecified")
    } else if ip.is_broadcast() || ip.is_multicast() {
        Some("broadcast/multicast")
    } else if ip.is_documentation() {
        Some("documentation range")
    } else if a == 100 && (b & 0xc0) == 64 {
        Some("carrier-grade NAT")
    } else if a == 198 && (b & 0xfe) == 18 {
        Some("benchmarking range")
    } else if a >= 240 {
        Some("reserved")
    } else {
        None
    }
}

fn blocked_v6(ip: Ipv6Addr) -> Option<&'static str> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return blocked_v4(v4);
    }
    let seg = ip.segments();
    if ip.is_loopback() {
        Some("loopback")
    } else if ip.is_unspecified() {
        Some("unspecified")
    } else if ip.is_multicast() {
        Some("multicast")
    } else if (seg[0] & 0xfe00) == 0xfc00 {
        Some("unique local")
    } else if (seg[0] & 0xffc0) == 0xfe80 {
        Some("link-local")
    } else if seg[0] == 0x2001 && seg[1] == 0x0db8 {
        Some("documentation range")
    } else if seg[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        // NAT64: judge the embedded IPv4 address.
        let [.., hi, lo] = seg;
        blocked_v4(Ipv4Addr::from((u32::from(hi) << 16) | u32::from(lo)))
    } else {
        None
    }
}

/// DNS resolver that refuses to hand out blocked addresses.
///
/// A name resolving to any blocked address is refused entirely.
#[derive(Debug, Clone)]
pub struct GuardedResolver {
    policy: TargetPolicy,
}

impl GuardedResolver {
    pub fn new(policy: TargetPolicy) -> Self {
        Self { policy }
    }
}

type BoxError = Box<dyn StdError + Send + Sync>;

async fn resolve_checked(policy: TargetPolicy, host: String) -> std::result::Result<Addrs, BoxError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();
    if addrs.is_empty() {
        return Err(format!("no addresses found for {host}").into());
    }
    for addr in &addrs {
        if let Err(blocked) = policy.check_ip(addr.ip()) {
            return Err(Box::new(BlockedAddress::new(host, blocked.reason)));
        }
    }
    Ok(Box::new(addrs.into_iter()))
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_checked(
            self.policy.clone(),
            name.as_str().to_string(),
        ))
    }
}

/// Redirect policy that applies `policy` to every hop.
pub fn redirect_policy(policy: TargetPolicy) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= policy.max_redirects {
            attempt.error(format!("too many redirects (max {})", policy.max_redirects))
        } else if let Err(blocked) = policy.check_url(attempt.url()) {
            attempt.error(blocked)
        } else {
            attempt.follow()
        }
    })
}

/// HTTP client with the guarded resolver and redirect policy installed.
pub fn guarded_client(policy: &TargetPolicy, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .dns_resolver(Arc::new(GuardedResolver::new(policy.clone())))
        .redirect(redirect_policy(policy.clone()))
        .build()
        .map_err(|e| CardError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Whether a policy refusal caused `err`.
pub(crate) fn blocked_cause(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(blocked) = e.downcast_ref::<BlockedAddress>() {
            return Some(blocked.to_string());
        }
        current = e.source();
    }
    // Some layers flatten their cause into a string.
    let text = error_chain_text(err);
    text.contains("blocked address").then_some(text)
}

/// All messages in an error chain joined with ": ".
pub(crate) fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        parts.push(e.to_string());
        current = e.source();
    }
    parts.join(": ")
}
