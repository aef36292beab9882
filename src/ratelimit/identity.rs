//! Who is asking: rate-limit identities derived from request metadata.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::store::hashed_key;

/// Client address headers, most trusted first. `X-Forwarded-For` is read
/// up to its first comma.
pub const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Request metadata the crate needs from the host application.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Authenticated user, if any. `Some(0)` counts as anonymous.
    pub user_id: Option<u64>,
    /// Peer address as seen by the server.
    pub remote_addr: Option<String>,
    headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Add a header. Names are case-insensitive.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Rate-limit subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    User(u64),
    Ip(IpAddr),
    /// No usable address: a hash of the request metadata.
    Unknown(String),
}

impl Identity {
    /// Authenticated user, else the first valid client address, else a
    /// metadata fingerprint.
    ///
    /// With `trust_forwarded_headers` off only the peer address counts.
    pub fn from_request(ctx: &RequestContext, trust_forwarded_headers: bool) -> Self {
        if let Some(user_id) = ctx.user_id.filter(|id| *id != 0) {
            return Identity::User(user_id);
        }

        let forwarded = CLIENT_IP_HEADERS
            .iter()
            .filter(|_| trust_forwarded_headers)
            .filter_map(|name| ctx.header_value(name))
            .map(|value| value.split(',').next().unwrap_or_default());
        let candidates = forwarded.chain(ctx.remote_addr.as_deref());
        for candidate in candidates {
            if let Some(ip) = parse_client_ip(candidate) {
                return Identity::Ip(ip);
            }
        }

        let user_agent = ctx.header_value("user-agent").unwrap_or_default();
        let language = ctx.header_value("accept-language").unwrap_or_default();
        Identity::Unknown(hashed_key("unknown", &[user_agent, language]))
    }

    /// Stable text form used to derive store keys.
    pub fn key_material(&self) -> String {
        match self {
            Identity::User(id) => format!("user:{id}"),
            Identity::Ip(ip) => format!("ip:{ip}"),
            Identity::Unknown(fingerprint) => fingerprint.clone(),
        }
    }
}

fn parse_client_ip(candidate: &str) -> Option<IpAddr> {
    let candidate = candidate.trim();
    candidate
        .parse::<IpAddr>()
        .ok()
        .or_else(|| candidate.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
