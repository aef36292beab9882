//! Anti-forgery tokens for the proxy and preview endpoints.

use std::time::Duration;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Action bound into proxy-fetch tokens.
pub const PROXY_ACTION: &str = "cardcrafter_proxy_nonce";

/// Action bound into posts-preview tokens.
pub const PREVIEW_ACTION: &str = "cardcrafter_preview_nonce";

/// Issues and checks per-action request tokens.
pub trait AntiForgery: Send + Sync {
    /// Token for `action`, valid for a limited time.
    fn issue(&self, action: &str) -> String;

    /// Whether `token` was issued for `action` and is still valid.
    fn verify(&self, token: &str, action: &str) -> bool;
}

/// Time-bucketed tokens derived from a server secret.
///
/// A token is `sha256(secret, action, tick)` truncated to 32 hex chars,
/// where a tick is half the lifetime; tokens from the current and the
/// previous tick verify. Comparison is constant-time.
pub struct SharedSecret {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("secret", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl SharedSecret {
    pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(24 * 3600);

    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            lifetime: Self::DEFAULT_LIFETIME,
        }
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime.max(Duration::from_secs(2));
        self
    }

    fn tick(&self) -> i64 {
        let half = i64::try_from(self.lifetime.as_secs() / 2).unwrap_or(i64::MAX).max(1);
        chrono::Utc::now().timestamp().div_euclid(half)
    }

    fn token_for(&self, action: &str, tick: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update([0x1f]);
        hasher.update(action.as_bytes());
        hasher.update([0x1f]);
        hasher.update(tick.to_be_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

impl AntiForgery for SharedSecret {
    fn issue(&self, action: &str) -> String {
        self.token_for(action, self.tick())
    }

    fn verify(&self, token: &str, action: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let tick = self.tick();
        [tick, tick - 1].iter().fold(false, |ok, t| {
            let expected = self.token_for(action, *t);
            ok | bool::from(expected.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_for_its_action_only() {
        let guard = SharedSecret::new("s3cret");
        let token = guard.issue(PROXY_ACTION);
        assert_eq!(token.len(), 32);
        assert!(guard.verify(&token, PROXY_ACTION));
        assert!(!guard.verify(&token, PREVIEW_ACTION));
    }

    #[test]
    fn other_secret_or_garbage_rejected() {
        let token = SharedSecret::new("a").issue(PROXY_ACTION);
        assert!(!SharedSecret::new("b").verify(&token, PROXY_ACTION));
        assert!(!SharedSecret::new("a").verify("", PROXY_ACTION));
        assert!(!SharedSecret::new("a").verify("deadbeef", PROXY_ACTION));
    }

    #[test]
    fn previous_tick_still_valid() {
        let guard = SharedSecret::new("k");
        let previous = guard.token_for(PROXY_ACTION, guard.tick() - 1);
        let stale = guard.token_for(PROXY_ACTION, guard.tick() - 2);
        assert!(guard.verify(&previous, PROXY_ACTION));
        assert!(!guard.verify(&stale, PROXY_ACTION));
    }

    #[test]
    fn debug_redacts_secret() {
        let text = format!("{:?}", SharedSecret::new("hunter2"));
        assert!(!text.contains("hunter2"));
    }
}
