//! Shared key-value store for all cross-request state.
//!
//! Cache entries, rate windows, tracked URLs and the cache dependency index
//! all live in one injected [`KvStore`]. Components never hold this state
//! in process memory themselves, so any number of handlers can share it.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: moka-backed, per-entry TTL. Used by tests and by
//!   embedders running a single long-lived process.
//! - [`FileStore`]: a JSON document on disk with atomic writes. Used by the
//!   CLI so state survives between invocations.
//!
//! Individual operations are atomic at the key level. Read-modify-write
//! sequences built on top (counters, lists) are last-write-wins.

mod file;
mod memory;

pub use file::{FileStore, default_store_path};
pub use memory::{MemoryStore, is_response_key};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::Result;

/// Minimal persistent key-value contract.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Read a live value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write (or overwrite) a value. `None` means no expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Physically remove expired entries. Returns how many were dropped.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Build a stable, process-independent key: `{prefix}_{sha256(parts)[..32]}`.
///
/// Parts are separated with a unit separator so `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn hashed_key(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{prefix}_{}", &digest[..32])
}
