//! Per-peer shared keys, cached so X25519 runs once per (handle, public key).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use pc_crypto::{CryptoError, IdentityProvider, PublicKeyBytes, SharedKey};
use tracing::debug;

struct CachedKey {
    peer_key: PublicKeyBytes,
    shared: Arc<SharedKey>,
}

#[derive(Default)]
pub struct SharedKeyCache {
    entries: RwLock<HashMap<String, CachedKey>>,
}

impl SharedKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared key for `handle`.  A different `peer_key` than the cached one
    /// replaces the entry.
    pub fn get_or_derive(
        &self,
        identity: &IdentityProvider,
        handle: &str,
        peer_key: &PublicKeyBytes,
    ) -> Result<Arc<SharedKey>, CryptoError> {
        if let Some(entry) = self.entries.read().get(handle) {
            if entry.peer_key == *peer_key {
                return Ok(Arc::clone(&entry.shared));
            }
        }

        let shared = Arc::new(identity.derive_shared_key(peer_key)?);
        let replaced = self.entries.write().insert(
            handle.to_string(),
            CachedKey {
                peer_key: *peer_key,
                shared: Arc::clone(&shared),
            },
        );
        if replaced.is_some_and(|old| old.peer_key != *peer_key) {
            debug!(peer = %handle, fingerprint = %peer_key.fingerprint(), "peer key changed");
        }
        Ok(shared)
    }

    pub fn invalidate(&self, handle: &str) -> bool {
        self.entries.write().remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SharedKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCache").field("cached", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_is_reused() {
        let me = IdentityProvider::new();
        let peer = IdentityProvider::new().ensure_identity();
        let cache = SharedKeyCache::new();
        let a = cache.get_or_derive(&me, "alice", &peer).unwrap();
        let b = cache.get_or_derive(&me, "alice", &peer).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rotated_peer_key_replaces_entry() {
        let me = IdentityProvider::new();
        let old = IdentityProvider::new().ensure_identity();
        let new = IdentityProvider::new().ensure_identity();
        let cache = SharedKeyCache::new();
        let a = cache.get_or_derive(&me, "alice", &old).unwrap();
        let b = cache.get_or_derive(&me, "alice", &new).unwrap();
        assert_ne!(*a, *b);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate("alice"));
        assert!(cache.is_empty());
    }

    #[test]
    fn bad_peer_key_is_not_cached() {
        let me = IdentityProvider::new();
        let zero = PublicKeyBytes([0u8; 32]);
        let cache = SharedKeyCache::new();
        assert!(cache.get_or_derive(&me, "mallory", &zero).is_err());
        assert!(cache.is_empty());
    }
}
