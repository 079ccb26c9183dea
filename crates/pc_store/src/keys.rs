//! Local at-rest keys, one per conversation.
//!
//!   key = SHA-256("pc-local-store-v1|" || own_handle || "|" || sanitized_peer)[..16]
//!
//! Deterministic so history stays readable across restarts; never sent
//! anywhere.  Derived keys are cached by sanitized peer handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use pc_crypto::aead::KEY_LEN;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

const STORE_KEY_CONTEXT: &[u8] = b"pc-local-store-v1|";

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StorageKey([u8; KEY_LEN]);

impl StorageKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StorageKey(<redacted>)")
    }
}

pub fn derive_storage_key(own_handle: &str, sanitized_peer: &str) -> StorageKey {
    let mut hasher = Sha256::new();
    hasher.update(STORE_KEY_CONTEXT);
    hasher.update(own_handle.as_bytes());
    hasher.update(b"|");
    hasher.update(sanitized_peer.as_bytes());
    let mut digest = hasher.finalize();

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    digest.as_mut_slice().zeroize();
    StorageKey(key)
}

/// Thread-safe cache of derived storage keys.
pub struct KeyCache {
    own_handle: String,
    keys: RwLock<HashMap<String, Arc<StorageKey>>>,
}

impl KeyCache {
    pub fn new(own_handle: &str) -> Self {
        Self {
            own_handle: own_handle.to_string(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn own_handle(&self) -> &str {
        &self.own_handle
    }

    pub fn get(&self, sanitized_peer: &str) -> Arc<StorageKey> {
        if let Some(key) = self.keys.read().get(sanitized_peer) {
            return Arc::clone(key);
        }
        let mut keys = self.keys.write();
        Arc::clone(
            keys.entry(sanitized_peer.to_string())
                .or_insert_with(|| Arc::new(derive_storage_key(&self.own_handle, sanitized_peer))),
        )
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCache")
            .field("own_handle", &self.own_handle)
            .field("cached", &self.len())
            .finish()
    }
}
