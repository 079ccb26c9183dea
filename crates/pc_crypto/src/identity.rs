//! Local identity and peer key agreement
//!
//! Each process owns exactly one X25519 `LocalIdentity`, generated on first
//! use and kept for the process lifetime.  Only the public half ever leaves
//! this module.
//!
//! Peer shared key
//! ---------------
//!   shared  = X25519(local_secret, peer_public)
//!   key     = SHA-256("pc-peer-key-v1" || 0x00 || shared)[..16]
//!
//! Both sides compute the same 16-byte AES-128-GCM key.  An agreement that
//! is not contributory (peer sent a small-order point) is rejected.

use std::fmt;
use std::sync::OnceLock;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{aead::KEY_LEN, error::CryptoError};

const SHARED_KEY_CONTEXT: &[u8] = b"pc-peer-key-v1\x00";

// ── Public key ────────────────────────────────────────────────────────────────

/// 32-byte X25519 public key, base64url-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::KeyAgreement(format!(
                "public key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| CryptoError::KeyAgreement(format!("public key encoding: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// BLAKE3 of the key truncated to 20 bytes, hex in groups of 4.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_b64())
    }
}

// ── Shared key ────────────────────────────────────────────────────────────────

/// Symmetric key agreed with one peer.  Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SharedKey([u8; KEY_LEN]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

// ── Local identity ────────────────────────────────────────────────────────────

struct LocalIdentity {
    secret: StaticSecret,
    public: PublicKeyBytes,
}

impl LocalIdentity {
    fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Self { secret, public }
    }
}

/// Owner of the process identity.  Construct once and share by reference.
#[derive(Default)]
pub struct IdentityProvider {
    identity: OnceLock<LocalIdentity>,
}

impl IdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn identity(&self) -> &LocalIdentity {
        self.identity.get_or_init(LocalIdentity::generate)
    }

    /// Generate the keypair on first call; always return the public key.
    pub fn ensure_identity(&self) -> PublicKeyBytes {
        self.identity().public
    }

    pub fn public_key_b64(&self) -> String {
        self.ensure_identity().to_b64()
    }

    pub fn derive_shared_key(&self, peer: &PublicKeyBytes) -> Result<SharedKey, CryptoError> {
        let peer_pub = X25519Public::from(peer.0);
        let shared = self.identity().secret.diffie_hellman(&peer_pub);
        if !shared.was_contributory() {
            return Err(CryptoError::KeyAgreement(
                "peer public key is a low-order point".into(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(SHARED_KEY_CONTEXT);
        hasher.update(shared.as_bytes());
        let mut digest = hasher.finalize();

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);
        digest.as_mut_slice().zeroize();
        Ok(SharedKey(key))
    }

    /// Same as [`derive_shared_key`](Self::derive_shared_key) for a base64url key.
    pub fn derive_shared_key_b64(&self, peer_b64: &str) -> Result<SharedKey, CryptoError> {
        self.derive_shared_key(&PublicKeyBytes::from_b64(peer_b64)?)
    }
}

impl fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityProvider")
            .field("public", &self.identity.get().map(|id| id.public))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn both_sides_agree_on_shared_key() {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new();
        let k_ab = alice.derive_shared_key(&bob.ensure_identity()).unwrap();
        let k_ba = bob.derive_shared_key(&alice.ensure_identity()).unwrap();
        assert_eq!(k_ab, k_ba);
    }

    #[test]
    fn derivation_is_deterministic() {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new().ensure_identity();
        let k1 = alice.derive_shared_key(&bob).unwrap();
        let k2 = alice.derive_shared_key(&bob).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn different_peers_give_different_keys() {
        let alice = IdentityProvider::new();
        let bob = IdentityProvider::new().ensure_identity();
        let carol = IdentityProvider::new().ensure_identity();
        assert_ne!(
            alice.derive_shared_key(&bob).unwrap(),
            alice.derive_shared_key(&carol).unwrap()
        );
    }

    #[test]
    fn ensure_identity_is_stable_across_threads() {
        let provider = Arc::new(IdentityProvider::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&provider);
                thread::spawn(move || p.ensure_identity())
            })
            .collect();
        let keys: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(keys[0], provider.ensure_identity());
    }

    #[test]
    fn rejects_wrong_length_key() {
        let short = URL_SAFE_NO_PAD.encode([1u8; 31]);
        assert!(matches!(
            PublicKeyBytes::from_b64(&short),
            Err(CryptoError::KeyAgreement(_))
        ));
    }

    #[test]
    fn rejects_garbage_encoding() {
        assert!(matches!(
            IdentityProvider::new().derive_shared_key_b64("not base64 !!"),
            Err(CryptoError::KeyAgreement(_))
        ));
    }

    #[test]
    fn rejects_low_order_point() {
        let provider = IdentityProvider::new();
        // The identity element is of small order; agreement yields all zeroes.
        let zero = PublicKeyBytes([0u8; 32]);
        assert!(matches!(
            provider.derive_shared_key(&zero),
            Err(CryptoError::KeyAgreement(_))
        ));
    }

    #[test]
    fn b64_roundtrip_and_fingerprint_shape() {
        let pk = IdentityProvider::new().ensure_identity();
        assert_eq!(PublicKeyBytes::from_b64(&pk.to_b64()).unwrap(), pk);
        let fp = pk.fingerprint();
        assert_eq!(fp.split(' ').count(), 10);
        assert!(fp.split(' ').all(|g| g.len() == 4));
    }

    #[test]
    fn debug_never_shows_secret() {
        let provider = IdentityProvider::new();
        let peer = IdentityProvider::new().ensure_identity();
        let key = provider.derive_shared_key(&peer).unwrap();
        assert_eq!(format!("{key:?}"), "SharedKey(<redacted>)");
    }
}
