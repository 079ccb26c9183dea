//! pc_crypto: peer key agreement and message envelope encryption
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - The local private key never leaves `identity`.
//!
//! # Module layout
//! - `identity`- process X25519 identity + per-peer shared key derivation
//! - `cipher`  - content envelopes (kind tag + nonce + AES-GCM ciphertext)
//! - `aead`    - AES-128-GCM seal/open helpers (also used for local storage)
//! - `error`   - unified error type

pub mod aead;
pub mod cipher;
pub mod error;
pub mod identity;

pub use cipher::{decrypt, encrypt, ContentKind, Envelope, MessageContent};
pub use error::CryptoError;
pub use identity::{IdentityProvider, PublicKeyBytes, SharedKey};
