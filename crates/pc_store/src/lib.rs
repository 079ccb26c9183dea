//! pc_store: encrypted local conversation history
//!
//! # Encryption strategy
//! Every message is its own file, sealed with AES-128-GCM under a key derived
//! locally from (own handle, peer handle).  The key never leaves this device
//! and is unrelated to the peer-to-peer shared key.
//!
//! # Disk layout
//! ```text
//! <base>/<sanitized peer>/messages/<timestamp>_<sanitized id>
//! <base>/<sanitized peer>/.staging/<uuid>.staging
//! ```
//! The timestamp in the file name lets pagination sort without decrypting.

pub mod error;
pub mod keys;
pub mod layout;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use layout::sanitize_handle;
pub use models::StoredMessage;
pub use store::MessageStore;
