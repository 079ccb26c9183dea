//! pc_core: the secure messaging service object
//!
//! Ties together `pc_crypto` (keys and envelopes), `pc_proto` (framing and
//! flood control) and `pc_store` (encrypted history) behind one
//! [`SecureMessenger`], built explicitly from a [`CoreConfig`] and shared
//! behind an `Arc`.
//!
//! # Modules
//! - `config`   - JSON config with defaults, data directory resolution
//! - `paths`    - platform directories and the `PC_DATA_DIR` override
//! - `key_cache`- per-peer shared key cache
//! - `messenger`- outgoing/incoming pipelines and the listener seam
//! - `sweeper`  - background maintenance task

pub mod config;
pub mod error;
pub mod key_cache;
pub mod messenger;
pub mod paths;
pub mod sweeper;

pub use config::CoreConfig;
pub use error::CoreError;
pub use key_cache::SharedKeyCache;
pub use messenger::{MaintenanceReport, MessageListener, OutgoingMessage, SecureMessenger};
pub use sweeper::spawn_sweeper;

pub use pc_crypto::{ContentKind, MessageContent, PublicKeyBytes};
pub use pc_store::StoredMessage;
