//! Send/receive pipeline.
//!
//! Outgoing: content → AES-GCM envelope → base64 → frames (+ local copy).
//! Incoming: frame → flood check → reassembly → envelope → plaintext → store.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::RwLock;
use pc_crypto::{
    cipher::{open_content, seal_content},
    Envelope, IdentityProvider, MessageContent, PublicKeyBytes,
};
use pc_proto::{FloodGuard, Reassembler};
use pc_store::{MessageStore, StoredMessage};
use tracing::{debug, info, warn};

use crate::{config::CoreConfig, error::CoreError, key_cache::SharedKeyCache, paths};

/// UI-side callback seam.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: &StoredMessage);

    /// A frame completed a message that could not be decrypted or stored.
    fn on_failure(&self, _peer: &str, _error: &CoreError) {}
}

/// Frames to hand to the transport plus the record kept locally.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message: StoredMessage,
    pub frames: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub evicted_buffers: usize,
    pub pruned_senders: usize,
}

pub struct SecureMessenger {
    config: CoreConfig,
    identity: IdentityProvider,
    shared_keys: SharedKeyCache,
    reassembler: Reassembler,
    flood: FloodGuard,
    store: MessageStore,
    listener: RwLock<Option<Arc<dyn MessageListener>>>,
}

impl SecureMessenger {
    /// Build from config, resolving the data directory the usual way.
    pub fn from_config(config: CoreConfig) -> Result<Self, CoreError> {
        let data_dir = config.resolve_data_dir()?;
        Self::open(config, &data_dir)
    }

    pub fn open(config: CoreConfig, data_dir: &Path) -> Result<Self, CoreError> {
        config.validate()?;
        let store = MessageStore::open(paths::message_root(data_dir), &config.local_handle)?;
        let identity = IdentityProvider::new();
        info!(
            handle = %config.local_handle,
            fingerprint = %identity.ensure_identity().fingerprint(),
            "secure messenger ready"
        );
        Ok(Self {
            reassembler: Reassembler::new(config.chunking.clone()),
            flood: FloodGuard::new(config.flood.clone()),
            shared_keys: SharedKeyCache::new(),
            listener: RwLock::new(None),
            identity,
            store,
            config,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn local_handle(&self) -> &str {
        &self.config.local_handle
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        self.identity.ensure_identity()
    }

    pub fn identity(&self) -> &IdentityProvider {
        &self.identity
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn flood(&self) -> &FloodGuard {
        &self.flood
    }

    pub fn set_listener(&self, listener: Arc<dyn MessageListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    pub fn prepare_outgoing(
        &self,
        peer_handle: &str,
        peer_key: &PublicKeyBytes,
        content: MessageContent,
    ) -> Result<OutgoingMessage, CoreError> {
        let result = self.seal_and_store(peer_handle, peer_key, content);
        if let Err(e) = &result {
            warn!(peer = %peer_handle, error = %e, "failed to prepare outgoing message");
            self.notify_failure(peer_handle, e);
        }
        result
    }

    fn seal_and_store(
        &self,
        peer_handle: &str,
        peer_key: &PublicKeyBytes,
        content: MessageContent,
    ) -> Result<OutgoingMessage, CoreError> {
        let key = self.shared_keys.get_or_derive(&self.identity, peer_handle, peer_key)?;
        let envelope = seal_content(&key, &content)?;
        let frames = self.reassembler.split_message(&envelope.to_b64())?;

        let message = StoredMessage::new_outgoing(
            self.local_handle(),
            peer_handle,
            display_content(&content),
            content.kind(),
        );
        self.store.store_message(peer_handle, &message)?;
        debug!(peer = %peer_handle, message_id = %message.id, frames = frames.len(), "prepared outgoing");
        Ok(OutgoingMessage { message, frames })
    }

    /// Feed one transport frame from `sender_handle`.
    ///
    /// Flood control is charged once per logical message: for a plain frame
    /// or the first fragment of a new chunked message.  Further fragments of
    /// a pending message go straight to reassembly.
    ///
    /// `Ok(None)` while a chunked message is still incomplete or when the
    /// frame was malformed and dropped.
    pub fn handle_incoming(
        &self,
        sender_handle: &str,
        sender_key: &PublicKeyBytes,
        frame: &str,
    ) -> Result<Option<StoredMessage>, CoreError> {
        if self.reassembler.opens_new_message(frame) && !self.flood.allow(sender_handle) {
            return Err(CoreError::Flooded(sender_handle.to_string()));
        }
        let Some(payload) = self.reassembler.process_received_message(frame) else {
            return Ok(None);
        };

        match self.open_and_store(sender_handle, sender_key, &payload) {
            Ok(message) => {
                if let Some(listener) = self.listener() {
                    listener.on_message(&message);
                }
                Ok(Some(message))
            }
            Err(e) => {
                warn!(peer = %sender_handle, error = %e, "dropping undecryptable message");
                self.notify_failure(sender_handle, &e);
                Err(e)
            }
        }
    }

    fn open_and_store(
        &self,
        sender_handle: &str,
        sender_key: &PublicKeyBytes,
        payload: &str,
    ) -> Result<StoredMessage, CoreError> {
        let envelope = Envelope::from_b64(payload)?;
        let key = self.shared_keys.get_or_derive(&self.identity, sender_handle, sender_key)?;
        let content = open_content(&key, &envelope)?;

        let message = StoredMessage::new_incoming(
            sender_handle,
            self.local_handle(),
            display_content(&content),
            content.kind(),
        );
        self.store.store_message(sender_handle, &message)?;
        debug!(peer = %sender_handle, message_id = %message.id, "received message");
        Ok(message)
    }

    /// Evict stale reassembly buffers and forget idle senders.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        self.run_maintenance_at(Instant::now())
    }

    pub fn run_maintenance_at(&self, now: Instant) -> MaintenanceReport {
        let report = MaintenanceReport {
            evicted_buffers: self.reassembler.sweep_expired_at(now),
            pruned_senders: self.flood.prune_idle(now),
        };
        if report != MaintenanceReport::default() {
            debug!(
                evicted = report.evicted_buffers,
                pruned = report.pruned_senders,
                "maintenance pass"
            );
        }
        report
    }

    fn listener(&self) -> Option<Arc<dyn MessageListener>> {
        self.listener.read().clone()
    }

    fn notify_failure(&self, peer: &str, error: &CoreError) {
        if let Some(listener) = self.listener() {
            listener.on_failure(peer, error);
        }
    }
}

impl std::fmt::Debug for SecureMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureMessenger")
            .field("handle", &self.config.local_handle)
            .field("identity", &self.identity)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Text is stored as-is; image bytes as standard base64.
fn display_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Image(bytes) => STANDARD.encode(bytes),
    }
}
