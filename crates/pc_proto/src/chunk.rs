//! Chunking and reassembly of oversized transport frames.
//!
//! # Framing
//! A payload at or under `threshold` bytes goes out unchanged.  Anything
//! larger is base64-encoded as a whole, sliced into `chunk_size` windows and
//! each window is sent as
//!
//!   "__PC_CHUNK__:" + JSON(ChunkInfo)
//!
//! All fragments of one logical message share a random `messageId` and
//! `totalChunks`; order is carried by `chunkIndex`, never by arrival order.
//!
//! # Reassembly buffer
//! One `ChunkedMessage` per logical id.  Created on the first fragment,
//! removed when the last one arrives, or evicted by `sweep_expired` once older
//! than `buffer_timeout` whether complete or not.  A fragment for an id that was
//! already completed or evicted starts a new buffer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ChunkError;

pub const CHUNK_MARKER: &str = "__PC_CHUNK__:";

/// Bytes reserved for the marker and JSON descriptor around each window.
const FRAME_OVERHEAD: usize = 512;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Payloads longer than this (in bytes) are chunked.
    pub threshold: usize,
    /// Size of each base64 window.
    pub chunk_size: usize,
    /// Age after which an incomplete buffer is evicted.
    pub buffer_timeout_secs: u64,
    /// Upper bound on `totalChunks` accepted from a peer.
    pub max_chunks: u32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            threshold: 60 * 1024,
            chunk_size: 48 * 1024,
            buffer_timeout_secs: 30,
            max_chunks: 4096,
        }
    }
}

impl ChunkConfig {
    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_secs(self.buffer_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::Config("chunk_size must be non-zero".into()));
        }
        if self.chunk_size + FRAME_OVERHEAD > self.threshold {
            return Err(ChunkError::Config(format!(
                "chunk_size {} leaves no framing headroom under threshold {}",
                self.chunk_size, self.threshold
            )));
        }
        if self.max_chunks == 0 {
            return Err(ChunkError::Config("max_chunks must be non-zero".into()));
        }
        Ok(())
    }
}

// ── Wire descriptor ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub message_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub data: String,
    pub is_base64: bool,
}

impl ChunkInfo {
    pub fn to_frame(&self) -> Result<String, ChunkError> {
        Ok(format!("{CHUNK_MARKER}{}", serde_json::to_string(self)?))
    }

    /// Parse a frame.  `None` when the text is not chunk-wrapped at all.
    pub fn from_frame(text: &str) -> Option<Result<Self, ChunkError>> {
        text.strip_prefix(CHUNK_MARKER)
            .map(|json| serde_json::from_str(json).map_err(ChunkError::from))
    }

    fn validate(&self, max_chunks: u32) -> Result<(), ChunkError> {
        if self.message_id.is_empty() {
            return Err(ChunkError::InvalidDescriptor("empty message id".into()));
        }
        // A lone fragment would complete on arrival, so replaying it would
        // deliver the message again.  Unchunked payloads travel as plain frames.
        if self.total_chunks < 2 {
            return Err(ChunkError::InvalidDescriptor(format!(
                "total_chunks {} is below 2",
                self.total_chunks
            )));
        }
        if self.total_chunks > max_chunks {
            return Err(ChunkError::InvalidDescriptor(format!(
                "total_chunks {} exceeds limit {max_chunks}",
                self.total_chunks
            )));
        }
        if self.chunk_index >= self.total_chunks {
            return Err(ChunkError::InvalidDescriptor(format!(
                "chunk_index {} out of range for {} chunks",
                self.chunk_index, self.total_chunks
            )));
        }
        Ok(())
    }
}

pub fn is_chunk_frame(text: &str) -> bool {
    text.starts_with(CHUNK_MARKER)
}

// ── Reassembly state ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct ChunkedMessage {
    total: u32,
    fragments: Vec<Option<String>>,
    received: u32,
    is_base64: bool,
    /// Set once the last fragment has been taken; late writers start a new buffer.
    completed: bool,
}

#[derive(Debug)]
struct BufferSlot {
    created_at: Instant,
    inner: Mutex<ChunkedMessage>,
}

impl BufferSlot {
    fn new(info: &ChunkInfo, now: Instant) -> Self {
        Self {
            created_at: now,
            inner: Mutex::new(ChunkedMessage {
                total: info.total_chunks,
                fragments: vec![None; info.total_chunks as usize],
                received: 0,
                is_base64: info.is_base64,
                completed: false,
            }),
        }
    }
}

/// Splits outgoing payloads and reassembles incoming fragments.
///
/// Safe to share between the receive path, the send path and the sweeper.
#[derive(Debug)]
pub struct Reassembler {
    config: ChunkConfig,
    buffers: RwLock<HashMap<String, Arc<BufferSlot>>>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ChunkConfig::default())
    }
}

impl Reassembler {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split `text` into transport frames.
    pub fn split_message(&self, text: &str) -> Result<Vec<String>, ChunkError> {
        if text.len() <= self.config.threshold {
            return Ok(vec![text.to_string()]);
        }

        let encoded = STANDARD.encode(text.as_bytes());
        let chunk_size = self.config.chunk_size.clamp(1, encoded.len().div_ceil(2).max(1));
        let total = encoded.len().div_ceil(chunk_size);
        let total_chunks = u32::try_from(total)
            .map_err(|_| ChunkError::InvalidDescriptor(format!("{total} chunks")))?;
        let message_id = Uuid::new_v4().to_string();

        let mut frames = Vec::with_capacity(total);
        for index in 0..total {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(encoded.len());
            let info = ChunkInfo {
                message_id: message_id.clone(),
                chunk_index: index as u32,
                total_chunks,
                // base64 output is ASCII, so byte offsets are char boundaries
                data: encoded[start..end].to_string(),
                is_base64: true,
            };
            frames.push(info.to_frame()?);
        }
        debug!(message_id = %message_id, total_chunks, bytes = text.len(), "split outgoing payload");
        Ok(frames)
    }

    /// Feed one received frame.  Returns the full payload once complete,
    /// the input itself when it is not chunk-wrapped, and `None` otherwise.
    ///
    /// Malformed fragments are logged and dropped.
    pub fn process_received_message(&self, text: &str) -> Option<String> {
        match self.ingest(text) {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "dropping chunk fragment");
                None
            }
        }
    }

    pub fn ingest(&self, text: &str) -> Result<Option<String>, ChunkError> {
        self.ingest_at(text, Instant::now())
    }

    pub fn ingest_at(&self, text: &str, now: Instant) -> Result<Option<String>, ChunkError> {
        let info = match ChunkInfo::from_frame(text) {
            None => return Ok(Some(text.to_string())),
            Some(parsed) => parsed?,
        };
        info.validate(self.config.max_chunks)?;

        let (slot, fragments, is_base64) = loop {
            let slot = self.slot_for(&info, now);
            let mut buf = slot.inner.lock();
            if buf.completed {
                drop(buf);
                self.remove_slot(&info.message_id, &slot);
                continue;
            }
            if buf.total != info.total_chunks {
                return Err(ChunkError::TotalMismatch {
                    message_id: info.message_id.clone(),
                    expected: buf.total,
                    got: info.total_chunks,
                });
            }

            let idx = info.chunk_index as usize;
            if buf.fragments[idx].is_some() {
                debug!(message_id = %info.message_id, index = idx, "duplicate fragment ignored");
                return Ok(None);
            }
            buf.fragments[idx] = Some(info.data.clone());
            buf.received += 1;

            if buf.received < buf.total {
                return Ok(None);
            }
            buf.completed = true;
            let fragments = std::mem::take(&mut buf.fragments);
            let is_base64 = buf.is_base64;
            drop(buf);
            break (slot, fragments, is_base64);
        };
        self.remove_slot(&info.message_id, &slot);

        let joined: String = fragments.into_iter().flatten().collect();
        let text = if is_base64 {
            let bytes = STANDARD
                .decode(joined.as_bytes())
                .map_err(|e| ChunkError::Decode(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| ChunkError::Decode(e.to_string()))?
        } else {
            joined
        };
        debug!(message_id = %info.message_id, bytes = text.len(), "reassembled payload");
        Ok(Some(text))
    }

    fn slot_for(&self, info: &ChunkInfo, now: Instant) -> Arc<BufferSlot> {
        if let Some(slot) = self.buffers.read().get(&info.message_id) {
            return Arc::clone(slot);
        }
        let mut table = self.buffers.write();
        let slot = table
            .entry(info.message_id.clone())
            .or_insert_with(|| Arc::new(BufferSlot::new(info, now)));
        Arc::clone(slot)
    }

    fn remove_slot(&self, message_id: &str, slot: &Arc<BufferSlot>) {
        let mut table = self.buffers.write();
        if table.get(message_id).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            table.remove(message_id);
        }
    }

    /// Evict buffers older than the configured timeout.  Returns how many.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let timeout = self.config.buffer_timeout();
        let mut table = self.buffers.write();
        let before = table.len();
        table.retain(|id, slot| {
            let keep = now.saturating_duration_since(slot.created_at) <= timeout;
            if !keep {
                warn!(message_id = %id, "evicting stale reassembly buffer");
            }
            keep
        });
        before - table.len()
    }

    /// Number of logical messages currently awaiting fragments.
    pub fn pending_count(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_pending(&self, message_id: &str) -> bool {
        self.buffers.read().contains_key(message_id)
    }

    /// Whether `text` starts a new logical message: a plain frame, a
    /// malformed fragment, or the first fragment seen for its message id.
    /// Later fragments of a pending message return `false`.
    pub fn opens_new_message(&self, text: &str) -> bool {
        match ChunkInfo::from_frame(text) {
            Some(Ok(info)) => !self.is_pending(&info.message_id),
            None | Some(Err(_)) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Reassembler {
        Reassembler::new(ChunkConfig {
            threshold: 1024,
            chunk_size: 100,
            buffer_timeout_secs: 30,
            max_chunks: 64,
        })
    }

    fn long_text(n: usize) -> String {
        (0..n).map(|i| char::from(b'a' + (i % 26) as u8)).collect()
    }

    fn id_of(frame: &str) -> String {
        ChunkInfo::from_frame(frame).unwrap().unwrap().message_id
    }

    #[test]
    fn short_text_is_single_unchanged_frame() {
        let r = small();
        let text = long_text(1024);
        assert_eq!(r.split_message(&text).unwrap(), vec![text]);
    }

    #[test]
    fn long_text_is_chunked_with_shared_id() {
        let r = small();
        let frames = r.split_message(&long_text(1025)).unwrap();
        assert!(frames.len() > 1);
        let infos: Vec<_> = frames
            .iter()
            .map(|f| ChunkInfo::from_frame(f).unwrap().unwrap())
            .collect();
        let total = infos.len() as u32;
        for (i, info) in infos.iter().enumerate() {
            assert_eq!(info.message_id, infos[0].message_id);
            assert_eq!(info.chunk_index, i as u32);
            assert_eq!(info.total_chunks, total);
            assert!(info.is_base64);
            assert!(info.data.len() <= 100);
        }
    }

    #[test]
    fn plain_text_passes_through() {
        let r = small();
        assert_eq!(r.process_received_message("hi there"), Some("hi there".into()));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn in_order_reassembly() {
        let r = small();
        let text = long_text(3000);
        let frames = r.split_message(&text).unwrap();
        let (last, rest) = frames.split_last().unwrap();
        for f in rest {
            assert_eq!(r.process_received_message(f), None);
        }
        assert_eq!(r.process_received_message(last), Some(text));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn reverse_order_reassembly_with_multibyte_text() {
        let r = small();
        let text = "héllo wörld · ✓ ".repeat(200);
        let frames = r.split_message(&text).unwrap();
        let mut out = None;
        for f in frames.iter().rev() {
            out = r.process_received_message(f);
        }
        assert_eq!(out, Some(text));
    }

    #[test]
    fn duplicate_fragment_is_a_no_op() {
        let r = small();
        let text = long_text(2000);
        let frames = r.split_message(&text).unwrap();
        assert_eq!(r.process_received_message(&frames[0]), None);
        assert_eq!(r.process_received_message(&frames[0]), None);
        for f in &frames[1..frames.len() - 1] {
            assert_eq!(r.process_received_message(f), None);
        }
        assert_eq!(r.process_received_message(frames.last().unwrap()), Some(text));
    }

    #[test]
    fn replayed_final_fragment_becomes_orphan() {
        let r = small();
        let frames = r.split_message(&long_text(2000)).unwrap();
        for f in &frames {
            r.process_received_message(f);
        }
        let last = frames.last().unwrap();
        assert_eq!(r.process_received_message(last), None);
        assert!(r.is_pending(&id_of(last)));
    }

    #[test]
    fn malformed_descriptor_is_dropped() {
        let r = small();
        assert_eq!(r.process_received_message("__PC_CHUNK__:{not json"), None);
        assert!(matches!(
            r.ingest("__PC_CHUNK__:{not json"),
            Err(ChunkError::Malformed(_))
        ));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let r = small();
        let info = ChunkInfo {
            message_id: "m".into(),
            chunk_index: 3,
            total_chunks: 3,
            data: "QQ==".into(),
            is_base64: true,
        };
        assert!(matches!(
            r.ingest(&info.to_frame().unwrap()),
            Err(ChunkError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn excessive_total_is_rejected() {
        let r = small();
        let info = ChunkInfo {
            message_id: "m".into(),
            chunk_index: 0,
            total_chunks: 65,
            data: "QQ==".into(),
            is_base64: true,
        };
        assert!(matches!(
            r.ingest(&info.to_frame().unwrap()),
            Err(ChunkError::InvalidDescriptor(_))
        ));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn total_mismatch_is_rejected() {
        let r = small();
        let mut info = ChunkInfo {
            message_id: "m".into(),
            chunk_index: 0,
            total_chunks: 3,
            data: "QU".into(),
            is_base64: true,
        };
        assert_eq!(r.ingest(&info.to_frame().unwrap()).unwrap(), None);
        info.chunk_index = 1;
        info.total_chunks = 4;
        assert!(matches!(
            r.ingest(&info.to_frame().unwrap()),
            Err(ChunkError::TotalMismatch { expected: 3, got: 4, .. })
        ));
    }

    #[test]
    fn corrupt_base64_never_delivers_partial_content() {
        let r = small();
        let frames: Vec<String> = (0..2)
            .map(|i| {
                ChunkInfo {
                    message_id: "bad".into(),
                    chunk_index: i,
                    total_chunks: 2,
                    data: "!!!".into(),
                    is_base64: true,
                }
                .to_frame()
                .unwrap()
            })
            .collect();
        assert_eq!(r.process_received_message(&frames[0]), None);
        assert_eq!(r.process_received_message(&frames[1]), None);
        assert!(!r.is_pending("bad"));
    }

    #[test]
    fn non_base64_fragments_are_concatenated() {
        let r = small();
        let frames: Vec<String> = ["ab", "cd"]
            .iter()
            .enumerate()
            .map(|(i, d)| {
                ChunkInfo {
                    message_id: "raw".into(),
                    chunk_index: i as u32,
                    total_chunks: 2,
                    data: (*d).into(),
                    is_base64: false,
                }
                .to_frame()
                .unwrap()
            })
            .collect();
        assert_eq!(r.process_received_message(&frames[1]), None);
        assert_eq!(r.process_received_message(&frames[0]), Some("abcd".into()));
    }

    #[test]
    fn sweep_evicts_only_stale_buffers() {
        let r = small();
        let t0 = Instant::now();
        let old = r.split_message(&long_text(2000)).unwrap();
        let fresh = r.split_message(&long_text(2000)).unwrap();
        r.ingest_at(&old[0], t0).unwrap();
        r.ingest_at(&fresh[0], t0 + Duration::from_secs(20)).unwrap();
        assert_eq!(r.pending_count(), 2);

        assert_eq!(r.sweep_expired_at(t0 + Duration::from_secs(30)), 0);
        assert_eq!(r.sweep_expired_at(t0 + Duration::from_secs(31)), 1);
        assert!(!r.is_pending(&id_of(&old[0])));
        assert!(r.is_pending(&id_of(&fresh[0])));
    }

    #[test]
    fn single_fragment_descriptor_is_rejected() {
        let r = small();
        let info = ChunkInfo {
            message_id: "solo".into(),
            chunk_index: 0,
            total_chunks: 1,
            data: "aGk=".into(),
            is_base64: true,
        };
        let frame = info.to_frame().unwrap();
        assert!(matches!(r.ingest(&frame), Err(ChunkError::InvalidDescriptor(_))));
        assert_eq!(r.process_received_message(&frame), None);
        assert_eq!(r.process_received_message(&frame), None);
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn oversized_window_still_yields_two_frames() {
        let r = Reassembler::new(ChunkConfig {
            threshold: 10,
            chunk_size: 10_000,
            ..ChunkConfig::default()
        });
        let text = long_text(11);
        let frames = r.split_message(&text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(r.process_received_message(&frames[0]), None);
        assert_eq!(r.process_received_message(&frames[1]), Some(text));
    }

    #[test]
    fn only_first_fragment_opens_a_message() {
        let r = small();
        let frames = r.split_message(&long_text(2000)).unwrap();
        assert!(r.opens_new_message("plain text"));
        assert!(r.opens_new_message("__PC_CHUNK__:{broken"));
        assert!(r.opens_new_message(&frames[1]));
        r.process_received_message(&frames[1]);
        for f in &frames {
            assert!(!r.opens_new_message(f));
        }
        for f in &frames {
            r.process_received_message(f);
        }
        assert_eq!(r.pending_count(), 0);
        assert!(r.opens_new_message(&frames[0]));
    }

    #[test]
    fn config_validation() {
        assert!(ChunkConfig::default().validate().is_ok());
        let bad = ChunkConfig {
            threshold: 100,
            chunk_size: 100,
            ..ChunkConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ChunkError::Config(_))));
    }
}
