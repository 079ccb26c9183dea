//! pc_proto: transport-side framing for the secure messaging core
//!
//! Everything here operates on already-serialised strings; nothing in this
//! crate knows about keys or ciphertext.
//!
//! # Modules
//! - `chunk`- split oversized frames, reassemble fragments, evict stale buffers
//! - `flood`- per-sender sliding-window admission with cooldown
//! - `error`- chunk protocol errors

pub mod chunk;
pub mod error;
pub mod flood;

pub use chunk::{is_chunk_frame, ChunkConfig, ChunkInfo, Reassembler, CHUNK_MARKER};
pub use error::ChunkError;
pub use flood::{FloodConfig, FloodGuard};
