use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Malformed chunk descriptor: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid chunk descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Chunk total mismatch for {message_id}: buffer has {expected}, fragment says {got}")]
    TotalMismatch {
        message_id: String,
        expected: u32,
        got: u32,
    },

    #[error("Reassembled payload could not be decoded: {0}")]
    Decode(String),

    #[error("Invalid chunk configuration: {0}")]
    Config(String),
}
