use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Sender {0} is rate limited")]
    Flooded(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] pc_crypto::CryptoError),

    #[error("Chunk protocol error: {0}")]
    Chunk(#[from] pc_proto::ChunkError),

    #[error("Store error: {0}")]
    Store(#[from] pc_store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
