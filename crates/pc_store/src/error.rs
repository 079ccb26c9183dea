use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Integrity error in {path}: {reason}")]
    Integrity { path: PathBuf, reason: String },

    #[error("Crypto error: {0}")]
    Crypto(#[from] pc_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
