use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Peer public key is malformed or the agreement was not contributory.
    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("Authentication failed (tag mismatch: tampered data or wrong key)")]
    Authentication,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Decrypted text is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
