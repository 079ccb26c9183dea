//! Per-message envelope encryption between two peers.
//!
//! Envelope wire format:
//!   [ kind (1 byte) | nonce (12 bytes) | ciphertext + tag ]
//!
//! kind: 0 = text (UTF-8 bytes), 1 = image (raw decoded bytes).

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    aead::{self, NONCE_LEN, TAG_LEN},
    error::CryptoError,
    identity::{IdentityProvider, PublicKeyBytes, SharedKey},
};

pub const ENVELOPE_HEADER_LEN: usize = 1 + NONCE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentKind {
    Text = 0,
    Image = 1,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
        }
    }
}

impl TryFrom<u8> for ContentKind {
    type Error = CryptoError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ContentKind::Text),
            1 => Ok(ContentKind::Image),
            other => Err(CryptoError::MalformedEnvelope(format!(
                "unknown content kind {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Image(Vec<u8>),
}

impl MessageContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            MessageContent::Text(_) => ContentKind::Text,
            MessageContent::Image(_) => ContentKind::Image,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MessageContent::Text(s) => s.as_bytes(),
            MessageContent::Image(b) => b,
        }
    }
}

/// One encrypted unit.  The nonce is fresh for every `seal_content` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: ContentKind,
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext including the 16-byte GCM tag.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.ciphertext.len());
        out.push(self.kind as u8);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() < ENVELOPE_HEADER_LEN + TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "envelope too short: {} bytes",
                data.len()
            )));
        }
        let kind = ContentKind::try_from(data[0])?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[1..ENVELOPE_HEADER_LEN]);
        Ok(Self {
            kind,
            nonce,
            ciphertext: data[ENVELOPE_HEADER_LEN..].to_vec(),
        })
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&STANDARD.decode(s.trim())?)
    }
}

/// Encrypt under an already-derived shared key.
pub fn seal_content(key: &SharedKey, content: &MessageContent) -> Result<Envelope, CryptoError> {
    let nonce = aead::generate_nonce();
    let ciphertext = aead::encrypt_with_nonce(key.as_bytes(), &nonce, content.as_bytes())?;
    Ok(Envelope {
        kind: content.kind(),
        nonce,
        ciphertext,
    })
}

/// Decrypt under an already-derived shared key.
pub fn open_content(key: &SharedKey, envelope: &Envelope) -> Result<MessageContent, CryptoError> {
    let plaintext = aead::decrypt_with_nonce(key.as_bytes(), &envelope.nonce, &envelope.ciphertext)?;
    match envelope.kind {
        ContentKind::Text => Ok(MessageContent::Text(String::from_utf8(plaintext)?)),
        ContentKind::Image => Ok(MessageContent::Image(plaintext)),
    }
}

/// Derive the peer key and encrypt `content` for that peer.
pub fn encrypt(
    identity: &IdentityProvider,
    content: &MessageContent,
    peer: &PublicKeyBytes,
) -> Result<Envelope, CryptoError> {
    let key = identity.derive_shared_key(peer)?;
    seal_content(&key, content)
}

/// Derive the peer key and decrypt an envelope received from that peer.
pub fn decrypt(
    identity: &IdentityProvider,
    envelope: &Envelope,
    peer: &PublicKeyBytes,
) -> Result<MessageContent, CryptoError> {
    let key = identity.derive_shared_key(peer)?;
    open_content(&key, envelope)
}
