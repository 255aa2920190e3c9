//! Versioned binary container for encrypted backups
//!
//! The binary format is:
//! - version: 1 byte (1 = legacy AES-256-CBC, 2 = AES-256-GCM)
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - ciphertext: variable length (for version 2, includes the 16-byte GCM tag)

use crate::error::{BackupError, ErrorCategory, ErrorKind, Result};
use crate::kdf::SALT_LEN;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the GCM authentication tag appended to version 2 ciphertexts
pub const TAG_LEN: usize = 16;

/// AES block length; version 1 ciphertexts are whole blocks
pub const BLOCK_LEN: usize = 16;

/// Length of everything before the ciphertext
pub const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Format version, resolved once when an envelope is parsed and used to pick
/// the decryption algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Legacy AES-256-CBC with PKCS#7 padding. Decrypt only; no integrity check.
    V1Cbc,
    /// AES-256-GCM.
    V2Gcm,
}

impl FormatVersion {
    /// The version written by every new export.
    pub const CURRENT: FormatVersion = FormatVersion::V2Gcm;

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FormatVersion::V1Cbc),
            2 => Some(FormatVersion::V2Gcm),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            FormatVersion::V1Cbc => 1,
            FormatVersion::V2Gcm => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: FormatVersion,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize as `version(1) + salt(16) + nonce(12) + ciphertext(variable)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        output.push(self.version.tag());
        output.extend_from_slice(&self.salt);
        output.extend_from_slice(&self.nonce);
        output.extend_from_slice(&self.ciphertext);
        output
    }

    /// Parse the binary format.
    ///
    /// Only the structure is checked here; whether the ciphertext decrypts is
    /// for the cipher layer to find out.
    pub fn parse(input: &[u8]) -> Result<Self> {
        if input.len() < HEADER_LEN {
            return Err(malformed("input likely truncated while reading header"));
        }

        let (&tag, rest) = input
            .split_first()
            .ok_or_else(|| malformed("input likely truncated while reading version"))?;
        let version =
            FormatVersion::from_tag(tag).ok_or_else(|| malformed("unsupported format version"))?;

        let (salt, rest) = rest.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        match version {
            FormatVersion::V2Gcm if ciphertext.len() < TAG_LEN => {
                return Err(malformed("ciphertext shorter than authentication tag"));
            }
            FormatVersion::V1Cbc if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 => {
                return Err(malformed("ciphertext is not a whole number of blocks"));
            }
            _ => {}
        }

        Ok(Self {
            version,
            salt: salt
                .try_into()
                .map_err(|_| malformed("failed to read salt"))?,
            nonce: nonce
                .try_into()
                .map_err(|_| malformed("failed to read nonce"))?,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn malformed(msg: &str) -> BackupError {
    BackupError::new(ErrorCategory::User, ErrorKind::MalformedEnvelope, msg)
}
