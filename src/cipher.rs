//! Authenticated encryption for backups
//!
//! New backups are sealed with AES-256-GCM. Version 1 backups used AES-256-CBC
//! with PKCS#7 padding and no authentication; they can still be opened, but a
//! wrong password or a modified file can only be caught by validating the
//! recovered plaintext afterwards.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::envelope::{BLOCK_LEN, FormatVersion, NONCE_LEN};
use crate::error::{BackupError, Result};
use crate::kdf::KEY_LEN;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt with the current format (AES-256-GCM).
///
/// Returns the ciphertext with the 16-byte tag appended. The nonce must never
/// be reused with the same key.
pub fn encrypt_current(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(&GenericArray::from(*key));
    cipher
        .encrypt(&GenericArray::from(*nonce), plaintext)
        .map_err(|_| BackupError::internal_cipher("AES-GCM encryption failed"))
}

/// Decrypt a ciphertext with the algorithm selected by `version`.
///
/// Version 2 fails closed with `WrongPasswordOrCorrupt` if the tag does not
/// verify. Version 1 fails with `CorruptBackup` if the padding is invalid; a
/// successful version 1 decrypt says nothing about whether the key was right.
pub fn decrypt(
    version: FormatVersion,
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    match version {
        FormatVersion::V2Gcm => {
            let cipher = Aes256Gcm::new(&GenericArray::from(*key));
            cipher
                .decrypt(&GenericArray::from(*nonce), ciphertext)
                .map(Zeroizing::new)
                .map_err(|_| BackupError::wrong_password_or_corrupt())
        }
        FormatVersion::V1Cbc => {
            let iv = legacy_iv(nonce);
            let cipher = Aes256CbcDec::new_from_slices(key, &iv)
                .map_err(|_| BackupError::internal_cipher("invalid AES-CBC key or IV length"))?;
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map(Zeroizing::new)
                .map_err(|_| BackupError::corrupt_backup("backup could not be decrypted"))
        }
    }
}

/// Version 1 IV: the 12-byte envelope nonce followed by four zero bytes.
fn legacy_iv(nonce: &[u8; NONCE_LEN]) -> [u8; BLOCK_LEN] {
    let mut iv = [0u8; BLOCK_LEN];
    iv[..NONCE_LEN].copy_from_slice(nonce);
    iv
}

/// Produce a version 1 ciphertext. Only tests need to write the legacy format.
#[cfg(test)]
pub(crate) fn encrypt_legacy(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;

    cbc::Encryptor::<aes::Aes256>::new_from_slices(key, &legacy_iv(nonce))
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}
