//! PBKDF2-HMAC-SHA256 key derivation for password → backup key.

use sha2::Sha256;
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Stretches a password and salt into a symmetric key.
///
/// Implementations must be deterministic in `(password, salt, iterations)`
/// and must not retain the password or the derived key after returning.
pub trait KeyDerivation: Send + Sync {
    fn derive(&self, password: &[u8], salt: &[u8; SALT_LEN], iterations: u32)
    -> Zeroizing<[u8; KEY_LEN]>;
}

/// PBKDF2 with HMAC-SHA-256 as the pseudorandom function.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pbkdf2Sha256;

impl KeyDerivation for Pbkdf2Sha256 {
    fn derive(
        &self,
        password: &[u8],
        salt: &[u8; SALT_LEN],
        iterations: u32,
    ) -> Zeroizing<[u8; KEY_LEN]> {
        derive_key(password, salt, iterations)
    }
}

/// Derive a 32-byte key from a password and salt using PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, key.as_mut());
    key
}
