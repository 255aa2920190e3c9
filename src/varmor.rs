//! Versioned text armoring for backup files
//!
//! Provides base64url encoding with a version prefix, for backups that travel
//! through channels that mangle binary data (chat, notes, password managers).
//! The armored format is:
//! - Free of whitespace (including newlines)
//! - Safe to embed in URLs
//! - Safe to pass unescaped in a POSIX shell
//!
//! The armor version is independent of the envelope format version inside it.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::error::{BackupError, Result};

/// Magic prefix for all armor versions
const MAGIC_PREFIX: &str = "arrvault";

/// Version 1 magic marker
const V1_MAGIC: &str = "arrvault1:";

/// Wrap bytes in armor, returning the armored string
///
/// Format: arrvault1:{base64url-no-padding}
pub fn wrap(body: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(body);
    format!("{}{}", V1_MAGIC, encoded)
}

/// Whether `input` looks like armored text rather than a binary envelope.
///
/// Binary envelopes start with a small version byte, never with the magic prefix.
pub fn is_armored(input: &[u8]) -> bool {
    input.starts_with(MAGIC_PREFIX.as_bytes())
}

/// Unwrap an armored string, returning the original bytes
///
/// Surrounding whitespace (such as a trailing newline added by an editor) is ignored.
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    let armored = armored.trim();
    if armored.len() < V1_MAGIC.len() {
        return Err(BackupError::corrupt_backup(
            "input size smaller than magic marker; likely truncated",
        ));
    }

    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| BackupError::corrupt_backup("armored backup is not valid base64"))
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(BackupError::corrupt_backup(
            "input claims to be an armored backup, but not a version we support",
        ))
    } else {
        Err(BackupError::corrupt_backup("input unrecognized as an armored backup"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_bytes() {
        let bytes = b"";
        let armored = wrap(bytes);
        let unwrapped = unwrap(&armored).unwrap();
        assert_eq!(bytes, &unwrapped[..]);
    }

    #[test]
    fn test_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();
        let armored = wrap(&bytes);

        assert_eq!(
            armored,
            "arrvault1:AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUmJygpKissLS4vMDEyMzQ1Njc4OTo7PD0-P0BBQkNERUZHSElKS0xNTk9QUVJTVFVWV1hZWltcXV5fYGFiY2RlZmdoaWprbG1ub3BxcnN0dXZ3eHl6e3x9fn-AgYKDhIWGh4iJiouMjY6PkJGSk5SVlpeYmZqbnJ2en6ChoqOkpaanqKmqq6ytrq-wsbKztLW2t7i5uru8vb6_wMHCw8TFxsfIycrLzM3Oz9DR0tPU1dbX2Nna29zd3t_g4eLj5OXm5-jp6uvs7e7v8PHy8_T19vf4-fr7_P3-_w"
        );

        let unwrapped = unwrap(&armored).unwrap();
        assert_eq!(bytes, unwrapped);
    }

    #[test]
    fn test_trailing_newline_ignored() {
        let armored = format!("{}\n", wrap(b"backup"));
        assert_eq!(unwrap(&armored).unwrap(), b"backup");
    }

    #[test]
    fn test_is_armored() {
        assert!(is_armored(wrap(b"x").as_bytes()));
        assert!(!is_armored(&[2u8, 0, 0, 0]));
        assert!(!is_armored(b""));
    }

    #[test]
    fn test_truncated_input() {
        let err = unwrap("").expect_err("expected truncated input error");
        assert_eq!(err.kind, ErrorKind::CorruptBackup);
    }

    #[test]
    fn test_wrong_version() {
        let err = unwrap("arrvault999999:...").expect_err("expected unsupported version error");
        assert_eq!(err.kind, ErrorKind::CorruptBackup);
        assert!(err.message().contains("not a version we support"));
    }

    #[test]
    fn test_not_armored() {
        let err = unwrap("something not looking like a backup")
            .expect_err("expected unrecognized input error");
        assert_eq!(err.kind, ErrorKind::CorruptBackup);
    }

    #[test]
    fn test_bad_base64() {
        let err = unwrap("arrvault1:bad$$").expect_err("expected base64 decode error");
        assert_eq!(err.kind, ErrorKind::CorruptBackup);
    }

    #[test]
    fn test_url_safe() {
        let bytes = vec![0xFFu8; 100];
        let armored = wrap(&bytes);

        assert!(!armored.contains('+'));
        assert!(!armored.contains('/'));
        assert!(!armored.contains('='));
        assert!(!armored.contains(char::is_whitespace));
    }
}
