use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
///
/// Callers are expected to drive their messaging off these kinds. None of them
/// say which byte or field of a backup failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The export password is shorter than the configured minimum.
    WeakPassword,
    /// The key derivation iteration count is zero, or below the export floor.
    WeakKeyDerivation,
    /// Records handed to export have empty or duplicate ids.
    InvalidRecords,
    /// The byte sequence is not a recognizable envelope (too short, unknown version).
    MalformedEnvelope,
    /// The backup is not a recognizable envelope, or its decrypted content
    /// does not have the shape of a backup payload.
    CorruptBackup,
    /// Authenticated decryption failed. A wrong password and a tampered or
    /// corrupted file are deliberately indistinguishable.
    WrongPasswordOrCorrupt,
    /// The envelope carries the legacy (version 1) tag while legacy compatibility
    /// is off. A current backup with a damaged first byte looks the same.
    LegacyFormatDisabled,
    /// Unexpected failure from an underlying cryptographic primitive or the
    /// system random number generator.
    InternalCipherFailure,
    /// The background worker could not be started or vanished without a result.
    OffloadFailed,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// The passphrase and its confirmation differ.
    PassphraseMismatch,
    /// The credential store file exists but cannot be understood.
    StoreFormat,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

/// Step of a single export or import operation.
///
/// An operation walks `Idle → Validating → KeyDeriving → Ciphering` and then
/// either finishes (export) or goes through `Diffing` (import) before `Done`.
/// Failures carry the stage they happened in, which makes `Failed(reason)` the
/// pair of an error's [`BackupError::stage`] and [`BackupError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    KeyDeriving,
    Ciphering,
    Diffing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::KeyDeriving => "key-deriving",
            Stage::Ciphering => "ciphering",
            Stage::Diffing => "diffing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct BackupError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific condition tag.
    pub kind: ErrorKind,
    /// Stage of the operation the error was raised in, when raised by the
    /// backup orchestrator.
    pub stage: Option<Stage>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl BackupError {
    /// Creates a new error with a category, kind and display message.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            stage: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            stage: None,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The password was rejected by the length policy.
    pub fn weak_password(min_chars: usize) -> Self {
        Self::new(
            ErrorCategory::User,
            ErrorKind::WeakPassword,
            format!("password too short; at least {min_chars} characters are required"),
        )
    }

    /// The configured iteration count is unusable for this operation.
    pub fn weak_key_derivation(iterations: u32, floor: u32) -> Self {
        Self::new(
            ErrorCategory::User,
            ErrorKind::WeakKeyDerivation,
            format!("key derivation iteration count {iterations} is below the minimum of {floor}"),
        )
    }

    /// The input is not a backup this version can read.
    pub fn corrupt_backup(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::CorruptBackup, msg)
    }

    /// Authenticated decryption failed.
    pub fn wrong_password_or_corrupt() -> Self {
        Self::new(
            ErrorCategory::User,
            ErrorKind::WrongPasswordOrCorrupt,
            "wrong password or corrupted file",
        )
    }

    /// A cryptographic primitive failed in a way no input should cause.
    pub fn internal_cipher(msg: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Internal,
            ErrorKind::InternalCipherFailure,
            msg,
        )
    }

    /// An I/O failure with its originating error.
    pub fn io(category: ErrorCategory, msg: impl Into<String>, source: std::io::Error) -> Self {
        Self::with_source(category, ErrorKind::Io, msg, source)
    }

    /// Records the stage this error was raised in, unless one is already set.
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage.get_or_insert(stage);
        self
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        let stage = self.stage;
        Self {
            category,
            kind,
            stage,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_preserves_kind_and_stage() {
        let err = BackupError::wrong_password_or_corrupt()
            .at_stage(Stage::Ciphering)
            .with_context("failed to import backup");

        assert_eq!(err.kind, ErrorKind::WrongPasswordOrCorrupt);
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.stage, Some(Stage::Ciphering));
        assert_eq!(err.to_string(), "failed to import backup");
        assert_eq!(
            err.source_error().unwrap().to_string(),
            "wrong password or corrupted file"
        );
    }

    #[test]
    fn test_at_stage_keeps_first_stage() {
        let err = BackupError::corrupt_backup("bad")
            .at_stage(Stage::Validating)
            .at_stage(Stage::Done);
        assert_eq!(err.stage, Some(Stage::Validating));
    }

    #[test]
    fn test_weak_password_message_names_policy_only() {
        let err = BackupError::weak_password(12);
        assert_eq!(err.kind, ErrorKind::WeakPassword);
        assert!(err.message().contains("12"));
    }

    #[test]
    fn test_weak_key_derivation_names_both_counts() {
        let err = BackupError::weak_key_derivation(1, 600_000);
        assert_eq!(err.kind, ErrorKind::WeakKeyDerivation);
        assert_eq!(err.category, ErrorCategory::User);
        assert!(err.message().contains(" 1 "));
        assert!(err.message().contains("600000"));
    }
}
