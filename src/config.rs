//! Tunables for export and import.

use crate::kdf;

/// Minimum number of characters (Unicode scalar values) an export password must have.
pub const MIN_PASSWORD_CHARS: usize = 12;

/// Settings shared by every export and import run through a
/// [`BackupEngine`](crate::backup::BackupEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// PBKDF2 iteration count used for both export and import.
    ///
    /// The envelope does not record it, so raising it makes older files
    /// unreadable unless they are imported with the count they were written with.
    /// Zero is rejected by both directions.
    pub kdf_iterations: u32,
    /// Exports refuse to run with fewer iterations than this.
    ///
    /// Defaults to [`kdf::DEFAULT_ITERATIONS`]. Imports are not bound by it so
    /// that files written with a lower count stay readable.
    pub min_export_kdf_iterations: u32,
    /// Export passwords shorter than this are rejected before any key derivation.
    pub min_password_chars: usize,
    /// Accept version 1 (AES-CBC, unauthenticated) backups on import.
    pub allow_legacy_v1: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: kdf::DEFAULT_ITERATIONS,
            min_export_kdf_iterations: kdf::DEFAULT_ITERATIONS,
            min_password_chars: MIN_PASSWORD_CHARS,
            allow_legacy_v1: false,
        }
    }
}

impl BackupConfig {
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Lower (or raise) the iteration floor for exports.
    ///
    /// Meant for tests and benchmarks; production exports should keep the default.
    pub fn with_min_export_kdf_iterations(mut self, floor: u32) -> Self {
        self.min_export_kdf_iterations = floor;
        self
    }

    pub fn with_min_password_chars(mut self, min: usize) -> Self {
        self.min_password_chars = min;
        self
    }

    pub fn with_legacy_v1(mut self, allow: bool) -> Self {
        self.allow_legacy_v1 = allow;
        self
    }
}
