//! Export and import of encrypted instance backups
//!
//! An export validates the password policy, serializes the records into a
//! [`BackupPayload`], derives a key from the password and a fresh salt, seals
//! the payload with AES-256-GCM under a fresh nonce and wraps the result in an
//! [`Envelope`]. An import reverses those steps and then compares the
//! recovered records against the caller's existing ones, returning an
//! [`ImportDiff`] for the caller to apply.
//!
//! Nothing here touches storage; the caller owns persistence.

use std::collections::HashSet;

use rand::TryRng;
use rand::rngs::SysRng;
use zeroize::Zeroizing;

use crate::cipher;
use crate::config::BackupConfig;
use crate::envelope::{Envelope, FormatVersion, NONCE_LEN};
use crate::error::{BackupError, ErrorCategory, ErrorKind, Result, Stage};
use crate::kdf::{self, KeyDerivation, Pbkdf2Sha256, SALT_LEN};
use crate::record::{self, ActiveIds, BackupPayload, InstanceRecord, InstanceRole};

/// Structural differences between a backup and the records a caller already has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportDiff {
    /// Records whose id is not present yet, in backup order.
    pub to_create: Vec<InstanceRecord>,
    /// Records that replace an existing record with the same id, in backup order.
    pub to_overwrite: Vec<InstanceRecord>,
    /// Active ids as stored in the backup, unchanged.
    pub preserved_active_ids: ActiveIds,
}

impl ImportDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_overwrite.is_empty()
    }

    /// Merge the diff into `records` and `active`.
    ///
    /// Overwrites replace whole records by id. A preserved active id is adopted
    /// only if a record with that id and the matching role exists after the
    /// merge; otherwise the current selection for that role is kept.
    pub fn apply_to(self, records: &mut Vec<InstanceRecord>, active: &mut ActiveIds) {
        let ImportDiff {
            to_create,
            to_overwrite,
            preserved_active_ids,
        } = self;

        for incoming in to_overwrite.into_iter().chain(to_create) {
            match records.iter_mut().find(|r| r.id == incoming.id) {
                Some(slot) => *slot = incoming,
                None => records.push(incoming),
            }
        }

        for role in [InstanceRole::Sonarr, InstanceRole::Radarr] {
            if let Some(id) = preserved_active_ids.get(role) {
                if records.iter().any(|r| r.id == id && r.role == role) {
                    active.set(role, Some(id.to_owned()));
                }
            }
        }
    }
}

/// Runs exports and imports with a fixed configuration.
///
/// Generic over the key derivation so callers can observe or replace it; the
/// default is PBKDF2-HMAC-SHA256. Each call is self-contained: no key,
/// password or plaintext outlives it.
#[derive(Debug, Clone)]
pub struct BackupEngine<K: KeyDerivation = Pbkdf2Sha256> {
    config: BackupConfig,
    kdf: K,
}

impl BackupEngine<Pbkdf2Sha256> {
    pub fn new(config: BackupConfig) -> Self {
        Self::with_kdf(config, Pbkdf2Sha256)
    }
}

impl Default for BackupEngine<Pbkdf2Sha256> {
    fn default() -> Self {
        Self::new(BackupConfig::default())
    }
}

impl<K: KeyDerivation> BackupEngine<K> {
    pub fn with_kdf(config: BackupConfig, kdf: K) -> Self {
        if config.kdf_iterations < kdf::DEFAULT_ITERATIONS {
            tracing::warn!(
                iterations = config.kdf_iterations,
                recommended = kdf::DEFAULT_ITERATIONS,
                "key derivation iteration count below recommended minimum"
            );
        }
        Self { config, kdf }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Encrypt `records` and the active selection into a backup file's bytes.
    ///
    /// Fails with `WeakKeyDerivation` if the configured iteration count is below
    /// the export floor, and with `WeakPassword` if the password is shorter than
    /// the configured minimum. Both checks run before any key derivation.
    pub fn export_backup(
        &self,
        records: &[InstanceRecord],
        active: &ActiveIds,
        password: &str,
    ) -> Result<Vec<u8>> {
        let mut progress = Progress::start("export");

        progress.advance(Stage::Validating);
        let floor = self.config.min_export_kdf_iterations.max(1);
        if self.config.kdf_iterations < floor {
            return Err(progress.fail(BackupError::weak_key_derivation(
                self.config.kdf_iterations,
                floor,
            )));
        }
        if password.chars().count() < self.config.min_password_chars {
            return Err(progress.fail(BackupError::weak_password(self.config.min_password_chars)));
        }
        record::check_ids(records).map_err(|problem| {
            progress.fail(BackupError::new(
                ErrorCategory::User,
                ErrorKind::InvalidRecords,
                format!("cannot export instances: {problem}"),
            ))
        })?;

        let payload = BackupPayload::new(records.to_vec(), active);
        let plaintext = serde_json::to_vec(&payload).map_err(|_| {
            progress.fail(BackupError::new(
                ErrorCategory::Internal,
                ErrorKind::InternalCipherFailure,
                "failed to serialize backup payload",
            ))
        })?;
        let plaintext = Zeroizing::new(plaintext);
        drop(payload);

        progress.advance(Stage::KeyDeriving);
        let salt = random_bytes::<SALT_LEN>().map_err(|e| progress.fail(e))?;
        let key = self
            .kdf
            .derive(password.as_bytes(), &salt, self.config.kdf_iterations);

        progress.advance(Stage::Ciphering);
        let nonce = random_bytes::<NONCE_LEN>().map_err(|e| progress.fail(e))?;
        let ciphertext =
            cipher::encrypt_current(&key, &nonce, &plaintext).map_err(|e| progress.fail(e))?;
        drop(key);

        let bytes = Envelope {
            version: FormatVersion::CURRENT,
            salt,
            nonce,
            ciphertext,
        }
        .to_bytes();

        progress.advance(Stage::Done);
        tracing::info!(
            instances = records.len(),
            bytes = bytes.len(),
            "backup exported"
        );
        Ok(bytes)
    }

    /// Decrypt a backup and compare it against `existing` records by id.
    ///
    /// Returns the diff without applying it. A wrong password on a current
    /// backup and a modified file both fail with `WrongPasswordOrCorrupt`.
    pub fn import_backup(
        &self,
        bytes: &[u8],
        password: &str,
        existing: &[InstanceRecord],
    ) -> Result<ImportDiff> {
        let mut progress = Progress::start("import");

        progress.advance(Stage::Validating);
        if self.config.kdf_iterations == 0 {
            return Err(progress.fail(BackupError::weak_key_derivation(0, 1)));
        }
        let envelope = Envelope::parse(bytes).map_err(|e| {
            tracing::debug!(reason = e.message(), "rejecting malformed envelope");
            progress.fail(BackupError::corrupt_backup("not a recognized backup file"))
        })?;
        if envelope.version == FormatVersion::V1Cbc {
            if !self.config.allow_legacy_v1 {
                return Err(progress.fail(BackupError::new(
                    ErrorCategory::User,
                    ErrorKind::LegacyFormatDisabled,
                    "backup is in the legacy unauthenticated format, or its header is damaged",
                )));
            }
            tracing::warn!("importing legacy backup format without integrity protection");
        }

        progress.advance(Stage::KeyDeriving);
        let key = self.kdf.derive(
            password.as_bytes(),
            &envelope.salt,
            self.config.kdf_iterations,
        );

        progress.advance(Stage::Ciphering);
        let plaintext = cipher::decrypt(
            envelope.version,
            &key,
            &envelope.nonce,
            &envelope.ciphertext,
        )
        .map_err(|e| progress.fail(e))?;
        drop(key);

        // Runs for every version; for version 1 it is the only thing standing
        // between a wrong password and garbage records.
        let payload: BackupPayload = serde_json::from_slice(&plaintext).map_err(|_| {
            progress.fail(BackupError::corrupt_backup(
                "backup content is not a valid instance backup",
            ))
        })?;
        drop(plaintext);
        record::check_ids(&payload.instance_records).map_err(|_| {
            progress.fail(BackupError::corrupt_backup(
                "backup content is not a valid instance backup",
            ))
        })?;

        progress.advance(Stage::Diffing);
        let diff = diff_against(payload, existing);

        progress.advance(Stage::Done);
        tracing::info!(
            version = envelope.version.tag(),
            create = diff.to_create.len(),
            overwrite = diff.to_overwrite.len(),
            "backup imported"
        );
        Ok(diff)
    }
}

/// Export with the default key derivation.
pub fn export_backup(
    records: &[InstanceRecord],
    active: &ActiveIds,
    password: &str,
    config: &BackupConfig,
) -> Result<Vec<u8>> {
    BackupEngine::new(config.clone()).export_backup(records, active, password)
}

/// Import with the default key derivation.
pub fn import_backup(
    bytes: &[u8],
    password: &str,
    existing: &[InstanceRecord],
    config: &BackupConfig,
) -> Result<ImportDiff> {
    BackupEngine::new(config.clone()).import_backup(bytes, password, existing)
}

fn diff_against(payload: BackupPayload, existing: &[InstanceRecord]) -> ImportDiff {
    let BackupPayload {
        instance_records,
        active_sonarr_id,
        active_radarr_id,
    } = payload;

    let existing_ids: HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let (to_overwrite, to_create) = instance_records
        .into_iter()
        .partition(|r| existing_ids.contains(r.id.as_str()));

    ImportDiff {
        to_create,
        to_overwrite,
        preserved_active_ids: ActiveIds {
            sonarr: active_sonarr_id,
            radarr: active_radarr_id,
        },
    }
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    SysRng.try_fill_bytes(&mut buf).map_err(|e| {
        BackupError::internal_cipher(format!("system random number generator failed: {e}"))
    })?;
    Ok(buf)
}

/// Tracks the stage of one operation for logging and error attribution.
struct Progress {
    operation: &'static str,
    stage: Stage,
}

impl Progress {
    fn start(operation: &'static str) -> Self {
        tracing::debug!(operation, stage = %Stage::Idle, "backup operation started");
        Self {
            operation,
            stage: Stage::Idle,
        }
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        tracing::debug!(operation = self.operation, %stage, "backup stage");
    }

    fn fail(&self, err: BackupError) -> BackupError {
        let err = err.at_stage(self.stage);
        tracing::debug!(
            operation = self.operation,
            stage = %self.stage,
            kind = ?err.kind,
            "backup operation failed"
        );
        err
    }
}
