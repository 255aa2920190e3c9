//! Backup file export and import
//!
//! This module ties a credential store, a passphrase source and a
//! [`BackupEngine`] together into the file level operations used by the CLI.
//! All key derivation and encryption runs on the background worker provided by
//! [`offload`](crate::offload).

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::backup::BackupEngine;
use crate::error::{BackupError, ErrorCategory, ErrorKind, Result};
use crate::kdf::KeyDerivation;
use crate::offload;
use crate::passphrase::{self, PassphraseReader};
use crate::record::InstanceRecord;
use crate::store::CredentialStore;
use crate::varmor;

/// Outcome of [`import_from_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Ids of records that did not exist in the store, in backup order.
    pub created: Vec<String>,
    /// Ids of records that replaced a stored record with the same id.
    pub overwritten: Vec<String>,
    /// Whether the changes were written to the store (false for a dry run).
    pub applied: bool,
}

/// Export every record in `store` to an encrypted backup at `output_path`.
///
/// With `armor` the file holds the text armored form instead of the raw
/// envelope bytes. An existing file at `output_path` is replaced atomically,
/// so a failed export leaves it intact. The result has mode 0o600
/// (read/write for owner only) on Unix systems.
pub fn export_to_file<S, K>(
    store: &S,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
    engine: &BackupEngine<K>,
    armor: bool,
) -> Result<()>
where
    S: CredentialStore + ?Sized,
    K: KeyDerivation + Clone + 'static,
{
    let records = store.list_all_records()?;
    let active = store.active_ids()?;
    let count = records.len();
    let password = passphrase::read_password(passphrase_reader)?;

    let envelope = offload::export_in_background(engine, records, active, password)?
        .blocking_wait()
        .map_err(|e| e.with_context("failed to export backup"))?;

    let contents = if armor {
        varmor::wrap(&envelope).into_bytes()
    } else {
        envelope
    };
    write_atomic(output_path, &contents)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    tracing::info!(records = count, armor, "backup written");
    Ok(())
}

/// Decrypt the backup at `input_path` and merge it into `store`.
///
/// Armored and binary backups are both accepted. With `dry_run` the store is
/// left untouched and the summary only reports what would change.
pub fn import_from_file<S, K>(
    input_path: &Path,
    store: &mut S,
    passphrase_reader: &mut dyn PassphraseReader,
    engine: &BackupEngine<K>,
    dry_run: bool,
) -> Result<ImportSummary>
where
    S: CredentialStore + ?Sized,
    K: KeyDerivation + Clone + 'static,
{
    let raw = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let envelope = if varmor::is_armored(&raw) {
        let armored = String::from_utf8(raw)
            .map_err(|_| BackupError::corrupt_backup("armored backup is not valid UTF-8"))?;
        varmor::unwrap(&armored).map_err(|e| e.with_context("failed to unarmor"))?
    } else {
        raw
    };
    let password = passphrase::read_password(passphrase_reader)?;
    let existing = store.list_all_records()?;

    let diff = offload::import_in_background(engine, envelope, password, existing)?
        .blocking_wait()
        .map_err(|e| e.with_context("failed to import backup"))?;

    let mut summary = ImportSummary {
        created: ids(&diff.to_create),
        overwritten: ids(&diff.to_overwrite),
        applied: false,
    };
    if dry_run {
        tracing::info!(
            created = summary.created.len(),
            overwritten = summary.overwritten.len(),
            "dry run, store left unchanged"
        );
        return Ok(summary);
    }

    store
        .apply_diff(diff)
        .map_err(|e| e.with_context("failed to update credential store"))?;
    summary.applied = true;
    tracing::info!(
        created = summary.created.len(),
        overwritten = summary.overwritten.len(),
        "backup imported"
    );
    Ok(summary)
}

fn ids(records: &[InstanceRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Atomically replace `path` with `contents` (tempfile + fsync + rename).
///
/// Either the old file or the new file exists afterwards, never a partial one.
/// The new file has mode 0o600 on Unix systems.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(BackupError::new(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("{} has no parent directory", path.display()),
            ));
        }
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| BackupError::io(ErrorCategory::Internal, "failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| BackupError::io(ErrorCategory::Internal, "failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| BackupError::io(ErrorCategory::Internal, "failed to flush tempfile", e))?;
    temp_file.as_file().sync_all().map_err(|e| {
        BackupError::io(
            ErrorCategory::Internal,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| {
                BackupError::io(
                    ErrorCategory::Internal,
                    "failed to get tempfile metadata",
                    e,
                )
            })?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            BackupError::io(
                ErrorCategory::Internal,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }
    temp_file.persist(path).map_err(|e| {
        BackupError::io(
            ErrorCategory::Internal,
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

pub(crate) fn read_error(path: &Path, err: io::Error) -> BackupError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    BackupError::io(
        category,
        format!("failed to read from {}", path.display()),
        err,
    )
}
