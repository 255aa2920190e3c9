//! Credential stores the backup engine reads from and writes to.
//!
//! The engine itself never touches storage: it takes a snapshot of records
//! and hands back an [`ImportDiff`]. A [`CredentialStore`] is the caller's
//! side of that contract.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::backup::ImportDiff;
use crate::error::{BackupError, ErrorCategory, ErrorKind, Result};
use crate::file_ops;
use crate::record::{self, ActiveIds, InstanceRecord};

pub trait CredentialStore {
    /// Every stored record, in storage order.
    fn list_all_records(&self) -> Result<Vec<InstanceRecord>>;

    /// The current selection for each role.
    fn active_ids(&self) -> Result<ActiveIds>;

    /// Merge an import into the store as a single update.
    fn apply_diff(&mut self, diff: ImportDiff) -> Result<()>;
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    records: Vec<InstanceRecord>,
    active: ActiveIds,
}

impl MemoryStore {
    pub fn new(records: Vec<InstanceRecord>, active: ActiveIds) -> Self {
        Self { records, active }
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    pub fn active(&self) -> &ActiveIds {
        &self.active
    }
}

impl CredentialStore for MemoryStore {
    fn list_all_records(&self) -> Result<Vec<InstanceRecord>> {
        Ok(self.records.clone())
    }

    fn active_ids(&self) -> Result<ActiveIds> {
        Ok(self.active.clone())
    }

    fn apply_diff(&mut self, diff: ImportDiff) -> Result<()> {
        diff.apply_to(&mut self.records, &mut self.active);
        Ok(())
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    records: Vec<InstanceRecord>,
    #[serde(default)]
    active_sonarr_id: Option<String>,
    #[serde(default)]
    active_radarr_id: Option<String>,
}

/// Store kept in a single JSON file.
///
/// A missing file is an empty store. Every update rewrites the whole file
/// atomically with mode 0o600, since the file holds API keys in the clear.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreFile> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => Zeroizing::new(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "store file missing, starting empty");
                return Ok(StoreFile::default());
            }
            Err(e) => return Err(file_ops::read_error(&self.path, e)),
        };

        // Parse errors are not attached: serde messages can quote field values.
        let file: StoreFile = serde_json::from_slice(&raw).map_err(|_| {
            BackupError::new(
                ErrorCategory::User,
                ErrorKind::StoreFormat,
                format!("{} is not a valid credential store", self.path.display()),
            )
        })?;
        record::check_ids(&file.records).map_err(|problem| {
            BackupError::new(
                ErrorCategory::User,
                ErrorKind::StoreFormat,
                format!("{}: {}", self.path.display(), problem),
            )
        })?;
        Ok(file)
    }

    fn save(&self, file: &StoreFile) -> Result<()> {
        let contents = Zeroizing::new(serde_json::to_vec_pretty(file).map_err(|_| {
            BackupError::new(
                ErrorCategory::Internal,
                ErrorKind::StoreFormat,
                "failed to serialize credential store",
            )
        })?);
        file_ops::write_atomic(&self.path, &contents)
    }
}

impl CredentialStore for JsonFileStore {
    fn list_all_records(&self) -> Result<Vec<InstanceRecord>> {
        Ok(self.load()?.records)
    }

    fn active_ids(&self) -> Result<ActiveIds> {
        let file = self.load()?;
        Ok(ActiveIds {
            sonarr: file.active_sonarr_id,
            radarr: file.active_radarr_id,
        })
    }

    fn apply_diff(&mut self, diff: ImportDiff) -> Result<()> {
        let mut file = self.load()?;
        let mut active = ActiveIds {
            sonarr: file.active_sonarr_id.take(),
            radarr: file.active_radarr_id.take(),
        };
        diff.apply_to(&mut file.records, &mut active);
        file.active_sonarr_id = active.sonarr;
        file.active_radarr_id = active.radarr;
        self.save(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::InstanceRole;
    use tempfile::TempDir;

    fn radarr(id: &str, name: &str) -> InstanceRecord {
        InstanceRecord::new(id, InstanceRole::Radarr, name, "http://radarr:7878", "key")
    }

    fn diff_creating(records: Vec<InstanceRecord>, radarr_active: Option<&str>) -> ImportDiff {
        ImportDiff {
            to_create: records,
            to_overwrite: Vec::new(),
            preserved_active_ids: ActiveIds {
                sonarr: None,
                radarr: radarr_active.map(str::to_owned),
            },
        }
    }

    #[test]
    fn test_memory_store_apply() {
        let mut store = MemoryStore::default();
        store
            .apply_diff(diff_creating(vec![radarr("r", "Radarr")], Some("r")))
            .unwrap();
        let records = store.list_all_records().unwrap();
        assert_eq!(records, vec![radarr("r", "Radarr")]);
        assert_eq!(store.active_ids().unwrap().radarr.as_deref(), Some("r"));
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("store.json"));
        assert!(store.list_all_records().unwrap().is_empty());
        assert_eq!(store.active_ids().unwrap(), ActiveIds::default());
    }

    #[test]
    fn test_json_store_persists_updates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");

        let mut store = JsonFileStore::new(&path);
        store
            .apply_diff(diff_creating(vec![radarr("r", "Radarr")], Some("r")))
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        let records = reopened.list_all_records().unwrap();
        assert_eq!(records, vec![radarr("r", "Radarr")]);
        assert_eq!(reopened.active_ids().unwrap().radarr.as_deref(), Some("r"));

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["activeRadarrId"], "r");
        assert_eq!(json["records"][0]["apiKey"], "key");
    }

    #[test]
    fn test_json_store_overwrite_keeps_other_records() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(temp_dir.path().join("store.json"));
        store
            .apply_diff(diff_creating(vec![radarr("r1", "First"), radarr("r2", "Second")], None))
            .unwrap();

        store
            .apply_diff(ImportDiff {
                to_create: Vec::new(),
                to_overwrite: vec![radarr("r2", "Renamed")],
                preserved_active_ids: ActiveIds::default(),
            })
            .unwrap();

        let records = store.list_all_records().unwrap();
        assert_eq!(
            records,
            vec![radarr("r1", "First"), radarr("r2", "Renamed")]
        );
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStore::new(&path).list_all_records().unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreFormat);
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_json_store_rejects_duplicate_ids() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let file = StoreFile {
            records: vec![radarr("r", "One"), radarr("r", "Two")],
            ..StoreFile::default()
        };
        fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

        let err = JsonFileStore::new(&path).list_all_records().unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreFormat);
        assert!(err.message().contains("duplicate record id"));
    }

    #[test]
    #[cfg(unix)]
    fn test_json_store_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        JsonFileStore::new(&path)
            .apply_diff(diff_creating(vec![radarr("r", "Radarr")], None))
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
