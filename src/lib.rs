//! arrvault - Password-protected backups of Sonarr/Radarr instance credentials
//!
//! Backups are sealed with AES-256-GCM under a key derived from the user's
//! password with PBKDF2-HMAC-SHA256. Version 1 backups (AES-256-CBC) can be
//! read when explicitly enabled.

#![forbid(unsafe_code)]

pub mod backup;
pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod offload;
pub mod passphrase;
pub mod record;
pub mod store;
pub mod varmor;

pub use backup::{BackupEngine, ImportDiff, export_backup, import_backup};
pub use config::BackupConfig;
pub use error::{BackupError, ErrorCategory, ErrorKind, Result, Stage};
pub use record::{ActiveIds, BackupPayload, InstanceRecord, InstanceRole};
pub use store::{CredentialStore, JsonFileStore, MemoryStore};
