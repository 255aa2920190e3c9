//! Instance records and the plaintext backup payload.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Which kind of server an instance record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Sonarr,
    Radarr,
}

/// Connection details for one Sonarr or Radarr server.
///
/// `api_key` and `basic_auth_password` are secrets: they are redacted from
/// `Debug` output and wiped when the record is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: String,
    #[zeroize(skip)]
    pub role: InstanceRole,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub basic_auth_username: Option<String>,
    #[serde(default)]
    pub basic_auth_password: Option<String>,
}

impl InstanceRecord {
    pub fn new(
        id: impl Into<String>,
        role: InstanceRole,
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            basic_auth_username: None,
            basic_auth_password: None,
        }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.basic_auth_username = Some(username.into());
        self.basic_auth_password = Some(password.into());
        self
    }
}

impl fmt::Debug for InstanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRecord")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("basic_auth_username", &self.basic_auth_username)
            .field(
                "basic_auth_password",
                &self.basic_auth_password.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// The instance currently selected for each role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveIds {
    pub sonarr: Option<String>,
    pub radarr: Option<String>,
}

impl ActiveIds {
    pub fn get(&self, role: InstanceRole) -> Option<&str> {
        match role {
            InstanceRole::Sonarr => self.sonarr.as_deref(),
            InstanceRole::Radarr => self.radarr.as_deref(),
        }
    }

    pub fn set(&mut self, role: InstanceRole, id: Option<String>) {
        match role {
            InstanceRole::Sonarr => self.sonarr = id,
            InstanceRole::Radarr => self.radarr = id,
        }
    }
}

/// Plaintext content of a backup. Only ever exists in memory; its serialized
/// form is encrypted before it leaves the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    pub instance_records: Vec<InstanceRecord>,
    #[serde(default)]
    pub active_sonarr_id: Option<String>,
    #[serde(default)]
    pub active_radarr_id: Option<String>,
}

impl BackupPayload {
    pub fn new(records: Vec<InstanceRecord>, active: &ActiveIds) -> Self {
        Self {
            instance_records: records,
            active_sonarr_id: active.sonarr.clone(),
            active_radarr_id: active.radarr.clone(),
        }
    }

    pub fn active_ids(&self) -> ActiveIds {
        ActiveIds {
            sonarr: self.active_sonarr_id.clone(),
            radarr: self.active_radarr_id.clone(),
        }
    }
}

/// Checks that every record has a non-empty id and that no id repeats.
///
/// Returns a description of the first problem found. The description never
/// includes field values.
pub fn check_ids(records: &[InstanceRecord]) -> std::result::Result<(), &'static str> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.id.is_empty() {
            return Err("record with empty id");
        }
        if !seen.insert(record.id.as_str()) {
            return Err("duplicate record id");
        }
    }
    Ok(())
}
