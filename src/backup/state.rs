//! Durable per-target backup state.
//!
//! The only authoritative copy of this structure lives at the remote target
//! as a single YAML object; between runs there is nothing local but scratch
//! space. Full backups are kept oldest first, the last entry being the one
//! that accepts further incremental backups.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// File masks applied by the compressor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterRules {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include_only: Vec<String>,
}

/// One full backup and its chain of incremental backups.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FullBackup {
    pub name: String,
    /// Token of the currently valid remote copy of the index artifact;
    /// empty until the first incremental backup commits.
    #[serde(default)]
    pub index_version: String,
    /// Completion timestamp of each incremental backup, in order.
    #[serde(default)]
    pub incremental_backups: Vec<String>,
}

/// Transient record of an interrupted upload.
///
/// `files_left` and `files_uploaded` are disjoint and together cover
/// exactly the data files produced by the most recent compression pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadProgress {
    #[serde(default)]
    pub files_left: Vec<String>,
    #[serde(default)]
    pub files_uploaded: Vec<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupState {
    pub local: FilterRules,
    pub keep_incremental_backup_count: u32,
    pub keep_full_backup_count: u32,
    pub use_encryption: bool,
    pub last_backup_timestamp: i64,
    pub full_backups: Vec<FullBackup>,
    pub upload: Option<UploadProgress>,
}

impl Default for BackupState {
    fn default() -> Self {
        BackupState {
            local: FilterRules::default(),
            keep_incremental_backup_count: 10,
            keep_full_backup_count: 3,
            use_encryption: false,
            last_backup_timestamp: 0,
            full_backups: Vec::new(),
            upload: None,
        }
    }
}

impl BackupState {
    pub fn new() -> BackupState {
        BackupState::default()
    }

    /// The full backup currently accepting incremental backups.
    pub fn active(&self) -> Option<&FullBackup> {
        self.full_backups.last()
    }

    pub fn active_mut(&mut self) -> Option<&mut FullBackup> {
        self.full_backups.last_mut()
    }

    pub fn lineage(&self, name: &str) -> Option<&FullBackup> {
        self.full_backups.iter().find(|fb| fb.name == name)
    }

    /// Every restorable `(version, timestamp)` pair, oldest first.
    pub fn versions(&self) -> Vec<(String, String)> {
        self.full_backups
            .iter()
            .flat_map(|fb| {
                fb.incremental_backups
                    .iter()
                    .enumerate()
                    .map(move |(i, date)| (format!("{}:{}", fb.name, i + 1), date.clone()))
            })
            .collect()
    }
}
