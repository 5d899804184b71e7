//! User-facing backup configuration.
//!
//! What `new-config` emits and `create`/`update` consume. The settings are
//! copied into the remote [`BackupState`] rather than kept in a local file,
//! so a target carries its own configuration wherever it is read from.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::state::BackupState;
use crate::backup::validate::validate_glob_patterns;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::File;
use validator::Validate;

pub static EXAMPLE_CONFIG: &str = r#"# This is a ferry backup configuration file
# Pass it to 'ferry create' or 'ferry update'

# Masks of files to exclude
# Example: ["*.tmp", "*/junk/*"]
exclude: []

# Masks of files to include, skipping everything else
# Example: ["*.jpg"]
include_only: []

# How many incremental backups to keep within a single full backup
# When this limit is reached, a new full backup is started
keep_incremental_backup_count: 30

# How many full backups to keep
# When this limit is reached, the oldest full backup is deleted
keep_full_backup_count: 3

# Encrypt backups if true
# The key must be provided via the FERRY_KEY environment variable
use_encryption: false
"#;

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct UserConfig {
    #[serde(default)]
    #[builder(default)]
    #[validate(custom(function = validate_glob_patterns))]
    exclude: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    #[validate(custom(function = validate_glob_patterns))]
    include_only: Vec<String>,
    #[validate(range(min = 1))]
    keep_incremental_backup_count: u32,
    #[validate(range(min = 1))]
    keep_full_backup_count: u32,
    use_encryption: bool,
}

impl UserConfig {
    /// Reads and validates a configuration from a file path, or from stdin
    /// when `source` is `-`.
    pub fn read(source: &str) -> Result<UserConfig> {
        let cfg: UserConfig = if source == "-" {
            serde_yml::from_reader(std::io::stdin())
                .map_err(Error::from)
                .with_msg("parsing configuration from stdin failed")?
        } else {
            let file = File::open(source)
                .map_err(Error::from)
                .with_msg(format!("cannot open configuration file {source:?}"))?;
            serde_yml::from_reader(file)
                .map_err(Error::from)
                .with_msg(format!("parsing configuration file {source:?} failed"))?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_to(&self, state: &mut BackupState) {
        state.local.exclude = self.exclude.clone();
        state.local.include_only = self.include_only.clone();
        state.keep_incremental_backup_count = self.keep_incremental_backup_count;
        state.keep_full_backup_count = self.keep_full_backup_count;
        state.use_encryption = self.use_encryption;
    }

    pub fn from_state(state: &BackupState) -> UserConfig {
        UserConfig::builder()
            .exclude(state.local.exclude.clone())
            .include_only(state.local.include_only.clone())
            .keep_incremental_backup_count(state.keep_incremental_backup_count)
            .keep_full_backup_count(state.keep_full_backup_count)
            .use_encryption(state.use_encryption)
            .build()
    }
}
