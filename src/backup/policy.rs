//! Full-backup rolling and retention eviction.

use crate::backup::context::Context;
use crate::backup::state::{BackupState, FullBackup};
use chrono::Local;
use tracing::info;

static LINEAGE_TIME_FORMAT: &str = "%Y-%m-%d__%H_%M_%S";

/// Second-resolution local timestamp plus a process-local counter, so full
/// backups started within the same second still get distinct names.
fn new_full_backup_name(ctx: &Context) -> String {
    format!(
        "{}_{}",
        Local::now().format(LINEAGE_TIME_FORMAT),
        ctx.next_unique()
    )
}

/// Ensures an active full backup exists, starting a new one when the active
/// chain has grown past `keep_incremental_backup_count`, then trims the
/// oldest full backups past `keep_full_backup_count`.
///
/// Returns the names of evicted full backups, oldest first. The caller must
/// persist the state before deleting their remote data, so a crash in
/// between leaves an orphaned remote directory rather than a state entry
/// pointing at deleted data.
pub fn rotate(ctx: &Context, state: &mut BackupState) -> Vec<String> {
    let roll = match state.active() {
        None => true,
        Some(active) => {
            active.incremental_backups.len() as u32 > state.keep_incremental_backup_count
        }
    };
    if roll {
        let name = new_full_backup_name(ctx);
        info!("starting new full backup {name}");
        state.full_backups.push(FullBackup {
            name,
            index_version: String::new(),
            incremental_backups: Vec::new(),
        });
    }

    let mut evicted = Vec::new();
    while state.full_backups.len() as u32 > state.keep_full_backup_count {
        evicted.push(state.full_backups.remove(0).name);
    }
    if !evicted.is_empty() {
        info!("evicting {} full backup(s): {:?}", evicted.len(), evicted);
    }
    evicted
}
