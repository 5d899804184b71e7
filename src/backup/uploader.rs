//! The backup operation: compression, resumable upload, commit.
//!
//! Progress is persisted remotely after every single file transfer, so a
//! crash at any point leaves the state at a resumable cut. The index
//! artifact is never overwritten in place; a new version is uploaded, the
//! state repointed, and only then is the old version reclaimed.

use crate::backup::context::Context;
use crate::backup::function_path;
use crate::backup::pipeline::{ErrorLabel, PipelineSpec};
use crate::backup::policy;
use crate::backup::remote::connector::Connector;
use crate::backup::remote::url::RemoteUrl;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::state::{BackupState, UploadProgress};
use crate::backup::store;
use chrono::{Local, Utc};
use function_name::named;
use itertools::Itertools;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Local and base remote name of the compressor's index artifact.
pub static INDEX_FILE: &str = "a00000.zpaq";

static BACKUP_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Name of the n-th incremental data artifact.
pub fn volume_name(n: u32) -> String {
    format!("a{:05}.zpaq", n)
}

/// Remote directory of one full backup below the target.
pub fn remote_lineage(url: &RemoteUrl, name: &str) -> String {
    format!("{}/{}", url.path(), name)
}

/// Remote name of one version of a full backup's index artifact.
pub fn remote_index(url: &RemoteUrl, lineage: &str, version: &str) -> String {
    format!("{}/{}.{}", remote_lineage(url, lineage), INDEX_FILE, version)
}

/// A prior upload can be continued only if the durable record and every
/// local file it mentions survived, the index artifact included. Anything
/// less and the whole pass restarts from fresh compression.
fn upload_in_progress(state: &BackupState, dir: &Path) -> bool {
    let Some(upload) = &state.upload else {
        return false;
    };
    !upload.files_left.is_empty()
        && dir.is_dir()
        && dir.join(INDEX_FILE).is_file()
        && upload
            .files_left
            .iter()
            .chain(upload.files_uploaded.iter())
            .all(|f| dir.join(f).is_file())
}

fn clean_dir(dir: &Path) -> Result<()> {
    let _ = std::fs::remove_dir_all(dir);
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Runs the external compressor over `dirs`, producing numbered data
/// artifacts and an updated index artifact in `dir`.
fn compress(ctx: &Context, state: &BackupState, dirs: &[PathBuf], dir: &Path) -> Result<()> {
    let mut argv: Vec<OsString> = vec![
        ctx.tool_dir().join("zpaq").into(),
        "add".into(),
        dir.join("a?????").into(),
    ];
    argv.extend(dirs.iter().map(|d| d.as_os_str().to_os_string()));
    for pattern in &state.local.exclude {
        argv.push("-not".into());
        argv.push(pattern.into());
    }
    for pattern in &state.local.include_only {
        argv.push("-only".into());
        argv.push(pattern.into());
    }
    if let Some(passphrase) = ctx.passphrase() {
        argv.push("-key".into());
        argv.push(passphrase.expose().into());
    }
    argv.push("-index".into());
    argv.push(dir.join(INDEX_FILE).into());

    PipelineSpec::command(argv, ErrorLabel::Compression).run(ctx.verbose())
}

/// Data artifacts of the last compression pass, index excluded.
fn data_files(dir: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name != INDEX_FILE)
        .sorted_unstable()
        .collect_vec())
}

/// Uploads everything in `files_left`, persisting the state after each
/// file so a crash after file k leaves exactly k files confirmed.
fn upload_pending(
    ctx: &Context,
    url: &RemoteUrl,
    state: &mut BackupState,
    dir: &Path,
    lineage_remote: &str,
) -> Result<()> {
    let connector = Connector::resolve(ctx, url);
    let pending = state
        .upload
        .as_ref()
        .map(|up| up.files_left.clone())
        .unwrap_or_default();

    for file in pending {
        connector
            .upload(&dir.join(&file), &format!("{lineage_remote}/{file}"))
            .run(ctx.verbose())?;
        if let Some(upload) = state.upload.as_mut() {
            upload.files_left.retain(|f| f != &file);
            upload.files_uploaded.push(file);
        }
        store::save(ctx, url, state)?;
    }
    Ok(())
}

#[named]
pub fn perform_backup(ctx: &Context, url: &RemoteUrl, dirs: &[PathBuf]) -> Result<()> {
    for dir in dirs {
        if !dir.is_dir() {
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup directory {:?} does not exist", dir),
            )));
        }
    }

    let mut state = store::load(ctx, url).with_msg(function_path!())?;
    let connector = Connector::resolve(ctx, url);

    let evicted = policy::rotate(ctx, &mut state);
    store::save(ctx, url, &state)?;
    for name in evicted {
        // reclaiming space must never abort an otherwise healthy backup
        if let Err(e) = connector.delete(&remote_lineage(url, &name)).run(ctx.verbose()) {
            warn!("failed to reclaim evicted full backup {name}: {e}");
        }
    }

    let lineage_name = state
        .active()
        .map(|fb| fb.name.clone())
        .expect("rotation always leaves an active full backup");
    let lineage_remote = remote_lineage(url, &lineage_name);
    let dir = ctx.workdir(url);

    if upload_in_progress(&state, &dir) {
        let left = state.upload.as_ref().map(|up| up.files_left.len()).unwrap_or(0);
        info!("resuming interrupted upload of {url}, {left} file(s) left");
    } else {
        clean_dir(&dir)?;
        let index_version = state
            .active()
            .map(|fb| fb.index_version.clone())
            .unwrap_or_default();
        if index_version.is_empty() {
            info!("starting full backup of {url}");
        } else {
            info!("starting incremental backup of {url}");
            connector
                .download(
                    &remote_index(url, &lineage_name, &index_version),
                    &dir.join(INDEX_FILE),
                )
                .run(ctx.verbose())?;
        }

        compress(ctx, &state, dirs, &dir)?;
        let files = data_files(&dir)?;
        info!("compressed into {} data file(s)", files.len());
        state.upload = Some(UploadProgress {
            files_left: files,
            files_uploaded: Vec::new(),
        });
    }
    store::save(ctx, url, &state)?;

    upload_pending(ctx, url, &mut state, &dir, &lineage_remote)?;

    // write-new, repoint, delete-old: the state always references an index
    // object that exists
    let old_version = state
        .active()
        .map(|fb| fb.index_version.clone())
        .unwrap_or_default();
    let new_version = Utc::now().timestamp_micros().to_string();
    connector
        .upload(
            &dir.join(INDEX_FILE),
            &remote_index(url, &lineage_name, &new_version),
        )
        .run(ctx.verbose())?;

    if let Some(active) = state.active_mut() {
        active.index_version = new_version;
        active
            .incremental_backups
            .push(Local::now().format(BACKUP_TIME_FORMAT).to_string());
    }
    state.last_backup_timestamp = Utc::now().timestamp();
    state.upload = None;
    store::save(ctx, url, &state)?;

    if !old_version.is_empty() {
        if let Err(e) = connector
            .delete(&remote_index(url, &lineage_name, &old_version))
            .run(ctx.verbose())
        {
            warn!("failed to reclaim superseded index version {old_version}: {e}");
        }
    }

    let _ = std::fs::remove_dir_all(&dir);
    info!("backup of {url} completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::testutil::test_env;

    #[test]
    fn test_volume_names_are_zero_padded() {
        assert_eq!(volume_name(1), "a00001.zpaq");
        assert_eq!(volume_name(123), "a00123.zpaq");
        assert_eq!(volume_name(99999), "a99999.zpaq");
    }

    #[test]
    fn test_remote_artifact_naming() {
        let url = RemoteUrl::parse("local:/mnt/backups").unwrap();
        assert_eq!(remote_lineage(&url, "fb1"), "/mnt/backups/fb1");
        assert_eq!(
            remote_index(&url, "fb1", "17000"),
            "/mnt/backups/fb1/a00000.zpaq.17000"
        );
    }

    #[test]
    fn test_data_files_excludes_index_and_sorts() {
        let env = test_env();
        let dir = env.work.path().join("scan");
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["a00002.zpaq", INDEX_FILE, "a00001.zpaq"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let files = data_files(&dir).unwrap();
        assert_eq!(files, vec!["a00001.zpaq", "a00002.zpaq"]);
    }

    fn state_with_upload(left: &[&str], uploaded: &[&str]) -> BackupState {
        let mut state = BackupState::new();
        state.upload = Some(UploadProgress {
            files_left: left.iter().map(|s| s.to_string()).collect(),
            files_uploaded: uploaded.iter().map(|s| s.to_string()).collect(),
        });
        state
    }

    #[test]
    fn test_resume_detection_requires_every_condition() {
        let env = test_env();
        let dir = env.work.path().join("target-dir");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(INDEX_FILE), b"i").unwrap();
        std::fs::write(dir.join("a00001.zpaq"), b"1").unwrap();
        std::fs::write(dir.join("a00002.zpaq"), b"2").unwrap();

        let state = state_with_upload(&["a00002.zpaq"], &["a00001.zpaq"]);
        assert!(upload_in_progress(&state, &dir));

        // no record at all
        assert!(!upload_in_progress(&BackupState::new(), &dir));

        // nothing left to upload
        let drained = state_with_upload(&[], &["a00001.zpaq", "a00002.zpaq"]);
        assert!(!upload_in_progress(&drained, &dir));

        // a mentioned file disappeared
        let missing = state_with_upload(&["a00002.zpaq", "a00003.zpaq"], &["a00001.zpaq"]);
        assert!(!upload_in_progress(&missing, &dir));

        // the working directory disappeared
        assert!(!upload_in_progress(&state, &env.work.path().join("gone")));

        // the cached index artifact disappeared
        std::fs::remove_file(dir.join(INDEX_FILE)).unwrap();
        assert!(!upload_in_progress(&state, &dir));
    }

    #[test]
    fn test_upload_pending_confirms_files_one_by_one() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let dir = env.work.path().join("stage");
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["a00001.zpaq", "a00002.zpaq", "a00003.zpaq"] {
            std::fs::write(dir.join(name), name.as_bytes()).unwrap();
        }

        let mut state = state_with_upload(
            &["a00001.zpaq", "a00002.zpaq", "a00003.zpaq"],
            &[],
        );
        let lineage_remote = remote_lineage(&url, "fb1");
        upload_pending(&env.ctx, &url, &mut state, &dir, &lineage_remote).unwrap();

        let upload = state.upload.unwrap();
        assert!(upload.files_left.is_empty());
        assert_eq!(
            upload.files_uploaded,
            vec!["a00001.zpaq", "a00002.zpaq", "a00003.zpaq"]
        );
        for name in ["a00001.zpaq", "a00002.zpaq", "a00003.zpaq"] {
            let remote = std::path::Path::new(url.path()).join("fb1").join(name);
            assert_eq!(std::fs::read(remote).unwrap(), name.as_bytes());
        }

        // the durable copy reflects the completed transfer
        let persisted = store::load(&env.ctx, &url).unwrap();
        assert!(persisted.upload.unwrap().files_left.is_empty());
    }

    #[test]
    fn test_resumed_upload_skips_already_confirmed_files() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let dir = env.work.path().join("stage");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a00001.zpaq"), b"local-1").unwrap();
        std::fs::write(dir.join("a00002.zpaq"), b"local-2").unwrap();

        // file 1 was confirmed before the crash; its remote copy must not
        // be touched again
        let lineage_remote = remote_lineage(&url, "fb1");
        let remote_dir = std::path::Path::new(url.path()).join("fb1");
        std::fs::create_dir_all(&remote_dir).unwrap();
        std::fs::write(remote_dir.join("a00001.zpaq"), b"uploaded-before-crash").unwrap();

        let mut state = state_with_upload(&["a00002.zpaq"], &["a00001.zpaq"]);
        upload_pending(&env.ctx, &url, &mut state, &dir, &lineage_remote).unwrap();

        assert_eq!(
            std::fs::read(remote_dir.join("a00001.zpaq")).unwrap(),
            b"uploaded-before-crash"
        );
        assert_eq!(std::fs::read(remote_dir.join("a00002.zpaq")).unwrap(), b"local-2");
        let upload = state.upload.unwrap();
        assert!(upload.files_left.is_empty());
        assert_eq!(upload.files_uploaded, vec!["a00001.zpaq", "a00002.zpaq"]);
    }

    #[test]
    fn test_failed_upload_keeps_state_at_a_resumable_cut() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let dir = env.work.path().join("stage");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a00001.zpaq"), b"1").unwrap();
        // a00002.zpaq is deliberately missing, so its upload fails

        let mut state = state_with_upload(&["a00001.zpaq", "a00002.zpaq"], &[]);
        let lineage_remote = remote_lineage(&url, "fb1");
        let res = upload_pending(&env.ctx, &url, &mut state, &dir, &lineage_remote);
        assert!(res.is_err());

        let upload = state.upload.unwrap();
        assert_eq!(upload.files_uploaded, vec!["a00001.zpaq"]);
        assert_eq!(upload.files_left, vec!["a00002.zpaq"]);
    }
}
