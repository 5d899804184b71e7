//! Restoring and verifying backed up versions.
//!
//! A version string `<full-backup-name>:<n>` addresses the tree as of the
//! n-th incremental backup of that full backup. The index artifact and the
//! first n data artifacts are fetched, then the external extraction tool
//! reconstructs the files, in place or under an alternate target directory.

use crate::backup::context::Context;
use crate::backup::function_path;
use crate::backup::pipeline::{ErrorLabel, PipelineSpec};
use crate::backup::remote::connector::Connector;
use crate::backup::remote::url::RemoteUrl;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::store;
use crate::backup::uploader::{remote_index, remote_lineage, volume_name, INDEX_FILE};
use function_name::named;
use std::ffi::OsString;
use std::path::Path;
use tracing::info;

pub fn parse_version(version: &str) -> Result<(&str, u32)> {
    let Some((name, n)) = version.split_once(':') else {
        return Err(Error::VersionFormat(version.to_string()));
    };
    let n: u32 = n
        .parse()
        .map_err(|_| Error::VersionFormat(version.to_string()))?;
    if name.is_empty() || n == 0 {
        return Err(Error::VersionFormat(version.to_string()));
    }
    Ok((name, n))
}

/// Restores `version` of the target, in place when `dest` is `None`.
/// With `verify`, the extraction tool only checks integrity and writes
/// nothing.
#[named]
pub fn restore(
    ctx: &Context,
    url: &RemoteUrl,
    version: &str,
    dest: Option<&Path>,
    verify: bool,
) -> Result<()> {
    let state = store::load(ctx, url).with_msg(function_path!())?;
    let (name, n) = parse_version(version)?;
    let lineage = state
        .lineage(name)
        .ok_or_else(|| Error::LineageNotFound(name.to_string()))?;
    if n as usize > lineage.incremental_backups.len() {
        return Err(Error::VersionFormat(version.to_string()));
    }

    let connector = Connector::resolve(ctx, url);
    let lineage_remote = remote_lineage(url, &lineage.name);
    let dir = ctx.workdir(url).join("restore");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir)?;

    info!("fetching {} artifact(s) of {version} from {url}", n + 1);
    connector
        .download(
            &remote_index(url, &lineage.name, &lineage.index_version),
            &dir.join(INDEX_FILE),
        )
        .run(ctx.verbose())?;
    for i in 1..=n {
        let volume = volume_name(i);
        connector
            .download(&format!("{lineage_remote}/{volume}"), &dir.join(&volume))
            .run(ctx.verbose())?;
    }

    let mut argv: Vec<OsString> = vec![
        ctx.tool_dir().join("zpaq").into(),
        "extract".into(),
        dir.join("a?????.zpaq").into(),
        "-until".into(),
        n.to_string().into(),
        "-force".into(),
    ];
    if verify {
        argv.push("-test".into());
    }
    if let Some(to) = dest {
        argv.push("-to".into());
        argv.push(to.as_os_str().into());
    }
    if let Some(passphrase) = ctx.passphrase() {
        argv.push("-key".into());
        argv.push(passphrase.expose().into());
    }

    PipelineSpec::command(argv, ErrorLabel::Extraction).run(ctx.verbose())
}
