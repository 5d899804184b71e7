//! Remote state store.
//!
//! One YAML object per target, stored under a well-known name, moved
//! through the pipeline engine. Connectors only transfer files, so the
//! serialized bytes meet the connector process at a scoped FIFO while an
//! optional cipher filter runs on our side of it.

use crate::backup::context::Context;
use crate::backup::pipeline::fifo::Fifo;
use crate::backup::pipeline::{ErrorLabel, PipelineSpec};
use crate::backup::redacted::RedactedString;
use crate::backup::remote::connector::Connector;
use crate::backup::remote::url::RemoteUrl;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::state::BackupState;
use std::ffi::OsString;
use std::path::Path;
use tracing::debug;

/// Well-known name of the state object below every target.
pub static STATE_OBJECT: &str = "index.yaml";

/// Fixed contract of the external symmetric cipher tool.
static CIPHER_ARGS: &[&str] = &["aes-256-cbc", "-a", "-md", "sha256", "-pbkdf2"];

fn cipher_filter(passphrase: &RedactedString, decrypt: bool) -> PipelineSpec {
    let mut argv: Vec<OsString> = vec!["openssl".into()];
    argv.extend(CIPHER_ARGS.iter().map(OsString::from));
    if decrypt {
        argv.push("-d".into());
    }
    argv.push("-k".into());
    argv.push(passphrase.expose().into());
    PipelineSpec::command(argv, ErrorLabel::Cipher)
}

pub fn load(ctx: &Context, url: &RemoteUrl) -> Result<BackupState> {
    let connector = Connector::resolve(ctx, url);
    let fifo = Fifo::new()?;
    let download = connector.download(&url.object(STATE_OBJECT), fifo.path());
    let reader = PipelineSpec::file_source(fifo.path());
    let spec = match ctx.passphrase() {
        Some(passphrase) => download.par(reader.pipe(cipher_filter(passphrase, true))),
        None => download.par(reader),
    };

    let bytes = match spec.run_capture(ctx.verbose()) {
        Ok(bytes) => bytes,
        Err(e) if Connector::is_absent(&e) => {
            return Err(Error::NotFound {
                target: url.to_string(),
            })
        }
        Err(Error::Cipher { .. }) => return Err(Error::Decryption),
        Err(e) => return Err(e),
    };

    match serde_yml::from_slice::<BackupState>(&bytes) {
        Ok(state) => {
            debug!("loaded state of {url}: {} full backup(s)", state.full_backups.len());
            Ok(state)
        }
        // bytes that do not parse into a state object mean the password was
        // wrong or missing, as an encrypted envelope reads as a YAML scalar
        Err(_) => Err(Error::Decryption),
    }
}

pub fn save(ctx: &Context, url: &RemoteUrl, state: &BackupState) -> Result<()> {
    let yaml = serde_yml::to_string(state)?;
    let connector = Connector::resolve(ctx, url);
    let fifo = Fifo::new()?;

    let source = PipelineSpec::byte_source(yaml.into_bytes());
    let head = match ctx.passphrase() {
        Some(passphrase) => source.pipe(cipher_filter(passphrase, false)),
        None => source,
    };

    head.pipe(PipelineSpec::file_sink(fifo.path()))
        .par(connector.upload(fifo.path(), &url.object(STATE_OBJECT)))
        .run(ctx.verbose())
}

/// Whether a state object already exists at the target.
pub fn exists(ctx: &Context, url: &RemoteUrl) -> Result<bool> {
    let connector = Connector::resolve(ctx, url);
    match connector
        .download(&url.object(STATE_OBJECT), Path::new("/dev/null"))
        .run(ctx.verbose())
    {
        Ok(()) => Ok(true),
        Err(e) if Connector::is_absent(&e) => Ok(false),
        Err(e) => Err(e),
    }
}
