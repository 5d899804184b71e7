use clap::{CommandFactory, Parser, Subcommand};
use ferry::backup::config::{UserConfig, EXAMPLE_CONFIG};
use ferry::backup::context::Context;
use ferry::backup::remote::connector::Connector;
use ferry::backup::remote::url::RemoteUrl;
use ferry::backup::restore;
use ferry::backup::result_error::error::Error;
use ferry::backup::result_error::result::Result;
use ferry::backup::state::BackupState;
use ferry::backup::store;
use ferry::backup::uploader;
use ferry::backup::validate::validate_encryption_agreement;
use std::path::PathBuf;
use std::process::exit;
use tracing::error;

/// Backs up directories to remote locations, supporting incremental
/// backups, compression, encryption, backup rolling and custom connectors.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Show the output of external tools as they run
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write an example backup configuration file (use - for stdout)
    NewConfig { file: String },
    /// Create a new remote backup at this url with this config (use - for stdin)
    Create { url: RemoteUrl, config: String },
    /// Update the configuration of an existing remote backup (use - for stdin)
    Update { url: RemoteUrl, config: String },
    /// Delete a remote backup, irreversibly
    Delete { url: RemoteUrl },
    /// Show the remote configuration and the versions available for restore
    List { url: RemoteUrl },
    /// Perform an incremental backup of the given directories
    Backup {
        url: RemoteUrl,
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Restore files at the given version, in place or under [DEST]
    Restore {
        url: RemoteUrl,
        version: String,
        dest: Option<PathBuf>,
    },
    /// Verify backup correctness at the given version
    Verify { url: RemoteUrl, version: String },
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let ctx = match Context::from_env(args.verbose) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    if let Err(e) = run(&ctx, args.command) {
        error!("{e}");
        eprintln!();
        eprintln!("{}", Args::command().render_usage());
        exit(1);
    }
}

fn run(ctx: &Context, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::NewConfig { file } => cmd_new_config(&file),
        Cmd::Create { url, config } => cmd_create(ctx, &url, &config),
        Cmd::Update { url, config } => cmd_update(ctx, &url, &config),
        Cmd::Delete { url } => cmd_delete(ctx, &url),
        Cmd::List { url } => cmd_list(ctx, &url),
        Cmd::Backup { url, dirs } => uploader::perform_backup(ctx, &url, &dirs),
        Cmd::Restore { url, version, dest } => {
            restore::restore(ctx, &url, &version, dest.as_deref(), false)
        }
        Cmd::Verify { url, version } => restore::restore(ctx, &url, &version, None, true),
    }
}

fn cmd_new_config(file: &str) -> Result<()> {
    if file == "-" {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }
    if std::path::Path::new(file).exists() {
        return Err(Error::from(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("file {file:?} already exists, refusing to overwrite"),
        )));
    }
    std::fs::write(file, EXAMPLE_CONFIG)?;
    Ok(())
}

fn cmd_create(ctx: &Context, url: &RemoteUrl, config: &str) -> Result<()> {
    let cfg = UserConfig::read(config)?;
    validate_encryption_agreement(*cfg.use_encryption(), ctx.passphrase().as_ref())?;

    if store::exists(ctx, url)? {
        return Err(Error::from(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("backup already exists at {url}"),
        )));
    }

    let mut state = BackupState::new();
    cfg.apply_to(&mut state);
    store::save(ctx, url, &state)
}

fn cmd_update(ctx: &Context, url: &RemoteUrl, config: &str) -> Result<()> {
    let cfg = UserConfig::read(config)?;
    validate_encryption_agreement(*cfg.use_encryption(), ctx.passphrase().as_ref())?;

    let mut state = store::load(ctx, url)?;
    cfg.apply_to(&mut state);
    store::save(ctx, url, &state)
}

fn cmd_delete(ctx: &Context, url: &RemoteUrl) -> Result<()> {
    Connector::resolve(ctx, url)
        .delete(url.path())
        .run(ctx.verbose())
}

fn cmd_list(ctx: &Context, url: &RemoteUrl) -> Result<()> {
    let state = store::load(ctx, url)?;
    let cfg = UserConfig::from_state(&state);

    println!("Configuration");
    println!();
    print!("{}", serde_yml::to_string(&cfg)?);
    println!();
    println!("Available backup versions");
    println!();
    println!("Version                  \tTimestamp");
    for (version, date) in state.versions() {
        println!("{version}\t{date}");
    }
    Ok(())
}
