//! # ferry
//!
//! Incremental, encrypted backups of directory trees to pluggable remote
//! backends.
//!
//! ## Features
//!
//! - **Incremental Backups**: full-backup rolling with configurable retention
//! - **Pluggable Backends**: any storage reachable through a three-command
//!   connector (`upload`, `download`, `delete`)
//! - **Encryption**: state and archives sealed with an external symmetric
//!   cipher tool, key supplied via environment
//! - **Crash Safety**: per-file upload progress is persisted remotely, so an
//!   interrupted backup resumes instead of restarting
//! - **Process Pipelines**: external tools are composed with pipes and
//!   parallel branches under a single failure protocol
//!
//! ## Quick Start
//!
//! ```no_run
//! use ferry::backup::context::Context;
//! use ferry::backup::remote::url::RemoteUrl;
//! use ferry::backup::uploader;
//!
//! let ctx = Context::from_env(false)?;
//! let url = RemoteUrl::parse("local:/mnt/backups/photos")?;
//! uploader::perform_backup(&ctx, &url, &["/home/me/photos".into()])?;
//! # Ok::<(), ferry::backup::result_error::error::Error>(())
//! ```

pub mod backup;
