//! Explicit per-run context.
//!
//! Everything a command needs — tool locations, scratch space, the
//! passphrase and the lineage disambiguation counter — is constructed once
//! here and threaded through every call.

use crate::backup::redacted::RedactedString;
use crate::backup::remote::url::RemoteUrl;
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::Getters;
use std::cell::Cell;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable holding the encryption passphrase.
pub static KEY_ENV: &str = "FERRY_KEY";
/// Environment variable overriding the tool directory.
pub static TOOL_DIR_ENV: &str = "FERRY_TOOL_DIR";
/// Environment variable overriding the scratch space root.
pub static WORK_DIR_ENV: &str = "FERRY_WORK_DIR";

#[derive(Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct Context {
    /// Directory holding the zpaq binary and one subdirectory per connector.
    #[builder(into)]
    tool_dir: PathBuf,
    /// Root under which per-target scratch directories are derived.
    #[builder(into)]
    work_root: PathBuf,
    passphrase: Option<RedactedString>,
    #[getset(skip)]
    #[builder(default)]
    verbose: bool,
    #[getset(skip)]
    #[builder(default)]
    name_counter: Cell<u64>,
}

impl Context {
    pub fn from_env(verbose: bool) -> Result<Context> {
        let tool_dir = match env::var_os(TOOL_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => env::current_exe()?
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let work_root = env::var_os(WORK_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("ferry"));
        let passphrase = env::var(KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .map(RedactedString::from);

        Ok(Context::builder()
            .tool_dir(tool_dir)
            .work_root(work_root)
            .maybe_passphrase(passphrase)
            .verbose(verbose)
            .build())
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Process-local monotonically increasing value, disambiguating full
    /// backup names started within the same second.
    pub fn next_unique(&self) -> u64 {
        let n = self.name_counter.get();
        self.name_counter.set(n + 1);
        n
    }

    /// Scratch directory for one target, derived deterministically from the
    /// target's identity so distinct targets never collide.
    pub fn workdir(&self, url: &RemoteUrl) -> PathBuf {
        let mapped: String = url
            .to_string()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '.' })
            .collect();
        self.work_root.join(sanitize_filename::sanitize(mapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> Context {
        Context::builder()
            .tool_dir("/opt/ferry")
            .work_root("/tmp/ferry-test")
            .build()
    }

    #[test]
    fn test_unique_counter_increments() {
        let ctx = test_context();
        assert_eq!(ctx.next_unique(), 0);
        assert_eq!(ctx.next_unique(), 1);
        assert_eq!(ctx.next_unique(), 2);
    }

    #[test]
    fn test_workdir_is_deterministic() {
        let ctx = test_context();
        let url = RemoteUrl::parse("s3:bucket/photos").unwrap();
        assert_eq!(ctx.workdir(&url), ctx.workdir(&url));
    }

    #[test]
    fn test_workdir_distinguishes_targets() {
        let ctx = test_context();
        let a = RemoteUrl::parse("s3:bucket/photos").unwrap();
        let b = RemoteUrl::parse("s3:bucket/music").unwrap();
        assert_ne!(ctx.workdir(&a), ctx.workdir(&b));
    }

    #[test]
    fn test_workdir_stays_under_work_root() {
        let ctx = test_context();
        let url = RemoteUrl::parse("local:/../../etc").unwrap();
        assert!(ctx.workdir(&url).starts_with("/tmp/ferry-test"));
    }

    #[test]
    fn test_passphrase_absent_by_default() {
        let ctx = test_context();
        assert!(ctx.passphrase().is_none());
    }
}
