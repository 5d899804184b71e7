//! Pipeline leaves for the three-command connector contract.
//!
//! A backend is a directory named after the connector, holding `upload`,
//! `download` and `delete` executables. Each must exit zero on success and
//! write diagnostics to stderr on failure. `download` exits with
//! [`EXIT_ABSENT`] when the requested object does not exist, which is the
//! only way the core distinguishes "absent" from other backend failures.

use crate::backup::context::Context;
use crate::backup::pipeline::{ErrorLabel, PipelineSpec};
use crate::backup::remote::url::RemoteUrl;
use crate::backup::result_error::error::Error;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Exit code a connector's `download` uses to report a missing object.
pub static EXIT_ABSENT: i32 = 44;

#[derive(Clone, Debug)]
pub struct Connector {
    dir: PathBuf,
}

impl Connector {
    pub fn resolve(ctx: &Context, url: &RemoteUrl) -> Connector {
        Connector {
            dir: ctx.tool_dir().join(url.connector()),
        }
    }

    fn bin(&self, op: &str) -> OsString {
        self.dir.join(op).into_os_string()
    }

    pub fn upload(&self, local: &Path, remote: &str) -> PipelineSpec {
        PipelineSpec::command(
            [self.bin("upload"), local.as_os_str().into(), remote.into()],
            ErrorLabel::Connector {
                op: "upload",
                target: remote.to_string(),
            },
        )
    }

    pub fn download(&self, remote: &str, local: &Path) -> PipelineSpec {
        PipelineSpec::command(
            [self.bin("download"), remote.into(), local.as_os_str().into()],
            ErrorLabel::Connector {
                op: "download",
                target: remote.to_string(),
            },
        )
    }

    pub fn delete(&self, remote: &str) -> PipelineSpec {
        PipelineSpec::command(
            [self.bin("delete"), remote.into()],
            ErrorLabel::Connector {
                op: "delete",
                target: remote.to_string(),
            },
        )
    }

    /// Whether `err` is a download reporting the object as absent.
    pub fn is_absent(err: &Error) -> bool {
        matches!(
            err,
            Error::Connector {
                op: "download",
                code: Some(code),
                ..
            } if *code == EXIT_ABSENT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::testutil::test_env;

    #[test]
    fn test_ops_resolve_to_connector_dir() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let connector = Connector::resolve(&env.ctx, &url);

        let spec = connector.upload(Path::new("/tmp/a"), "remote/a");
        let leaves = spec.leaves();
        let program = leaves[0].argv()[0].to_string_lossy().to_string();
        assert!(program.ends_with("local/upload"));
    }

    #[test]
    fn test_download_of_missing_object_reports_exit_absent() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let connector = Connector::resolve(&env.ctx, &url);

        let missing = format!("{}/no-such-object", url.path());
        let err = connector
            .download(&missing, Path::new("/dev/null"))
            .run(false)
            .unwrap_err();
        assert!(Connector::is_absent(&err));
    }

    #[test]
    fn test_upload_then_download_round_trip() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let connector = Connector::resolve(&env.ctx, &url);

        let src = env.work.path().join("payload");
        std::fs::write(&src, b"round trip").unwrap();
        let remote = url.object("payload");
        connector.upload(&src, &remote).run(false).unwrap();

        let dst = env.work.path().join("payload-back");
        connector.download(&remote, &dst).run(false).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"round trip");
    }

    #[test]
    fn test_delete_removes_subtree() {
        let env = test_env();
        let url = RemoteUrl::parse(&env.target_url()).unwrap();
        let connector = Connector::resolve(&env.ctx, &url);

        let src = env.work.path().join("payload");
        std::fs::write(&src, b"x").unwrap();
        let remote = url.object("sub/payload");
        connector.upload(&src, &remote).run(false).unwrap();

        connector.delete(&url.object("sub")).run(false).unwrap();
        let err = connector
            .download(&remote, Path::new("/dev/null"))
            .run(false)
            .unwrap_err();
        assert!(Connector::is_absent(&err));
    }

    #[test]
    fn test_is_absent_requires_download_op() {
        let err = Error::Connector {
            op: "delete",
            target: "x".to_string(),
            code: Some(EXIT_ABSENT),
            diagnostic: String::new(),
        };
        assert!(!Connector::is_absent(&err));
    }
}
