//! Shared test fixtures.
//!
//! Builds an isolated tool directory containing a `local` connector backed
//! by plain filesystem copies, honoring the exit-44 "object absent"
//! convention, so whole flows run without any real backend.

use crate::backup::context::Context;
use crate::backup::redacted::RedactedString;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

pub(crate) struct TestEnv {
    pub tools: TempDir,
    pub work: TempDir,
    pub remote: TempDir,
    pub ctx: Context,
}

impl TestEnv {
    pub fn target_url(&self) -> String {
        format!("local:{}/target", self.remote.path().display())
    }

    pub fn with_key(&self, key: &str) -> Context {
        Context::builder()
            .tool_dir(self.tools.path())
            .work_root(self.work.path())
            .passphrase(RedactedString::from(key))
            .build()
    }

    pub fn without_key(&self) -> Context {
        Context::builder()
            .tool_dir(self.tools.path())
            .work_root(self.work.path())
            .build()
    }
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub(crate) fn test_env() -> TestEnv {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();

    let connector_dir = tools.path().join("local");
    std::fs::create_dir_all(&connector_dir).unwrap();
    write_script(
        &connector_dir.join("upload"),
        "#!/bin/sh\nmkdir -p \"$(dirname \"$2\")\" || exit 1\ncat \"$1\" > \"$2\"\n",
    );
    write_script(
        &connector_dir.join("download"),
        "#!/bin/sh\n[ -f \"$1\" ] || { echo \"object not found: $1\" >&2; exit 44; }\ncat \"$1\" > \"$2\"\n",
    );
    write_script(&connector_dir.join("delete"), "#!/bin/sh\nexec rm -rf \"$1\"\n");

    let ctx = Context::builder()
        .tool_dir(tools.path())
        .work_root(work.path())
        .build();

    TestEnv {
        tools,
        work,
        remote,
        ctx,
    }
}

pub(crate) fn test_env_with_key(key: &str) -> TestEnv {
    let mut env = test_env();
    env.ctx = env.with_key(key);
    env
}

/// Whether an external tool the test depends on is installed.
pub(crate) fn have_tool(tool: &str) -> bool {
    Command::new(tool)
        .arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
