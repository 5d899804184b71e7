//! Scoped named pipes.
//!
//! Some pipeline segments connect two independently started process trees,
//! such as a connector download feeding a decryption filter. Those trees
//! cannot share an in-memory pipe the way a `Sequence` node can, so they
//! meet at a FIFO special file instead. The file is uniquely named and
//! removed when the value goes out of scope.

use crate::backup::result_error::result::Result;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::path::Path;
use tempfile::NamedTempFile;

pub struct Fifo {
    inner: NamedTempFile<()>,
}

impl Fifo {
    pub fn new() -> Result<Fifo> {
        let inner = tempfile::Builder::new()
            .prefix("ferry-pipe-")
            .make(|path| {
                mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(std::io::Error::from)
            })?;
        Ok(Fifo { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

impl std::fmt::Debug for Fifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fifo").field("path", &self.path()).finish()
    }
}
