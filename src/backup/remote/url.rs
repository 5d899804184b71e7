//! Backup target addresses.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use derive_more::Display;
use getset::Getters;
use std::str::FromStr;

/// A `<connector>:<path>` target address.
///
/// The connector part names a subdirectory of the tool directory holding the
/// backend's `upload`, `download` and `delete` executables; the path part is
/// opaque to the core and handed to those executables verbatim.
#[derive(Clone, Debug, Display, PartialEq, Eq, Getters)]
#[display("{connector}:{path}")]
#[getset(get = "pub")]
pub struct RemoteUrl {
    connector: String,
    path: String,
}

impl RemoteUrl {
    pub fn parse(raw: &str) -> Result<RemoteUrl> {
        let Some((connector, path)) = raw.split_once(':') else {
            return Err(Error::UrlFormat(raw.to_string()));
        };
        if connector.is_empty() {
            return Err(Error::UrlFormat(raw.to_string()));
        }
        Ok(RemoteUrl {
            connector: connector.to_string(),
            path: path.trim_end_matches('/').to_string(),
        })
    }

    /// Remote path of an object directly below this target.
    pub fn object(&self, name: &str) -> String {
        format!("{}/{}", self.path, name)
    }
}

impl FromStr for RemoteUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<RemoteUrl> {
        RemoteUrl::parse(s)
    }
}
