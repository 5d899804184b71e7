use crate::backup::result_error::WithMsg;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),
    #[error("{} {} failed:\n{}", op, target, indent::indent_all_with("  ", diagnostic.clone()))]
    Connector {
        op: &'static str,
        target: String,
        code: Option<i32>,
        diagnostic: String,
    },
    #[error("compression failed:\n{}", indent::indent_all_with("  ", diagnostic.clone()))]
    Compression { diagnostic: String },
    #[error("extraction failed:\n{}", indent::indent_all_with("  ", diagnostic.clone()))]
    Extraction { diagnostic: String },
    #[error("cipher filter failed:\n{}", indent::indent_all_with("  ", diagnostic.clone()))]
    Cipher { diagnostic: String },
    #[error("state is unreadable after decryption, wrong or missing password?")]
    Decryption,
    #[error("no backup found at {target}")]
    NotFound { target: String },
    #[error("full backup {0:?} is not present in the backup state")]
    LineageNotFound(String),
    #[error("invalid version {0:?}, expected <full-backup-name>:<n>")]
    VersionFormat(String),
    #[error("invalid url {0:?}, expected <connector>:<path>")]
    UrlFormat(String),
    #[error("{} failed:\n{}", .0, indent::indent_all_with("  ", .1.clone()))]
    Plumbing(String, String),
    #[error("process supervisor channel closed unexpectedly")]
    ChannelRecv,
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}
