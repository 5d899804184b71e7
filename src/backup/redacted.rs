//! Secure passphrase handling with redacted debug output.
//!
//! The encryption key reaches the program through the environment and ends
//! up in external tool argument lists, but it must never leak through our
//! own logs or debug formatting.

use derive_more::From;
use std::fmt::{Debug, Formatter};
use validator::Validate;
use zeroize::Zeroize;

/// Placeholder shown instead of the actual passphrase
pub static REDACTED_PASSPHRASE: &str = "###REDACTED_PASSPHRASE###";

/// A passphrase that is redacted in debug output and zeroed on drop.
#[derive(Validate, Clone, Zeroize, From, PartialEq, Eq)]
pub struct RedactedString {
    /// Minimum 8 characters when encryption is enabled
    #[validate(length(min = 8))]
    inner: String,
}

impl RedactedString {
    /// The actual secret, for handing to an external tool.
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        RedactedString {
            inner: value.to_string(),
        }
    }
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_PASSPHRASE)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}
