//! Validation functions for configuration values.

use crate::backup::context::KEY_ENV;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use globset::Glob;
use validator::{Validate, ValidationError, ValidationErrors};

pub fn validate_glob_patterns(patterns: &Vec<String>) -> std::result::Result<(), ValidationError> {
    for pattern in patterns {
        if let Err(e) = Glob::new(pattern) {
            return Err(ValidationError::new("InvalidPattern")
                .with_message(format!("invalid file mask {pattern:?}: {e}").into()));
        }
    }

    Ok(())
}

fn single(field: &'static str, error: ValidationError) -> Error {
    let mut errors = ValidationErrors::new();
    errors.add(field.into(), error);
    Error::Validation(errors)
}

/// The `use_encryption` flag must agree with passphrase presence, otherwise
/// a target could be created unreadable or silently unencrypted.
pub fn validate_encryption_agreement(
    use_encryption: bool,
    passphrase: Option<&RedactedString>,
) -> Result<()> {
    match (use_encryption, passphrase) {
        (true, None) => Err(single(
            "use_encryption",
            ValidationError::new("MissingKey").with_message(
                format!("encryption is enabled in config but no key is set in the {KEY_ENV} environment variable").into(),
            ),
        )),
        (false, Some(_)) => Err(single(
            "use_encryption",
            ValidationError::new("UnexpectedKey").with_message(
                format!("a key is set in the {KEY_ENV} environment variable but encryption is disabled in config").into(),
            ),
        )),
        (true, Some(passphrase)) => passphrase.validate().map_err(Error::from),
        (false, None) => Ok(()),
    }
}
