//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Error taxonomy shared by the issuer, validator, and entitlement service.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entitlement::VerifiedLicense;

/// Every rule a rejected [`crate::model::LicenseRequest`] violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    /// Wrap a list of violated rules.
    #[must_use]
    pub fn new(violations: Vec<String>) -> Self {
        Self(violations)
    }

    /// Violated rules in the order they were checked.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

/// Which integrity check a tampered license failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TamperKind {
    /// Signature is not valid base64 or has the wrong length.
    MalformedSignature,
    /// Signature does not verify against the embedded public key.
    Signature,
    /// Record checksum does not match the stored value.
    Checksum,
}

impl fmt::Display for TamperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TamperKind::MalformedSignature => write!(f, "malformed signature"),
            TamperKind::Signature => write!(f, "signature mismatch"),
            TamperKind::Checksum => write!(f, "checksum mismatch"),
        }
    }
}

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Issuance request broke one or more rules.
    #[error("license request rejected: {0}")]
    Validation(ValidationErrors),

    /// License file could not be parsed as a structured record.
    #[error("license file is not a readable license document: {0}")]
    Format(String),

    /// Well-formed document with a missing or invalid field.
    #[error("license field `{field}` is {reason}")]
    Schema {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Integrity check failed; the license must not be trusted at all.
    #[error("license integrity check failed: {0}")]
    Tamper(TamperKind),

    /// Authentic license past its expiry. The verified record is kept so the
    /// caller can display it.
    #[error("license expired on {expired_at}")]
    Expired {
        /// Expiry timestamp of the license.
        expired_at: DateTime<Utc>,
        /// The authentic, expired license.
        license: Box<VerifiedLicense>,
    },

    /// Signing or verifying key problem.
    #[error("signing key error: {0}")]
    Key(String),

    /// Usage counts could not be read from the record store.
    #[error("usage query failed: {0}")]
    Usage(String),

    /// Filesystem failure.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LicenseError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        LicenseError::Schema {
            field: field.into(),
            reason: "missing".to_owned(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LicenseError::Schema {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable identifier used for metric labels and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            LicenseError::Validation(_) => "validation",
            LicenseError::Format(_) => "format",
            LicenseError::Schema { .. } => "schema",
            LicenseError::Tamper(_) => "tamper",
            LicenseError::Expired { .. } => "expired",
            LicenseError::Key(_) => "key",
            LicenseError::Usage(_) => "usage",
            LicenseError::Io { .. } => "io",
            LicenseError::Serialization(_) => "serialization",
        }
    }

    /// Message suitable for the end user, telling apart an unreadable file,
    /// an expired license, and an invalid one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            LicenseError::Format(_) | LicenseError::Io { .. } => {
                "The license file could not be read. Check that you selected the right file and import it again."
                    .to_owned()
            }
            LicenseError::Expired { expired_at, .. } => format!(
                "The license expired on {}. Contact your vendor to renew it.",
                expired_at.format("%Y-%m-%d")
            ),
            LicenseError::Schema { .. } | LicenseError::Tamper(_) => {
                "The license is invalid or has been modified. Contact your vendor for a new license file."
                    .to_owned()
            }
            other => other.to_string(),
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_list_every_violation() {
        let err = LicenseError::Validation(ValidationErrors::new(vec![
            "rif is invalid".to_owned(),
            "email is invalid".to_owned(),
        ]));
        let message = err.to_string();
        assert!(message.contains("rif is invalid"));
        assert!(message.contains("email is invalid"));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn user_messages_distinguish_failure_classes() {
        let unreadable = LicenseError::Format("eof".into()).user_message();
        let invalid = LicenseError::Tamper(TamperKind::Signature).user_message();
        let schema = LicenseError::missing("license.activationKey").user_message();
        assert!(unreadable.contains("could not be read"));
        assert!(invalid.contains("invalid"));
        assert_eq!(invalid, schema);
        assert_ne!(unreadable, invalid);
    }

    #[test]
    fn schema_error_names_field() {
        let err = LicenseError::missing("license.activationKey");
        assert_eq!(
            err.to_string(),
            "license field `license.activationKey` is missing"
        );
    }
}
