//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! License validation pipeline.
//!
//! Every stage consumes the output type of the previous one, so no stage can
//! be skipped: parse, schema, signature, checksum, consistency,
//! normalisation, expiry. Cross-field rules run only on authenticated
//! records, so any edit of a signed file surfaces as tampering.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::codec::{compute_checksum, decode_document, FORMAT_VERSION};
use crate::entitlement::VerifiedLicense;
use crate::error::{LicenseError, LicenseResult, TamperKind};
use crate::features::FeatureMatrix;
use crate::keys::embedded_public_key;
use crate::model::{License, LicenseStatus};
use crate::signature::verify_license;
use crate::telemetry::{record_license_load, record_rejected_license};

/// Fields every license document must carry, as (display path, JSON pointer).
const REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("id", "/id"),
    ("client", "/client"),
    ("client.name", "/client/name"),
    ("client.company", "/client/company"),
    ("client.rif", "/client/rif"),
    ("client.email", "/client/email"),
    ("license", "/license"),
    ("license.id", "/license/id"),
    ("license.type", "/license/type"),
    ("license.status", "/license/status"),
    ("license.issuedDate", "/license/issuedDate"),
    ("license.expiryDate", "/license/expiryDate"),
    ("license.duration", "/license/duration"),
    ("license.activationKey", "/license/activationKey"),
    ("limits", "/limits"),
    ("limits.maxRecords", "/limits/maxRecords"),
    ("limits.maxUsers", "/limits/maxUsers"),
    ("limits.maxCompanies", "/limits/maxCompanies"),
    ("security", "/security"),
    ("security.signature", "/security/signature"),
    ("security.checksum", "/security/checksum"),
    ("security.version", "/security/version"),
    ("metadata", "/metadata"),
    ("metadata.issuedBy", "/metadata/issuedBy"),
    ("metadata.generatedAt", "/metadata/generatedAt"),
    ("metadata.licenseKey", "/metadata/licenseKey"),
    ("metadata.activationCode", "/metadata/activationCode"),
];

/// Parsed JSON object.
struct Parsed(Value);

/// Typed record satisfying every structural invariant.
struct Structured(License);

/// Record whose signature verified.
struct Signed(License);

/// Record whose signature and checksum verified.
struct Sealed(License);

/// Authentic record satisfying every cross-field rule.
struct Consistent(License);

/// Validates license files against the issuer's public key.
#[derive(Debug, Clone)]
pub struct LicenseValidator {
    public_key: [u8; 32],
}

impl Default for LicenseValidator {
    fn default() -> Self {
        Self {
            public_key: embedded_public_key(),
        }
    }
}

impl LicenseValidator {
    /// Validator trusting a specific issuer key instead of the embedded one.
    #[must_use]
    pub fn with_public_key(public_key: [u8; 32]) -> Self {
        Self { public_key }
    }

    /// Trusted public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Trusted public key, base64 encoded.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.public_key)
    }

    /// Validate `contents` as of now.
    pub fn load(&self, contents: &str) -> LicenseResult<VerifiedLicense> {
        self.load_at(contents, Utc::now())
    }

    /// Validate the license file at `path` as of now.
    pub fn load_file(&self, path: impl AsRef<Path>) -> LicenseResult<VerifiedLicense> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading license file");
        let contents = fs::read_to_string(path).map_err(|err| {
            let err = LicenseError::io(path, err);
            record_rejected_license(&err);
            err
        })?;
        self.load(&contents)
    }

    /// Validate `contents` as of `now`.
    ///
    /// An authentic license past its expiry fails with
    /// [`LicenseError::Expired`], which still carries the verified record.
    pub fn load_at(&self, contents: &str, now: DateTime<Utc>) -> LicenseResult<VerifiedLicense> {
        let outcome = self.run(contents, now);
        match &outcome {
            Ok(license) => record_license_load(license),
            Err(err) => record_rejected_license(err),
        }
        outcome
    }

    fn run(&self, contents: &str, now: DateTime<Utc>) -> LicenseResult<VerifiedLicense> {
        let parsed = parse(contents)?;
        let structured = check_schema(parsed)?;
        let signed = self.check_signature(structured)?;
        let sealed = check_checksum(signed)?;
        let consistent = check_invariants(sealed)?;
        let verified = normalise(consistent);
        check_expiry(verified, now)
    }

    fn check_signature(&self, Structured(record): Structured) -> LicenseResult<Signed> {
        verify_license(&record, &self.public_key)?;
        Ok(Signed(record))
    }
}

fn parse(contents: &str) -> LicenseResult<Parsed> {
    decode_document(contents).map(Parsed)
}

fn check_schema(Parsed(document): Parsed) -> LicenseResult<Structured> {
    if let Some((field, _)) = REQUIRED_FIELDS
        .iter()
        .find(|(_, pointer)| document.pointer(pointer).map_or(true, Value::is_null))
    {
        return Err(LicenseError::missing(*field));
    }

    let record: License = serde_path_to_error::deserialize(document).map_err(|err| {
        let field = err.path().to_string();
        LicenseError::invalid(field, format!("malformed: {}", err.into_inner()))
    })?;
    Ok(Structured(record))
}

fn check_invariants(Sealed(record): Sealed) -> LicenseResult<Consistent> {
    if record.terms.id != record.id {
        return Err(LicenseError::invalid("license.id", "different from id"));
    }
    if record.terms.activation_key != record.metadata.activation_code {
        return Err(LicenseError::invalid(
            "license.activationKey",
            "different from metadata.activationCode",
        ));
    }
    if record.terms.expiry_date <= record.terms.issued_date {
        return Err(LicenseError::invalid(
            "license.expiryDate",
            "not after license.issuedDate",
        ));
    }
    if record.terms.status != LicenseStatus::Active {
        return Err(LicenseError::invalid("license.status", "not active"));
    }
    if let Some((name, value)) = record.limits.first_invalid() {
        return Err(LicenseError::invalid(
            format!("limits.{name}"),
            format!("out of range ({value})"),
        ));
    }
    if record.security.version != FORMAT_VERSION {
        return Err(LicenseError::invalid(
            "security.version",
            format!("unsupported ({})", record.security.version),
        ));
    }
    Ok(Consistent(record))
}

fn check_checksum(Signed(record): Signed) -> LicenseResult<Sealed> {
    let expected = compute_checksum(&record)?;
    if !expected.eq_ignore_ascii_case(record.security.checksum.trim()) {
        return Err(LicenseError::Tamper(TamperKind::Checksum));
    }
    Ok(Sealed(record))
}

fn normalise(Consistent(record): Consistent) -> VerifiedLicense {
    let features = FeatureMatrix::from_tags(record.features.as_deref(), record.tier());
    VerifiedLicense::from_record(record, features)
}

fn check_expiry(license: VerifiedLicense, now: DateTime<Utc>) -> LicenseResult<VerifiedLicense> {
    let expired_at = license.record().expires_at();
    if now >= expired_at {
        return Err(LicenseError::Expired {
            expired_at,
            license: Box::new(license),
        });
    }
    Ok(license)
}
