//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Vendor-side license minting.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Months, Timelike, Utc};
use ed25519_dalek::SigningKey;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::codec::{compute_checksum, encode_license, FORMAT_VERSION};
use crate::error::{LicenseError, LicenseResult, ValidationErrors};
use crate::features::{default_tags, Feature};
use crate::keys::KeyPair;
use crate::model::{
    ClientInfo, License, LicenseMetadata, LicenseRequest, LicenseStatus, LicenseTerms,
    SecurityBlock,
};
use crate::signature::sign_license;
use crate::telemetry::{record_issue_failure, record_license_issued};
use crate::tier::LicenseTier;

/// Shortest accepted client or company name, after trimming.
pub const MIN_NAME_LEN: usize = 3;
/// Longest accepted license duration.
pub const MAX_DURATION_MONTHS: u32 = 120;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

static RIF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[VEJGPRC]-\d{8}-\d$").expect("RIF pattern to compile"));

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern to compile"));

/// A signed license and the file it was written to.
#[derive(Debug, Clone)]
pub struct IssuedLicense {
    /// The sealed record.
    pub license: License,
    /// Path of the `<licenseKey>.json` file.
    pub path: PathBuf,
}

/// Result of one request within a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Position of the request in the batch.
    pub index: usize,
    /// Company named by the request, for reporting.
    pub company: String,
    /// Issued license or the reason it was not issued.
    pub result: LicenseResult<IssuedLicense>,
}

impl BatchOutcome {
    /// Whether the license was issued.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Mints signed license files with the vendor's private key.
#[derive(Debug, Clone)]
pub struct LicenseIssuer {
    signing_key: SigningKey,
    output_dir: PathBuf,
    issuer_name: String,
}

impl LicenseIssuer {
    /// Issuer backed by a managed key pair.
    #[must_use]
    pub fn new(key_pair: &KeyPair, output_dir: impl Into<PathBuf>, issuer_name: impl Into<String>) -> Self {
        Self::from_signing_key(key_pair.signing_key().clone(), output_dir, issuer_name)
    }

    /// Issuer backed by a raw signing key (tests, vendor tooling).
    #[must_use]
    pub fn from_signing_key(
        signing_key: SigningKey,
        output_dir: impl Into<PathBuf>,
        issuer_name: impl Into<String>,
    ) -> Self {
        Self {
            signing_key,
            output_dir: output_dir.into(),
            issuer_name: issuer_name.into(),
        }
    }

    /// Directory license files are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Public key matching this issuer's signing key.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Issue a license now and write it to the output directory.
    pub fn issue(&self, request: &LicenseRequest) -> LicenseResult<IssuedLicense> {
        self.issue_at(request, Utc::now())
    }

    /// Issue a license as of `now` and write it to the output directory.
    pub fn issue_at(
        &self,
        request: &LicenseRequest,
        now: DateTime<Utc>,
    ) -> LicenseResult<IssuedLicense> {
        let outcome = self
            .build_at(request, now)
            .and_then(|license| self.write(license));
        match &outcome {
            Ok(issued) => record_license_issued(&issued.license, &issued.path),
            Err(err) => record_issue_failure(err),
        }
        outcome
    }

    /// Issue every request, continuing past individual failures.
    pub fn issue_batch(&self, requests: &[LicenseRequest]) -> Vec<BatchOutcome> {
        let outcomes: Vec<BatchOutcome> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| BatchOutcome {
                index,
                company: request.company_name.clone(),
                result: self.issue(request),
            })
            .collect();
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            warn!(total = outcomes.len(), failed, "batch issuance finished with failures");
        } else {
            info!(total = outcomes.len(), "batch issuance finished");
        }
        outcomes
    }

    /// Assemble and seal a license without touching the filesystem.
    pub fn build_at(&self, request: &LicenseRequest, now: DateTime<Utc>) -> LicenseResult<License> {
        validate_request(request)?;

        let issued_at = now.with_nanosecond(0).unwrap_or(now);
        let expires_at = issued_at
            .checked_add_months(Months::new(request.duration_months))
            .ok_or_else(|| {
                LicenseError::Validation(ValidationErrors::new(vec![format!(
                    "duration of {} months overflows the calendar",
                    request.duration_months
                )]))
            })?;

        let tax_id = request.tax_id.trim().to_owned();
        let id = generate_license_id(issued_at);
        let activation_code = generate_activation_code(request.tier);
        let license_key = generate_license_key(request.tier, issued_at, &tax_id, &id);
        let features = request
            .features
            .clone()
            .unwrap_or_else(|| default_tags(request.tier));
        let issued_by = if request.issued_by.trim().is_empty() {
            self.issuer_name.clone()
        } else {
            request.issued_by.trim().to_owned()
        };

        let mut license = License {
            notice: None,
            id: id.clone(),
            client: ClientInfo {
                name: request.client_name.trim().to_owned(),
                company: request.company_name.trim().to_owned(),
                rif: tax_id,
                email: request.email.trim().to_owned(),
                phone: request
                    .phone
                    .as_deref()
                    .map(str::trim)
                    .filter(|phone| !phone.is_empty())
                    .map(str::to_owned),
            },
            terms: LicenseTerms {
                id,
                tier: request.tier,
                status: LicenseStatus::Active,
                issued_date: issued_at,
                expiry_date: expires_at,
                duration: request.duration_months,
                activation_key: activation_code.clone(),
            },
            limits: request.resolved_limits(),
            features: Some(features),
            security: SecurityBlock {
                signature: String::new(),
                checksum: String::new(),
                version: FORMAT_VERSION.to_owned(),
            },
            metadata: LicenseMetadata {
                issued_by,
                generated_at: issued_at,
                license_key,
                activation_code,
                notes: request
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|notes| !notes.is_empty())
                    .map(str::to_owned),
            },
        };

        license.security.signature = sign_license(&license, &self.signing_key)?;
        license.security.checksum = compute_checksum(&license)?;
        Ok(license)
    }

    fn write(&self, license: License) -> LicenseResult<IssuedLicense> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|err| LicenseError::io(&self.output_dir, err))?;
        let path = self
            .output_dir
            .join(format!("{}.json", license.metadata.license_key));
        let encoded = encode_license(&license)?;
        create_license_file(&path, |file| {
            file.write_all(encoded.as_bytes())?;
            file.sync_all()
        })?;
        Ok(IssuedLicense { license, path })
    }
}

/// Create `path` (never replacing an existing file) and fill it with `fill`.
/// A partially written file is removed again.
fn create_license_file(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> LicenseResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| LicenseError::io(path, err))?;
    if let Err(err) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %cleanup, "could not remove partial license file");
        }
        return Err(LicenseError::io(path, err));
    }
    Ok(())
}

/// Check a request against every issuance rule, reporting all violations.
pub fn validate_request(request: &LicenseRequest) -> LicenseResult<()> {
    let mut violations = Vec::new();

    if request.client_name.trim().chars().count() < MIN_NAME_LEN {
        violations.push(format!(
            "client name must have at least {MIN_NAME_LEN} characters"
        ));
    }
    if request.company_name.trim().chars().count() < MIN_NAME_LEN {
        violations.push(format!(
            "company name must have at least {MIN_NAME_LEN} characters"
        ));
    }
    if !RIF_PATTERN.is_match(request.tax_id.trim()) {
        violations.push(format!(
            "tax id '{}' must match the RIF format X-########-# (X in V, E, J, G, P, R, C)",
            request.tax_id.trim()
        ));
    }
    if !EMAIL_PATTERN.is_match(request.email.trim()) {
        violations.push(format!("email '{}' is not a valid address", request.email.trim()));
    }
    if !(1..=MAX_DURATION_MONTHS).contains(&request.duration_months) {
        violations.push(format!(
            "duration must be between 1 and {MAX_DURATION_MONTHS} months, got {}",
            request.duration_months
        ));
    }
    for (field, value) in request.resolved_limits().invalid() {
        violations.push(format!("{field} must be -1 (unlimited) or non-negative, got {value}"));
    }
    for tag in request.features.iter().flatten() {
        if Feature::from_tag(tag).is_none() {
            violations.push(format!("feature '{tag}' is not a known capability"));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(LicenseError::Validation(ValidationErrors::new(violations)))
    }
}

/// Check the trailing checksum group of a license key against the tax id and
/// license id it was issued for.
#[must_use]
pub fn license_key_matches(license_key: &str, tax_id: &str, license_id: &str) -> bool {
    license_key
        .rsplit('-')
        .next()
        .map_or(false, |suffix| suffix == key_checksum(tax_id, license_id))
}

/// Tier encoded in a license key, if the key is well formed.
#[must_use]
pub fn tier_from_license_key(license_key: &str) -> Option<LicenseTier> {
    let mut parts = license_key.split('-');
    if parts.next() != Some("RET") {
        return None;
    }
    let code = parts.next()?;
    LicenseTier::ALL.into_iter().find(|tier| tier.code() == code)
}

pub(crate) fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

fn generate_license_id(now: DateTime<Utc>) -> String {
    format!("LIC-{}-{}", now.timestamp_millis(), random_token(8))
}

fn generate_activation_code(tier: LicenseTier) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        tier.code(),
        random_token(4),
        random_token(4),
        random_token(4),
        random_token(4)
    )
}

fn generate_license_key(
    tier: LicenseTier,
    issued_at: DateTime<Utc>,
    tax_id: &str,
    license_id: &str,
) -> String {
    format!(
        "RET-{}-{}-{}-{}",
        tier.code(),
        issued_at.format("%y%m"),
        random_token(6),
        key_checksum(tax_id, license_id)
    )
}

fn key_checksum(tax_id: &str, license_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tax_id.as_bytes());
    hasher.update(license_id.as_bytes());
    hex::encode_upper(hasher.finalize())[..4].to_owned()
}
