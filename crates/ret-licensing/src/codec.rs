//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Canonical signing payload and full-record encoding.
//!
//! The signing payload is a fixed subset of the record with a fixed field
//! order and sorted features, so re-signing the same logical license always
//! signs the same bytes. The checksum covers the whole record except the
//! banner and the checksum itself.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{LicenseError, LicenseResult};
use crate::model::{License, LicenseLimits};
use crate::tier::LicenseTier;

/// Application salt appended to every signed or hashed payload.
pub const LICENSE_SALT: &str = "RETENCIONES::ISLR-IVA::LICENSE::2024";

/// Current license file format version.
pub const FORMAT_VERSION: &str = "1.0";

/// Banner written at the top of every license file.
pub const LICENSE_NOTICE: &str =
    "Signed license file. Any manual edit invalidates it. Contact your vendor for changes.";

/// Fields covered by the issuer's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningPayload<'a> {
    id: &'a str,
    tax_id: &'a str,
    tier: LicenseTier,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    activation_code: &'a str,
    limits: LicenseLimits,
    features: Vec<&'a str>,
}

impl<'a> SigningPayload<'a> {
    /// Extract the signed fields from a record.
    #[must_use]
    pub fn from_license(license: &'a License) -> Self {
        let features: BTreeSet<&str> = license
            .features
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        Self {
            id: &license.id,
            tax_id: &license.client.rif,
            tier: license.terms.tier,
            issued_at: license.terms.issued_date,
            expires_at: license.terms.expiry_date,
            activation_code: &license.metadata.activation_code,
            limits: license.limits,
            features: features.into_iter().collect(),
        }
    }

    /// Deterministic JSON encoding of the payload.
    pub fn canonical_bytes(&self) -> LicenseResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Canonical bytes followed by the application salt.
    pub fn signable_bytes(&self) -> LicenseResult<Vec<u8>> {
        let mut bytes = self.canonical_bytes()?;
        bytes.extend_from_slice(LICENSE_SALT.as_bytes());
        Ok(bytes)
    }
}

/// SHA-256 hex digest over the full record (signature included) plus salt.
pub fn compute_checksum(license: &License) -> LicenseResult<String> {
    let mut unsealed = license.clone();
    unsealed.notice = None;
    unsealed.security.checksum = String::new();
    let serialised = serde_json::to_vec(&unsealed)?;

    let mut hasher = Sha256::new();
    hasher.update(&serialised);
    hasher.update(LICENSE_SALT.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Human-readable file contents for a sealed record.
pub fn encode_license(license: &License) -> LicenseResult<String> {
    let mut with_notice = license.clone();
    with_notice.notice = Some(LICENSE_NOTICE.to_owned());
    let mut encoded = serde_json::to_string_pretty(&with_notice)?;
    encoded.push('\n');
    Ok(encoded)
}

/// Parse raw file contents into a JSON object.
pub fn decode_document(raw: &str) -> LicenseResult<Value> {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(LicenseError::Format("license file is empty".to_owned()));
    }
    let document: Value = serde_json::from_str(trimmed)
        .map_err(|err| LicenseError::Format(format!("invalid JSON: {err}")))?;
    if !document.is_object() {
        return Err(LicenseError::Format(
            "license document must be a JSON object".to_owned(),
        ));
    }
    Ok(document)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{ClientInfo, LicenseMetadata, LicenseStatus, LicenseTerms, SecurityBlock};

    pub(crate) fn unsigned_license() -> License {
        let issued = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let expires = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        License {
            notice: None,
            id: "LIC-1735689600000-ABCD2345".to_owned(),
            client: ClientInfo {
                name: "Ana Pérez".to_owned(),
                company: "Servicios Contables CA".to_owned(),
                rif: "J-12345678-9".to_owned(),
                email: "ana@example.com".to_owned(),
                phone: None,
            },
            terms: LicenseTerms {
                id: "LIC-1735689600000-ABCD2345".to_owned(),
                tier: LicenseTier::Basic,
                status: LicenseStatus::Active,
                issued_date: issued,
                expiry_date: expires,
                duration: 12,
                activation_key: "BAS-AAAA-BBBB-CCCC-DDDD".to_owned(),
            },
            limits: LicenseLimits::for_tier(LicenseTier::Basic),
            features: Some(vec![
                "voucher_email".to_owned(),
                "islr_retentions".to_owned(),
            ]),
            security: SecurityBlock {
                signature: String::new(),
                checksum: String::new(),
                version: FORMAT_VERSION.to_owned(),
            },
            metadata: LicenseMetadata {
                issued_by: "tests".to_owned(),
                generated_at: issued,
                license_key: "RET-BAS-2501-QWERTY-0A1B".to_owned(),
                activation_code: "BAS-AAAA-BBBB-CCCC-DDDD".to_owned(),
                notes: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::unsigned_license;
    use super::*;

    #[test]
    fn canonical_bytes_ignore_feature_order_and_duplicates() {
        let license = unsigned_license();
        let mut reordered = license.clone();
        reordered.features = Some(vec![
            "islr_retentions".to_owned(),
            "voucher_email".to_owned(),
            "islr_retentions".to_owned(),
        ]);
        let a = SigningPayload::from_license(&license).canonical_bytes().unwrap();
        let b = SigningPayload::from_license(&reordered)
            .canonical_bytes()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_bytes_exclude_descriptive_client_fields() {
        let license = unsigned_license();
        let mut renamed = license.clone();
        renamed.client.name = "Someone Else".to_owned();
        renamed.metadata.notes = Some("courtesy extension".to_owned());
        assert_eq!(
            SigningPayload::from_license(&license).canonical_bytes().unwrap(),
            SigningPayload::from_license(&renamed).canonical_bytes().unwrap()
        );
    }

    #[test]
    fn canonical_field_order_is_fixed() {
        let license = unsigned_license();
        let bytes = SigningPayload::from_license(&license).canonical_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let order = [
            "\"id\"",
            "\"taxId\"",
            "\"tier\"",
            "\"issuedAt\"",
            "\"expiresAt\"",
            "\"activationCode\"",
            "\"limits\"",
            "\"features\"",
        ];
        let positions: Vec<usize> = order.iter().map(|key| text.find(key).unwrap()).collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn checksum_ignores_banner_but_covers_client_fields() {
        let license = unsigned_license();
        let baseline = compute_checksum(&license).unwrap();

        let mut bannered = license.clone();
        bannered.notice = Some("edited banner".to_owned());
        assert_eq!(compute_checksum(&bannered).unwrap(), baseline);

        let mut edited = license;
        edited.client.email = "other@example.com".to_owned();
        assert_ne!(compute_checksum(&edited).unwrap(), baseline);
    }

    #[test]
    fn encoded_file_carries_notice_and_decodes() {
        let encoded = encode_license(&unsigned_license()).unwrap();
        let document = decode_document(&encoded).unwrap();
        assert_eq!(document["notice"], LICENSE_NOTICE);
        assert_eq!(document["license"]["type"], "basic");
        assert_eq!(document["license"]["activationKey"], "BAS-AAAA-BBBB-CCCC-DDDD");
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(decode_document(""), Err(LicenseError::Format(_))));
        assert!(matches!(decode_document("[1,2]"), Err(LicenseError::Format(_))));
        assert!(matches!(decode_document("{oops"), Err(LicenseError::Format(_))));
    }
}
