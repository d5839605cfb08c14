//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Wire representation of license files and issuance requests.
//!
//! Field names follow the JSON layout distributed to customers, so the
//! structs rename to camelCase and keep the historical `license`/`type` keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::{LicenseTier, UNLIMITED};

/// Descriptive client data. Never used for authorisation decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Contact name.
    pub name: String,
    /// Company legal name.
    pub company: String,
    /// Company RIF (tax identifier).
    pub rif: String,
    /// Contact email.
    pub email: String,
    /// Optional phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Lifecycle status stored in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// The only status the issuer assigns.
    Active,
    /// Parsed for compatibility; never written by the issuer.
    Expired,
    /// Parsed for compatibility; never written by the issuer.
    Suspended,
}

/// Commercial terms of the license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseTerms {
    /// Same value as [`License::id`].
    pub id: String,
    /// Commercial tier.
    #[serde(rename = "type")]
    pub tier: LicenseTier,
    /// Issuance status.
    pub status: LicenseStatus,
    /// Issuance timestamp.
    pub issued_date: DateTime<Utc>,
    /// Expiry timestamp.
    pub expiry_date: DateTime<Utc>,
    /// Duration in months.
    pub duration: u32,
    /// Activation code, duplicated from the metadata block.
    pub activation_key: String,
}

/// Quotas granted by the license; [`UNLIMITED`] disables a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseLimits {
    /// Maximum stored withholding records.
    pub max_records: i64,
    /// Maximum active users.
    pub max_users: i64,
    /// Maximum configured companies.
    pub max_companies: i64,
}

impl LicenseLimits {
    /// Default limits for a tier.
    #[must_use]
    pub fn for_tier(tier: LicenseTier) -> Self {
        let policy = tier.policy();
        Self {
            max_records: policy.max_records,
            max_users: policy.max_users,
            max_companies: policy.max_companies,
        }
    }

    /// Name and value of every limit that is neither unlimited nor
    /// non-negative.
    pub fn invalid(&self) -> impl Iterator<Item = (&'static str, i64)> {
        [
            ("maxRecords", self.max_records),
            ("maxUsers", self.max_users),
            ("maxCompanies", self.max_companies),
        ]
        .into_iter()
        .filter(|(_, value)| *value < UNLIMITED)
    }

    /// First entry of [`Self::invalid`].
    #[must_use]
    pub fn first_invalid(&self) -> Option<(&'static str, i64)> {
        self.invalid().next()
    }

    /// Whether `count` existing items leave room for one more under `limit`.
    #[must_use]
    pub fn allows(limit: i64, count: u64) -> bool {
        if limit == UNLIMITED {
            return true;
        }
        u64::try_from(limit).map_or(false, |limit| count < limit)
    }
}

/// Integrity block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityBlock {
    /// Base64 Ed25519 signature over the canonical payload.
    pub signature: String,
    /// SHA-256 hex digest of the full record.
    pub checksum: String,
    /// File format version.
    pub version: String,
}

/// Issuance metadata and human-facing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseMetadata {
    /// Operator or tool that issued the license.
    pub issued_by: String,
    /// When the file was generated.
    pub generated_at: DateTime<Utc>,
    /// Human-readable license key, also the file stem.
    pub license_key: String,
    /// Activation code quoted to support.
    pub activation_code: String,
    /// Free-form notes from the issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A complete license record as stored in a `<licenseKey>.json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Banner warning against manual edits. Not covered by any integrity check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Unique identifier of this issuance.
    pub id: String,
    /// Client data.
    pub client: ClientInfo,
    /// Commercial terms.
    #[serde(rename = "license")]
    pub terms: LicenseTerms,
    /// Quotas.
    pub limits: LicenseLimits,
    /// Capability tags; tier defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    /// Signature and checksum.
    pub security: SecurityBlock,
    /// Issuance metadata.
    pub metadata: LicenseMetadata,
}

impl License {
    /// Commercial tier.
    #[must_use]
    pub fn tier(&self) -> LicenseTier {
        self.terms.tier
    }

    /// Issuance timestamp.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.terms.issued_date
    }

    /// Expiry timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.terms.expiry_date
    }

    /// Human-readable license key.
    #[must_use]
    pub fn license_key(&self) -> &str {
        &self.metadata.license_key
    }

    /// Activation code.
    #[must_use]
    pub fn activation_code(&self) -> &str {
        &self.metadata.activation_code
    }
}

/// Input to [`crate::issuer::LicenseIssuer::issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequest {
    /// Contact name.
    pub client_name: String,
    /// Company legal name.
    pub company_name: String,
    /// Company RIF.
    pub tax_id: String,
    /// Contact email.
    pub email: String,
    /// Optional phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Commercial tier.
    pub tier: LicenseTier,
    /// Duration in months.
    pub duration_months: u32,
    /// Record quota override.
    #[serde(default)]
    pub max_records: Option<i64>,
    /// User quota override.
    #[serde(default)]
    pub max_users: Option<i64>,
    /// Company quota override.
    #[serde(default)]
    pub max_companies: Option<i64>,
    /// Feature override; tier defaults when absent.
    #[serde(default)]
    pub features: Option<Vec<String>>,
    /// Issuer name; the issuer's configured name is used when empty.
    #[serde(default)]
    pub issued_by: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl LicenseRequest {
    /// Request with tier defaults for every optional field.
    #[must_use]
    pub fn new(
        client_name: impl Into<String>,
        company_name: impl Into<String>,
        tax_id: impl Into<String>,
        email: impl Into<String>,
        tier: LicenseTier,
        duration_months: u32,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            company_name: company_name.into(),
            tax_id: tax_id.into(),
            email: email.into(),
            phone: None,
            tier,
            duration_months,
            max_records: None,
            max_users: None,
            max_companies: None,
            features: None,
            issued_by: String::new(),
            notes: None,
        }
    }

    /// Limits after applying tier defaults to absent overrides.
    #[must_use]
    pub fn resolved_limits(&self) -> LicenseLimits {
        let defaults = LicenseLimits::for_tier(self.tier);
        LicenseLimits {
            max_records: self.max_records.unwrap_or(defaults.max_records),
            max_users: self.max_users.unwrap_or(defaults.max_users),
            max_companies: self.max_companies.unwrap_or(defaults.max_companies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_allows_strictly_below_limit() {
        assert!(LicenseLimits::allows(10, 9));
        assert!(!LicenseLimits::allows(10, 10));
        assert!(!LicenseLimits::allows(0, 0));
        assert!(LicenseLimits::allows(UNLIMITED, u64::MAX));
        assert!(!LicenseLimits::allows(-5, 0));
    }

    #[test]
    fn request_overrides_take_precedence() {
        let mut request = LicenseRequest::new(
            "Ana Pérez",
            "Servicios Contables CA",
            "J-12345678-9",
            "ana@example.com",
            LicenseTier::Basic,
            12,
        );
        request.max_users = Some(5);
        let limits = request.resolved_limits();
        assert_eq!(limits.max_users, 5);
        assert_eq!(limits.max_records, 1_000);
    }

    #[test]
    fn first_invalid_reports_offending_limit() {
        let limits = LicenseLimits {
            max_records: 10,
            max_users: -2,
            max_companies: UNLIMITED,
        };
        assert_eq!(limits.first_invalid(), Some(("maxUsers", -2)));

        let limits = LicenseLimits {
            max_records: -5,
            max_users: -3,
            max_companies: -9,
        };
        let names: Vec<&str> = limits.invalid().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["maxRecords", "maxUsers", "maxCompanies"]);
    }

    #[test]
    fn request_deserialises_from_camel_case() {
        let raw = r#"{
            "clientName": "Ana",
            "companyName": "Servicios Contables CA",
            "taxId": "J-12345678-9",
            "email": "ana@example.com",
            "tier": "professional",
            "durationMonths": 6
        }"#;
        let request: LicenseRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.tier, LicenseTier::Professional);
        assert!(request.features.is_none());
        assert!(request.issued_by.is_empty());
    }
}
