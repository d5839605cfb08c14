//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Entitlement state and the pure queries answered against it.
//!
//! An [`EntitlementSnapshot`] is immutable. The service replaces the whole
//! snapshot on every change, so readers never observe a half-applied license.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::features::{Feature, FeatureMatrix};
use crate::model::{License, LicenseLimits};
use crate::tier::LicenseTier;
use crate::trial::TrialLicense;
use crate::usage::UsageSnapshot;

/// Days before expiry at which a warning is raised.
pub const EXPIRY_WARNING_DAYS: i64 = 7;

/// How far a license can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustLevel {
    /// Signature verified against the issuer's public key.
    IssuerSigned,
    /// Generated on this machine; never authenticated.
    LocalUnverified,
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustLevel::IssuerSigned => write!(f, "issuer-signed"),
            TrustLevel::LocalUnverified => write!(f, "local-unverified"),
        }
    }
}

/// A license that passed every integrity stage of the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLicense {
    record: License,
    features: FeatureMatrix,
}

impl VerifiedLicense {
    pub(crate) fn from_record(record: License, features: FeatureMatrix) -> Self {
        Self { record, features }
    }

    /// The authenticated record.
    #[must_use]
    pub fn record(&self) -> &License {
        &self.record
    }

    /// Normalised capabilities.
    #[must_use]
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }
}

/// The license currently granting capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entitlement {
    /// Issued and authenticated.
    Verified(VerifiedLicense),
    /// Local trial.
    Unverified(TrialLicense),
}

impl Entitlement {
    /// Trust level of the backing license.
    #[must_use]
    pub fn trust(&self) -> TrustLevel {
        match self {
            Entitlement::Verified(_) => TrustLevel::IssuerSigned,
            Entitlement::Unverified(_) => TrustLevel::LocalUnverified,
        }
    }

    /// Backing record.
    #[must_use]
    pub fn record(&self) -> &License {
        match self {
            Entitlement::Verified(license) => license.record(),
            Entitlement::Unverified(trial) => trial.record(),
        }
    }

    /// Effective capabilities.
    #[must_use]
    pub fn features(&self) -> &FeatureMatrix {
        match self {
            Entitlement::Verified(license) => license.features(),
            Entitlement::Unverified(trial) => trial.features(),
        }
    }

    /// Commercial tier.
    #[must_use]
    pub fn tier(&self) -> LicenseTier {
        self.record().tier()
    }

    /// Expiry timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.record().expires_at()
    }
}

/// Severity of an [`ExpiryWarning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Close to expiry.
    Warning,
    /// Already expired.
    Error,
}

/// User-facing notice about license expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryWarning {
    /// How urgent the notice is.
    pub severity: Severity,
    /// Whole days left, rounded up.
    pub remaining_days: i64,
    /// Display text.
    pub message: String,
}

/// Display-oriented view of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementSummary {
    /// License identifier.
    pub license_id: String,
    /// Licensed company.
    pub company: String,
    /// Commercial tier.
    pub tier: LicenseTier,
    /// Trust level.
    pub trust: TrustLevel,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
    /// Whole days left.
    pub remaining_days: i64,
    /// Whether the license has expired.
    pub expired: bool,
    /// Capability flags.
    pub features: BTreeMap<String, bool>,
    /// Granted quotas.
    pub limits: LicenseLimits,
    /// Usage at the time of the snapshot.
    pub usage: UsageSnapshot,
    /// Pending expiry notice.
    pub warning: Option<ExpiryWarning>,
}

/// Immutable entitlement state shared with readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementSnapshot {
    /// Active license.
    pub entitlement: Entitlement,
    /// Usage counts the quota checks compare against.
    pub usage: UsageSnapshot,
    /// When this snapshot replaced the previous one.
    pub installed_at: DateTime<Utc>,
}

impl EntitlementSnapshot {
    /// Snapshot installed now.
    #[must_use]
    pub fn new(entitlement: Entitlement, usage: UsageSnapshot) -> Self {
        Self {
            entitlement,
            usage,
            installed_at: Utc::now(),
        }
    }

    /// Same license with fresh usage counts.
    #[must_use]
    pub fn with_usage(&self, usage: UsageSnapshot) -> Self {
        Self::new(self.entitlement.clone(), usage)
    }

    /// Trust level of the active license.
    #[must_use]
    pub fn trust(&self) -> TrustLevel {
        self.entitlement.trust()
    }

    /// Whether the license has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the license has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.entitlement.expires_at()
    }

    /// Whether `feature` may be used.
    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.has_feature_at(feature, Utc::now())
    }

    /// Whether `feature` may be used at `now`.
    #[must_use]
    pub fn has_feature_at(&self, feature: Feature, now: DateTime<Utc>) -> bool {
        if self.is_expired_at(now) {
            return false;
        }
        if self.entitlement.tier() == LicenseTier::Enterprise {
            return true;
        }
        self.entitlement.features().is_enabled(feature)
    }

    /// Whether one more record may be stored.
    #[must_use]
    pub fn can_create_records(&self) -> bool {
        self.can_create_records_at(Utc::now())
    }

    /// Whether one more record may be stored at `now`.
    #[must_use]
    pub fn can_create_records_at(&self, now: DateTime<Utc>) -> bool {
        let limit = self.entitlement.record().limits.max_records;
        !self.is_expired_at(now) && LicenseLimits::allows(limit, self.usage.records)
    }

    /// Whether one more user may be added.
    #[must_use]
    pub fn can_add_users(&self) -> bool {
        self.can_add_users_at(Utc::now())
    }

    /// Whether one more user may be added at `now`.
    #[must_use]
    pub fn can_add_users_at(&self, now: DateTime<Utc>) -> bool {
        let limit = self.entitlement.record().limits.max_users;
        !self.is_expired_at(now) && LicenseLimits::allows(limit, self.usage.users)
    }

    /// Whether one more company may be configured.
    #[must_use]
    pub fn can_add_companies(&self) -> bool {
        self.can_add_companies_at(Utc::now())
    }

    /// Whether one more company may be configured at `now`.
    #[must_use]
    pub fn can_add_companies_at(&self, now: DateTime<Utc>) -> bool {
        let limit = self.entitlement.record().limits.max_companies;
        !self.is_expired_at(now) && LicenseLimits::allows(limit, self.usage.companies)
    }

    /// Whole days until expiry, rounded up; `0` once expired.
    #[must_use]
    pub fn remaining_days(&self) -> i64 {
        self.remaining_days_at(Utc::now())
    }

    /// Whole days until expiry at `now`.
    #[must_use]
    pub fn remaining_days_at(&self, now: DateTime<Utc>) -> i64 {
        remaining_days_between(now, self.entitlement.expires_at())
    }

    /// Expiry notice, if one is due.
    #[must_use]
    pub fn expiry_warning(&self) -> Option<ExpiryWarning> {
        self.expiry_warning_at(Utc::now())
    }

    /// Expiry notice due at `now`.
    #[must_use]
    pub fn expiry_warning_at(&self, now: DateTime<Utc>) -> Option<ExpiryWarning> {
        let expires_at = self.entitlement.expires_at();
        if self.is_expired_at(now) {
            return Some(ExpiryWarning {
                severity: Severity::Error,
                remaining_days: 0,
                message: format!(
                    "Your license expired on {}. Contact your vendor to renew it.",
                    expires_at.format("%Y-%m-%d")
                ),
            });
        }
        let remaining_days = self.remaining_days_at(now);
        (remaining_days <= EXPIRY_WARNING_DAYS).then(|| ExpiryWarning {
            severity: Severity::Warning,
            remaining_days,
            message: format!(
                "Your license expires in {remaining_days} day(s), on {}.",
                expires_at.format("%Y-%m-%d")
            ),
        })
    }

    /// Display-oriented view.
    #[must_use]
    pub fn summary(&self) -> EntitlementSummary {
        self.summary_at(Utc::now())
    }

    /// Display-oriented view at `now`.
    #[must_use]
    pub fn summary_at(&self, now: DateTime<Utc>) -> EntitlementSummary {
        let record = self.entitlement.record();
        let expired = self.is_expired_at(now);
        let features = Feature::ALL
            .iter()
            .map(|feature| {
                (
                    feature.as_str().to_owned(),
                    self.has_feature_at(*feature, now),
                )
            })
            .collect();
        EntitlementSummary {
            license_id: record.id.clone(),
            company: record.client.company.clone(),
            tier: record.tier(),
            trust: self.trust(),
            expires_at: record.expires_at(),
            remaining_days: self.remaining_days_at(now),
            expired,
            features,
            limits: record.limits,
            usage: self.usage.clone(),
            warning: self.expiry_warning_at(now),
        }
    }
}

/// `max(0, ceil((expires_at - now) / 1 day))`.
#[must_use]
pub fn remaining_days_between(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    let remaining = expires_at - now;
    if remaining <= Duration::zero() {
        return 0;
    }
    let whole = remaining.num_days();
    if remaining > Duration::days(whole) {
        whole + 1
    } else {
        whole
    }
}
