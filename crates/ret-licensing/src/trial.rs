//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use chrono::{DateTime, Duration, Timelike, Utc};

use crate::codec::FORMAT_VERSION;
use crate::features::{default_tags, FeatureMatrix};
use crate::issuer::random_token;
use crate::model::{
    ClientInfo, License, LicenseLimits, LicenseMetadata, LicenseStatus, LicenseTerms,
    SecurityBlock,
};
use crate::tier::LicenseTier;

/// Default trial length.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;

/// Parameters of the locally generated trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPolicy {
    /// Trial length in days.
    pub days: i64,
}

impl TrialPolicy {
    /// Trial length, at least one day.
    #[must_use]
    pub fn length(&self) -> Duration {
        Duration::days(self.days.max(1))
    }
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            days: DEFAULT_TRIAL_DAYS,
        }
    }
}

/// Unsigned trial generated on the customer's machine.
///
/// It has the same shape as an issued license but is never authenticated;
/// the trial tier's limits and features are always enforced, whatever the
/// stored record says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialLicense {
    record: License,
    features: FeatureMatrix,
}

impl TrialLicense {
    /// Start a new trial at `now`.
    #[must_use]
    pub fn generate(policy: TrialPolicy, now: DateTime<Utc>) -> Self {
        let started = now.with_nanosecond(0).unwrap_or(now);
        let id = format!("TRIAL-{}-{}", started.timestamp_millis(), random_token(8));
        let record = License {
            notice: None,
            id: id.clone(),
            client: ClientInfo {
                name: "Trial user".to_owned(),
                company: "Unregistered".to_owned(),
                rif: String::new(),
                email: String::new(),
                phone: None,
            },
            terms: LicenseTerms {
                id,
                tier: LicenseTier::Trial,
                status: LicenseStatus::Active,
                issued_date: started,
                expiry_date: started + policy.length(),
                duration: 0,
                activation_key: String::new(),
            },
            limits: LicenseLimits::for_tier(LicenseTier::Trial),
            features: Some(default_tags(LicenseTier::Trial)),
            security: SecurityBlock {
                signature: String::new(),
                checksum: String::new(),
                version: FORMAT_VERSION.to_owned(),
            },
            metadata: LicenseMetadata {
                issued_by: "local-trial".to_owned(),
                generated_at: started,
                license_key: "TRIAL-LOCAL".to_owned(),
                activation_code: String::new(),
                notes: None,
            },
        };
        Self::from_record(record, policy)
    }

    /// Rehydrate a persisted trial, clamping it back to trial terms.
    ///
    /// The expiry never lies further than `policy` days after the earliest
    /// start the record shows.
    #[must_use]
    pub fn from_record(mut record: License, policy: TrialPolicy) -> Self {
        let started = record.terms.issued_date.min(record.metadata.generated_at);
        let latest_expiry = started + policy.length();
        if record.terms.expiry_date > latest_expiry {
            record.terms.expiry_date = latest_expiry;
        }
        record.terms.tier = LicenseTier::Trial;
        record.limits = LicenseLimits::for_tier(LicenseTier::Trial);
        record.features = Some(default_tags(LicenseTier::Trial));
        Self {
            record,
            features: FeatureMatrix::for_tier(LicenseTier::Trial),
        }
    }

    /// Underlying record.
    #[must_use]
    pub fn record(&self) -> &License {
        &self.record
    }

    /// Trial capabilities.
    #[must_use]
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }
}
