//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::features::Feature;

/// Limit value meaning "no quota".
pub const UNLIMITED: i64 = -1;

/// Commercial license level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    /// Time-limited evaluation.
    Trial,
    /// Single-company bookkeeping.
    Basic,
    /// Firms handling several companies.
    Professional,
    /// Everything, no quotas.
    Enterprise,
}

/// Default limits and capabilities granted by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    /// Maximum stored withholding records.
    pub max_records: i64,
    /// Maximum active users.
    pub max_users: i64,
    /// Maximum configured companies.
    pub max_companies: i64,
    /// Capabilities enabled when the license does not list its own.
    pub features: &'static [Feature],
}

const CORE_FEATURES: &[Feature] = &[
    Feature::IslrRetentions,
    Feature::IvaRetentions,
    Feature::BasicReports,
];

const BASIC_FEATURES: &[Feature] = &[
    Feature::IslrRetentions,
    Feature::IvaRetentions,
    Feature::BasicReports,
    Feature::VoucherEmail,
];

const PROFESSIONAL_FEATURES: &[Feature] = &[
    Feature::IslrRetentions,
    Feature::IvaRetentions,
    Feature::BasicReports,
    Feature::VoucherEmail,
    Feature::SeniatExports,
    Feature::ExcelExports,
    Feature::Backups,
    Feature::BulkOperations,
    Feature::MultiCompany,
];

impl LicenseTier {
    /// All tiers, in menu order.
    pub const ALL: [LicenseTier; 4] = [
        LicenseTier::Trial,
        LicenseTier::Basic,
        LicenseTier::Professional,
        LicenseTier::Enterprise,
    ];

    /// Wire name of the tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseTier::Trial => "trial",
            LicenseTier::Basic => "basic",
            LicenseTier::Professional => "professional",
            LicenseTier::Enterprise => "enterprise",
        }
    }

    /// Three-letter code used in license keys and activation codes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            LicenseTier::Trial => "TRL",
            LicenseTier::Basic => "BAS",
            LicenseTier::Professional => "PRO",
            LicenseTier::Enterprise => "ENT",
        }
    }

    /// Resolve a 1-based menu selection.
    #[must_use]
    pub fn from_menu_choice(choice: usize) -> Option<Self> {
        choice
            .checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Default policy for the tier.
    #[must_use]
    pub fn policy(&self) -> TierPolicy {
        match self {
            LicenseTier::Trial => TierPolicy {
                max_records: 100,
                max_users: 2,
                max_companies: 1,
                features: CORE_FEATURES,
            },
            LicenseTier::Basic => TierPolicy {
                max_records: 1_000,
                max_users: 3,
                max_companies: 1,
                features: BASIC_FEATURES,
            },
            LicenseTier::Professional => TierPolicy {
                max_records: 10_000,
                max_users: 10,
                max_companies: 3,
                features: PROFESSIONAL_FEATURES,
            },
            LicenseTier::Enterprise => TierPolicy {
                max_records: UNLIMITED,
                max_users: UNLIMITED,
                max_companies: UNLIMITED,
                features: &Feature::ALL,
            },
        }
    }
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trial" => Ok(LicenseTier::Trial),
            "basic" => Ok(LicenseTier::Basic),
            "professional" => Ok(LicenseTier::Professional),
            "enterprise" => Ok(LicenseTier::Enterprise),
            other => Err(format!("unknown license tier: {}", other)),
        }
    }
}
