//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tier::LicenseTier;

/// Enumeration of license-gated capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// ISLR (income tax) withholding vouchers.
    IslrRetentions,
    /// IVA (value added tax) withholding vouchers.
    IvaRetentions,
    /// Monthly summary reports.
    BasicReports,
    /// Delivery of withholding vouchers by email.
    VoucherEmail,
    /// SENIAT declaration exports (XML/TXT).
    SeniatExports,
    /// Spreadsheet exports.
    ExcelExports,
    /// Database backups and restore.
    Backups,
    /// Bulk import and batch edits.
    BulkOperations,
    /// More than one company per installation.
    MultiCompany,
    /// Custom and consolidated reports.
    AdvancedReports,
    /// Programmatic access for integrations.
    ApiAccess,
    /// Priority vendor support channel.
    PrioritySupport,
}

impl Feature {
    /// Every gated capability.
    pub const ALL: [Feature; 12] = [
        Feature::IslrRetentions,
        Feature::IvaRetentions,
        Feature::BasicReports,
        Feature::VoucherEmail,
        Feature::SeniatExports,
        Feature::ExcelExports,
        Feature::Backups,
        Feature::BulkOperations,
        Feature::MultiCompany,
        Feature::AdvancedReports,
        Feature::ApiAccess,
        Feature::PrioritySupport,
    ];

    /// Stable tag used in license files.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::IslrRetentions => "islr_retentions",
            Feature::IvaRetentions => "iva_retentions",
            Feature::BasicReports => "basic_reports",
            Feature::VoucherEmail => "voucher_email",
            Feature::SeniatExports => "seniat_exports",
            Feature::ExcelExports => "excel_exports",
            Feature::Backups => "backups",
            Feature::BulkOperations => "bulk_operations",
            Feature::MultiCompany => "multi_company",
            Feature::AdvancedReports => "advanced_reports",
            Feature::ApiAccess => "api_access",
            Feature::PrioritySupport => "priority_support",
        }
    }

    /// Look up a feature by its tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == tag)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matrix mapping every feature to its enabled state for one license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMatrix {
    inner: BTreeMap<Feature, bool>,
}

impl FeatureMatrix {
    /// Construct a matrix from the tags stored in a license and its tier.
    ///
    /// Enterprise licenses enable everything regardless of `raw`. When `raw`
    /// is absent the tier defaults apply. Unknown tags are ignored.
    #[must_use]
    pub fn from_tags(raw: Option<&[String]>, tier: LicenseTier) -> Self {
        let mut inner: BTreeMap<Feature, bool> =
            Feature::ALL.iter().map(|feature| (*feature, false)).collect();

        if matches!(tier, LicenseTier::Enterprise) {
            inner.values_mut().for_each(|enabled| *enabled = true);
            return Self { inner };
        }

        match raw {
            Some(tags) => {
                for tag in tags {
                    match Feature::from_tag(tag) {
                        Some(feature) => {
                            inner.insert(feature, true);
                        }
                        None => warn!(tag = %tag, "ignoring unknown feature tag"),
                    }
                }
            }
            None => {
                for feature in tier.policy().features {
                    inner.insert(*feature, true);
                }
            }
        }

        Self { inner }
    }

    /// Tier defaults with no per-license overrides.
    #[must_use]
    pub fn for_tier(tier: LicenseTier) -> Self {
        Self::from_tags(None, tier)
    }

    /// Returns true if the feature is enabled.
    #[must_use]
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.inner.get(&feature).copied().unwrap_or(false)
    }

    /// Enabled features in stable order.
    pub fn enabled(&self) -> impl Iterator<Item = Feature> + '_ {
        self.inner
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(feature, _)| *feature)
    }

    /// Returns a serialisable map representation.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.inner
            .iter()
            .map(|(feature, enabled)| (feature.as_str().to_owned(), *enabled))
            .collect()
    }
}

/// Tags for a tier's default feature set, as written into license files.
#[must_use]
pub fn default_tags(tier: LicenseTier) -> Vec<String> {
    tier.policy()
        .features
        .iter()
        .map(|feature| feature.as_str().to_owned())
        .collect()
}
