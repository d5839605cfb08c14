//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use tracing::{info, warn};

use crate::entitlement::VerifiedLicense;
use crate::error::LicenseError;
use crate::model::License;

static LICENSES_ISSUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "licenses_issued_total",
        "Total number of license files issued"
    )
    .expect("metric registration to succeed")
});

static LICENSE_ISSUE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "license_issue_failures_total",
        "Total number of license issuances that failed",
        &["reason"]
    )
    .expect("metric registration to succeed")
});

static LICENSE_LOADS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "license_loads_total",
        "Total number of license loads that succeeded"
    )
    .expect("metric registration to succeed")
});

static LICENSE_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "license_rejections_total",
        "Total number of license loads rejected by the validator",
        &["reason"]
    )
    .expect("metric registration to succeed")
});

/// Record a successful issuance.
pub fn record_license_issued(license: &License, path: &Path) {
    LICENSES_ISSUED_TOTAL.inc();
    info!(
        license_id = %license.id,
        license_key = %license.metadata.license_key,
        tier = %license.terms.tier,
        company = %license.client.company,
        expires_at = %license.terms.expiry_date,
        path = %path.display(),
        "license issued"
    );
}

/// Record a failed issuance.
pub fn record_issue_failure(err: &LicenseError) {
    LICENSE_ISSUE_FAILURES_TOTAL
        .with_label_values(&[err.kind()])
        .inc();
    warn!(reason = err.kind(), error = %err, "license issuance failed");
}

/// Record a successful license validation event.
pub fn record_license_load(license: &VerifiedLicense) {
    LICENSE_LOADS_TOTAL.inc();
    let record = license.record();
    info!(
        license_id = %record.id,
        company = %record.client.company,
        tier = %record.terms.tier,
        expires_at = %record.terms.expiry_date,
        "license accepted"
    );
}

/// Record a license the validator refused.
pub fn record_rejected_license(err: &LicenseError) {
    LICENSE_REJECTIONS_TOTAL
        .with_label_values(&[err.kind()])
        .inc();
    info!(reason = err.kind(), error = %err, "license rejected");
}
