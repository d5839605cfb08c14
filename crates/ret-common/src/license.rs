//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Shared configuration, logging, and licensing glue."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{AppConfig, IssuerConfig, LicenseConfig};
use crate::logging::{log_system_event, LogContext, SystemEventOutcome};
use ret_licensing::{
    ensure_key_pair, LicenseIssuer, LicenseService, LicenseStore, LicenseValidator, TrialPolicy,
    UsageSource, UsageTracker,
};

/// Validator used by the product. It only trusts the embedded issuer key.
#[must_use]
pub fn product_validator() -> LicenseValidator {
    let validator = LicenseValidator::default();
    debug!(public_key = %validator.public_key_base64(), "trusting embedded issuer key");
    validator
}

/// Trial parameters from configuration.
#[must_use]
pub fn trial_policy(config: &LicenseConfig) -> TrialPolicy {
    TrialPolicy {
        days: config.trial_days,
    }
}

/// Issuer backed by the key pair in `issuer.key_dir`, generated on first use.
pub fn issuer_from_config(config: &IssuerConfig) -> Result<LicenseIssuer> {
    let key_pair = ensure_key_pair(&config.key_dir).with_context(|| {
        format!("unable to prepare signing keys in {}", config.key_dir.display())
    })?;
    info!(
        key_dir = %config.key_dir.display(),
        fingerprint = %key_pair.fingerprint(),
        "issuer signing key ready"
    );
    Ok(LicenseIssuer::new(
        &key_pair,
        &config.output_dir,
        config.issuer_name.trim(),
    ))
}

/// Bootstrap the product-side license service from configuration.
#[must_use]
pub fn start_license_service(config: &AppConfig, usage: Arc<dyn UsageSource>) -> LicenseService {
    start_license_service_with(config, product_validator(), usage)
}

/// [`start_license_service`] with an explicit validator, for vendor tooling
/// that checks licenses against its own key pair.
#[must_use]
pub fn start_license_service_with(
    config: &AppConfig,
    validator: LicenseValidator,
    usage: Arc<dyn UsageSource>,
) -> LicenseService {
    let tracker = UsageTracker::new(usage).with_cache_ttl(config.usage.cache_ttl);
    let service = LicenseService::bootstrap(
        validator,
        LicenseStore::new(&config.license.store_dir),
        tracker,
        trial_policy(&config.license),
    );

    let snapshot = service.snapshot();
    let record = snapshot.entitlement.record();
    let tier = record.tier().to_string();
    let ctx = LogContext::new()
        .with_license_id(&record.id)
        .with_tier(&tier)
        .with_client(&record.client.company);
    let outcome = if snapshot.is_expired() {
        SystemEventOutcome::Fault
    } else {
        SystemEventOutcome::Success
    };
    log_system_event(
        Some(&ctx),
        "license.bootstrap",
        &format!("entitlement active ({})", snapshot.trust()),
        outcome,
    );
    service
}
