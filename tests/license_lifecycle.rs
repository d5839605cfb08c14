//! ---
//! ret_section: "15-testing-qa-runbook"
//! ret_subsection: "integration-tests"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Integration and validation tests for the licensing stack."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::sync::Arc;

use ret_common::config::{AppConfig, IssuerConfig};
use ret_common::license::{issuer_from_config, start_license_service_with};
use ret_licensing::keys::{ensure_key_pair, PRIVATE_KEY_FILE};
use ret_licensing::{
    Feature, LicenseError, LicenseIssuer, LicenseRequest, LicenseTier, LicenseValidator,
    StaticUsage, TrustLevel,
};
use serde_json::Value;

fn vendor_and_product(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.issuer = IssuerConfig {
        key_dir: root.join("vendor/keys"),
        output_dir: root.join("vendor/issued"),
        issuer_name: "lifecycle".into(),
    };
    config.license.store_dir = root.join("product/license");
    config.logging.directory = root.join("logs");
    config
}

fn trusting(issuer: &LicenseIssuer) -> LicenseValidator {
    LicenseValidator::with_public_key(issuer.public_key_bytes())
}

fn professional_request() -> LicenseRequest {
    let mut request = LicenseRequest::new(
        "María González",
        "Inversiones del Caribe CA",
        "J-30987654-1",
        "maria@example.com",
        LicenseTier::Professional,
        12,
    );
    request.max_companies = Some(5);
    request
}

#[test]
fn vendor_issues_and_product_enforces() {
    let root = tempfile::tempdir().unwrap();
    let config = vendor_and_product(root.path());

    let issuer = issuer_from_config(&config.issuer).unwrap();
    let issued = issuer.issue(&professional_request()).unwrap();

    let usage = Arc::new(StaticUsage::new(2, 500, 4));
    let service = start_license_service_with(&config, trusting(&issuer), usage.clone());
    assert_eq!(service.trust(), TrustLevel::LocalUnverified);
    assert!(!service.has_feature(Feature::SeniatExports));

    let snapshot = service.import_file(&issued.path).unwrap();
    assert_eq!(snapshot.trust(), TrustLevel::IssuerSigned);
    assert!(snapshot.has_feature(Feature::SeniatExports));
    assert!(!snapshot.has_feature(Feature::ApiAccess));
    assert!(snapshot.can_add_companies());
    usage.set(2, 500, 5);
    assert!(!service.refresh_usage().unwrap().can_add_companies());
    assert!(snapshot.remaining_days() >= 365);
    assert!(snapshot.expiry_warning().is_none());

    let restarted = start_license_service_with(&config, trusting(&issuer), usage);
    assert_eq!(restarted.trust(), TrustLevel::IssuerSigned);
    assert_eq!(
        restarted.snapshot().entitlement.record().id,
        issued.license.id
    );
}

#[test]
fn tampered_file_is_refused_and_state_survives() {
    let root = tempfile::tempdir().unwrap();
    let config = vendor_and_product(root.path());
    let issuer = issuer_from_config(&config.issuer).unwrap();

    let genuine = issuer.issue(&professional_request()).unwrap();
    let service =
        start_license_service_with(&config, trusting(&issuer), Arc::new(StaticUsage::default()));
    service.import_file(&genuine.path).unwrap();

    let mut document: Value =
        serde_json::from_str(&fs::read_to_string(&genuine.path).unwrap()).unwrap();
    document["license"]["type"] = Value::from("enterprise");
    document["limits"]["maxRecords"] = Value::from(-1);
    let forged_path = root.path().join("forged.json");
    fs::write(&forged_path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

    let err = service.import_file(&forged_path).unwrap_err();
    assert!(matches!(err, LicenseError::Tamper(_)));
    assert!(err.user_message().contains("invalid"));
    let snapshot = service.snapshot();
    assert_eq!(snapshot.entitlement.tier(), LicenseTier::Professional);
    assert_eq!(snapshot.entitlement.record().limits.max_records, 10_000);

    let stored = service.store().load_active().unwrap().unwrap();
    assert_eq!(stored, fs::read_to_string(&genuine.path).unwrap());
}

#[test]
fn license_from_another_vendor_key_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let config = vendor_and_product(root.path());
    let trusted = issuer_from_config(&config.issuer).unwrap();

    let rogue_config = IssuerConfig {
        key_dir: root.path().join("rogue/keys"),
        output_dir: root.path().join("rogue/issued"),
        issuer_name: "rogue".into(),
    };
    let rogue = issuer_from_config(&rogue_config).unwrap().issue(&professional_request()).unwrap();

    let service =
        start_license_service_with(&config, trusting(&trusted), Arc::new(StaticUsage::default()));
    let err = service.import_file(&rogue.path).unwrap_err();
    assert!(matches!(err, LicenseError::Tamper(_)));
    assert_eq!(service.trust(), TrustLevel::LocalUnverified);
}

#[test]
fn key_pair_is_never_silently_rotated() {
    let root = tempfile::tempdir().unwrap();
    let key_dir = root.path().join("keys");
    let original = ensure_key_pair(&key_dir).unwrap();
    let again = ensure_key_pair(&key_dir).unwrap();
    assert_eq!(original.public_key_bytes(), again.public_key_bytes());

    fs::remove_file(key_dir.join(PRIVATE_KEY_FILE)).unwrap();
    assert!(matches!(
        ensure_key_pair(&key_dir),
        Err(LicenseError::Key(_))
    ));
}
