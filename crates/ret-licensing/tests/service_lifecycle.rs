//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "tests"
//! ret_type: "test"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
mod common;

use std::fs;
use std::sync::Arc;

use common::{basic_request, test_issuer, test_validator, utc};
use ret_licensing::{
    Feature, LicenseError, LicenseService, LicenseStore, StaticUsage, TrialPolicy, TrustLevel,
    UsageTracker,
};

fn service(store_dir: &std::path::Path, usage: Arc<StaticUsage>) -> LicenseService {
    LicenseService::bootstrap_at(
        test_validator(),
        LicenseStore::new(store_dir),
        UsageTracker::new(usage),
        TrialPolicy::default(),
        utc(2025, 1, 1),
    )
}

#[test]
fn trial_then_import_then_quota() {
    let issued_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let usage = Arc::new(StaticUsage::new(1, 99, 1));
    let service = service(store_dir.path(), usage.clone());

    let trial = service.snapshot();
    assert_eq!(trial.trust(), TrustLevel::LocalUnverified);
    assert!(trial.can_create_records_at(utc(2025, 1, 2)));
    assert!(!trial.has_feature_at(Feature::VoucherEmail, utc(2025, 1, 2)));
    usage.set(1, 100, 1);
    let trial = service.refresh_usage().unwrap();
    assert!(!trial.can_create_records_at(utc(2025, 1, 2)));

    let issued = test_issuer(issued_dir.path())
        .issue_at(&basic_request(), utc(2025, 1, 1))
        .unwrap();
    let contents = fs::read_to_string(&issued.path).unwrap();
    let active = service.import_at(&contents, utc(2025, 1, 2)).unwrap();
    assert_eq!(active.trust(), TrustLevel::IssuerSigned);
    assert!(active.can_create_records_at(utc(2025, 1, 2)));
    assert!(active.has_feature_at(Feature::VoucherEmail, utc(2025, 1, 2)));
    assert_eq!(active.usage.records, 100);
}

#[test]
fn failed_import_from_disk_leaves_trial_in_place() {
    let store_dir = tempfile::tempdir().unwrap();
    let service = service(store_dir.path(), Arc::new(StaticUsage::default()));
    let missing = store_dir.path().join("nope.json");
    let err = service.import_file(&missing).unwrap_err();
    assert!(matches!(err, LicenseError::Io { .. }));
    assert!(err.user_message().contains("could not be read"));
    assert_eq!(service.trust(), TrustLevel::LocalUnverified);
    assert!(service.store().load_active().unwrap().is_none());
}

#[test]
fn concurrent_readers_see_whole_snapshots() {
    let issued_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let service = Arc::new(service(store_dir.path(), Arc::new(StaticUsage::default())));
    let issued = test_issuer(issued_dir.path())
        .issue_at(&basic_request(), utc(2025, 1, 1))
        .unwrap();
    let contents = fs::read_to_string(&issued.path).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = service.snapshot();
                    let record = snapshot.entitlement.record();
                    let consistent = match snapshot.trust() {
                        TrustLevel::LocalUnverified => record.limits.max_records == 100,
                        TrustLevel::IssuerSigned => record.limits.max_records == 1000,
                    };
                    assert!(consistent);
                }
            })
        })
        .collect();
    service.import_at(&contents, utc(2025, 1, 2)).unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
