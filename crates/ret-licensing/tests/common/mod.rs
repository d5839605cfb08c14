//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "tests"
//! ret_type: "test"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Shared helpers for license integration tests.

#![allow(dead_code)]

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use ret_licensing::{LicenseIssuer, LicenseRequest, LicenseTier, LicenseValidator};

/// Deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, [u8; 32]) {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let public_key = signing_key.verifying_key().to_bytes();
    (signing_key, public_key)
}

pub fn test_issuer(output_dir: &Path) -> LicenseIssuer {
    let (signing_key, _) = test_keypair();
    LicenseIssuer::from_signing_key(signing_key, output_dir, "integration-tests")
}

pub fn test_validator() -> LicenseValidator {
    let (_, public_key) = test_keypair();
    LicenseValidator::with_public_key(public_key)
}

/// Basic tier, 12 months, for J-12345678-9.
pub fn basic_request() -> LicenseRequest {
    LicenseRequest::new(
        "Ana Pérez",
        "Servicios Contables CA",
        "J-12345678-9",
        "ana@example.com",
        LicenseTier::Basic,
        12,
    )
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}
