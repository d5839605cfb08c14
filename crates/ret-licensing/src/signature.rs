//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::codec::SigningPayload;
use crate::error::{LicenseError, LicenseResult, TamperKind};
use crate::model::License;

/// Sign the canonical payload of `license`, returning a base64 signature.
pub fn sign_license(license: &License, key: &SigningKey) -> LicenseResult<String> {
    let payload = SigningPayload::from_license(license).signable_bytes()?;
    let signature = key.sign(&payload);
    Ok(general_purpose::STANDARD.encode(signature.to_bytes()))
}

/// Verify the signature of `license` using the provided public key bytes.
pub fn verify_license(license: &License, public_key: &[u8; 32]) -> LicenseResult<()> {
    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|err| LicenseError::Key(format!("invalid public key material: {err}")))?;
    let signature_bytes = general_purpose::STANDARD
        .decode(license.security.signature.trim())
        .map_err(|_| LicenseError::Tamper(TamperKind::MalformedSignature))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|_| LicenseError::Tamper(TamperKind::MalformedSignature))?;
    let payload = SigningPayload::from_license(license).signable_bytes()?;

    key.verify_strict(&payload, &signature)
        .map_err(|_| LicenseError::Tamper(TamperKind::Signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fixtures::unsigned_license;
    use crate::tier::LicenseTier;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn signature_round_trips() {
        let key = test_key();
        let mut license = unsigned_license();
        license.security.signature = sign_license(&license, &key).unwrap();
        verify_license(&license, &key.verifying_key().to_bytes()).unwrap();
    }

    #[test]
    fn modified_tier_fails_verification() {
        let key = test_key();
        let mut license = unsigned_license();
        license.security.signature = sign_license(&license, &key).unwrap();
        license.terms.tier = LicenseTier::Enterprise;
        let err = verify_license(&license, &key.verifying_key().to_bytes()).unwrap_err();
        assert!(matches!(err, LicenseError::Tamper(TamperKind::Signature)));
    }

    #[test]
    fn foreign_key_fails_verification() {
        let mut license = unsigned_license();
        license.security.signature = sign_license(&license, &test_key()).unwrap();
        let other = SigningKey::from_bytes(&[9u8; 32]).verifying_key().to_bytes();
        assert!(matches!(
            verify_license(&license, &other),
            Err(LicenseError::Tamper(TamperKind::Signature))
        ));
    }

    #[test]
    fn garbage_signature_is_malformed() {
        let mut license = unsigned_license();
        license.security.signature = "not-base64!!".to_owned();
        let key = test_key().verifying_key().to_bytes();
        assert!(matches!(
            verify_license(&license, &key),
            Err(LicenseError::Tamper(TamperKind::MalformedSignature))
        ));
        license.security.signature = general_purpose::STANDARD.encode([1u8; 10]);
        assert!(matches!(
            verify_license(&license, &key),
            Err(LicenseError::Tamper(TamperKind::MalformedSignature))
        ));
    }
}
