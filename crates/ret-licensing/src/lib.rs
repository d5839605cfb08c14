//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Retenciones licensing crate.
//!
//! The vendor side holds an Ed25519 signing key and mints signed license
//! files through [`issuer::LicenseIssuer`]. The product embeds only the
//! matching public key, loads license files through the fixed
//! [`validator::LicenseValidator`] pipeline, and answers capability and quota
//! questions through the [`service::LicenseService`] snapshots.

pub mod codec;
pub mod entitlement;
pub mod error;
pub mod features;
pub mod issuer;
pub mod keys;
pub mod model;
pub mod service;
pub mod signature;
pub mod store;
pub mod telemetry;
pub mod tier;
pub mod trial;
pub mod usage;
pub mod validator;

pub use entitlement::{
    Entitlement, EntitlementSnapshot, ExpiryWarning, Severity, TrustLevel, VerifiedLicense,
    EXPIRY_WARNING_DAYS,
};
pub use error::{LicenseError, LicenseResult, TamperKind, ValidationErrors};
pub use features::{Feature, FeatureMatrix};
pub use issuer::{BatchOutcome, IssuedLicense, LicenseIssuer};
pub use keys::{embedded_public_key, ensure_key_pair, KeyPair};
pub use model::{License, LicenseLimits, LicenseRequest, LicenseStatus};
pub use service::LicenseService;
pub use store::LicenseStore;
pub use tier::{LicenseTier, TierPolicy, UNLIMITED};
pub use trial::{TrialLicense, TrialPolicy};
pub use usage::{StaticUsage, UsageSession, UsageSnapshot, UsageSource, UsageTracker};
pub use validator::LicenseValidator;
