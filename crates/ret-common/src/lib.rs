//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Shared configuration, logging, and licensing glue."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Shared primitives for the Retenciones licensing binaries.
//! This crate exposes configuration loading, tracing setup, and the glue
//! that turns configuration into issuers, validators, and license services.

pub mod config;
pub mod license;
pub mod logging;

pub use config::{AppConfig, IssuerConfig, LicenseConfig, LoadedAppConfig, LoggingConfig, UsageConfig};
pub use license::{
    issuer_from_config, product_validator, start_license_service, start_license_service_with,
    trial_policy,
};
pub use logging::{init_tracing, log_system_event, LogContext, LogFormat, SystemEventOutcome};
