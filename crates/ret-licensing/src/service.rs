//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::entitlement::{Entitlement, EntitlementSnapshot, ExpiryWarning, TrustLevel};
use crate::error::{LicenseError, LicenseResult};
use crate::features::Feature;
use crate::store::LicenseStore;
use crate::trial::{TrialLicense, TrialPolicy};
use crate::usage::{UsageSnapshot, UsageTracker};
use crate::validator::LicenseValidator;

/// Process-wide owner of the entitlement state.
///
/// Readers take a cheap [`Arc`] clone of the current snapshot. Writers build
/// a complete replacement and swap it in under the write lock.
#[derive(Debug)]
pub struct LicenseService {
    validator: LicenseValidator,
    store: LicenseStore,
    usage: UsageTracker,
    state: RwLock<Arc<EntitlementSnapshot>>,
}

impl LicenseService {
    /// Load the persisted license, or fall back to the local trial.
    #[must_use]
    pub fn bootstrap(
        validator: LicenseValidator,
        store: LicenseStore,
        usage: UsageTracker,
        trial_policy: TrialPolicy,
    ) -> Self {
        Self::bootstrap_at(validator, store, usage, trial_policy, Utc::now())
    }

    /// [`Self::bootstrap`] with an explicit clock.
    #[must_use]
    pub fn bootstrap_at(
        validator: LicenseValidator,
        store: LicenseStore,
        usage: UsageTracker,
        trial_policy: TrialPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let entitlement = startup_entitlement(&validator, &store, trial_policy, now);
        let counts = usage.snapshot().unwrap_or_else(|err| {
            warn!(error = %err, "usage unavailable at startup, assuming an empty store");
            UsageSnapshot::default()
        });
        info!(
            license_id = %entitlement.record().id,
            tier = %entitlement.tier(),
            trust = %entitlement.trust(),
            expires_at = %entitlement.expires_at(),
            "entitlement installed"
        );
        Self {
            validator,
            store,
            usage,
            state: RwLock::new(Arc::new(EntitlementSnapshot::new(entitlement, counts))),
        }
    }

    /// Current entitlement state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        self.state.read().clone()
    }

    /// Validate and activate a license from its file contents.
    ///
    /// On failure the previous state stays active and the typed error is
    /// returned for display.
    pub fn import(&self, contents: &str) -> LicenseResult<Arc<EntitlementSnapshot>> {
        self.import_at(contents, Utc::now())
    }

    /// [`Self::import`] with an explicit clock.
    pub fn import_at(
        &self,
        contents: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<Arc<EntitlementSnapshot>> {
        let verified = self.validator.load_at(contents, now).map_err(|err| {
            warn!(reason = err.kind(), error = %err, "license import rejected, keeping current entitlement");
            err
        })?;
        self.store.save_active(contents)?;

        let mut state = self.state.write();
        let next = Arc::new(EntitlementSnapshot::new(
            Entitlement::Verified(verified),
            state.usage.clone(),
        ));
        *state = Arc::clone(&next);
        info!(
            license_id = %next.entitlement.record().id,
            tier = %next.entitlement.tier(),
            "license imported"
        );
        Ok(next)
    }

    /// Validate and activate the license file at `path`.
    pub fn import_file(&self, path: impl AsRef<Path>) -> LicenseResult<Arc<EntitlementSnapshot>> {
        let path = path.as_ref();
        debug!(path = %path.display(), "importing license file");
        let contents = fs::read_to_string(path).map_err(|err| LicenseError::io(path, err))?;
        self.import(&contents)
    }

    /// Recount usage and publish a snapshot carrying the new counts.
    pub fn refresh_usage(&self) -> LicenseResult<Arc<EntitlementSnapshot>> {
        let counts = self.usage.snapshot()?;
        let mut state = self.state.write();
        let next = Arc::new(state.with_usage(counts));
        *state = Arc::clone(&next);
        Ok(next)
    }

    /// Usage tracker backing the quota checks.
    #[must_use]
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Persistent store.
    #[must_use]
    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    /// Trust level of the active license.
    #[must_use]
    pub fn trust(&self) -> TrustLevel {
        self.snapshot().trust()
    }

    /// See [`EntitlementSnapshot::has_feature`].
    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.snapshot().has_feature(feature)
    }

    /// See [`EntitlementSnapshot::can_create_records`].
    #[must_use]
    pub fn can_create_records(&self) -> bool {
        self.snapshot().can_create_records()
    }

    /// See [`EntitlementSnapshot::can_add_users`].
    #[must_use]
    pub fn can_add_users(&self) -> bool {
        self.snapshot().can_add_users()
    }

    /// See [`EntitlementSnapshot::can_add_companies`].
    #[must_use]
    pub fn can_add_companies(&self) -> bool {
        self.snapshot().can_add_companies()
    }

    /// See [`EntitlementSnapshot::remaining_days`].
    #[must_use]
    pub fn remaining_days(&self) -> i64 {
        self.snapshot().remaining_days()
    }

    /// See [`EntitlementSnapshot::expiry_warning`].
    #[must_use]
    pub fn expiry_warning(&self) -> Option<ExpiryWarning> {
        self.snapshot().expiry_warning()
    }
}

fn startup_entitlement(
    validator: &LicenseValidator,
    store: &LicenseStore,
    trial_policy: TrialPolicy,
    now: DateTime<Utc>,
) -> Entitlement {
    match store.load_active() {
        Ok(Some(contents)) => match validator.load_at(&contents, now) {
            Ok(license) => return Entitlement::Verified(license),
            Err(LicenseError::Expired {
                expired_at,
                license,
            }) => {
                warn!(%expired_at, "stored license has expired");
                return Entitlement::Verified(*license);
            }
            Err(err) => {
                warn!(reason = err.kind(), error = %err, "stored license rejected, falling back to trial");
            }
        },
        Ok(None) => debug!("no stored license, using trial"),
        Err(err) => warn!(error = %err, "stored license unreadable, falling back to trial"),
    }
    Entitlement::Unverified(load_or_start_trial(store, trial_policy, now))
}

fn load_or_start_trial(store: &LicenseStore, policy: TrialPolicy, now: DateTime<Utc>) -> TrialLicense {
    match store.load_trial() {
        Ok(Some(record)) => return TrialLicense::from_record(record, policy),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "trial record unusable, starting a new trial"),
    }

    let trial = TrialLicense::generate(policy, now);
    if let Err(err) = store.save_trial(trial.record()) {
        warn!(error = %err, "could not persist trial record");
    }
    info!(
        trial_id = %trial.record().id,
        expires_at = %trial.record().expires_at(),
        "trial started"
    );
    trial
}
