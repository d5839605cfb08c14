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
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LicenseError, LicenseResult};
use crate::model::License;

/// File holding the verbatim contents of the active license.
pub const ACTIVE_LICENSE_FILE: &str = "active_license.json";
/// File holding the locally generated trial.
pub const TRIAL_FILE: &str = "trial.json";

/// Product-side persistence for the active license and the trial record.
///
/// License files are stored byte for byte as imported; the product never
/// rewrites a license, it only replaces which one is active.
#[derive(Debug, Clone)]
pub struct LicenseStore {
    dir: PathBuf,
}

impl LicenseStore {
    /// Store rooted at `dir` (created lazily).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the active license copy.
    #[must_use]
    pub fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_LICENSE_FILE)
    }

    /// Path of the trial record.
    #[must_use]
    pub fn trial_path(&self) -> PathBuf {
        self.dir.join(TRIAL_FILE)
    }

    /// Contents of the active license, if one was ever imported.
    pub fn load_active(&self) -> LicenseResult<Option<String>> {
        read_optional(&self.active_path())
    }

    /// Replace the active license with `contents`.
    pub fn save_active(&self, contents: &str) -> LicenseResult<PathBuf> {
        let path = self.active_path();
        write_atomic(&path, contents.as_bytes())?;
        debug!(path = %path.display(), "persisted active license");
        Ok(path)
    }

    /// Stored trial record, if a trial was started on this machine.
    pub fn load_trial(&self) -> LicenseResult<Option<License>> {
        match read_optional(&self.trial_path())? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| LicenseError::Format(format!("trial record: {err}"))),
            None => Ok(None),
        }
    }

    /// Persist the trial record.
    pub fn save_trial(&self, record: &License) -> LicenseResult<()> {
        let encoded = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.trial_path(), &encoded)
    }
}

fn read_optional(path: &Path) -> LicenseResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(LicenseError::io(path, err)),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> LicenseResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| LicenseError::io(parent, err))?;
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, bytes).map_err(|err| LicenseError::io(&staging, err))?;
    fs::rename(&staging, path).map_err(|err| LicenseError::io(path, err))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::trial::{TrialLicense, TrialPolicy};

    #[test]
    fn empty_store_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LicenseStore::new(dir.path().join("nested"));
        assert!(store.load_active().unwrap().is_none());
        assert!(store.load_trial().unwrap().is_none());
    }

    #[test]
    fn active_license_is_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = LicenseStore::new(dir.path());
        store.save_active("{ \"id\": \"first\" }\n").unwrap();
        store.save_active("{ \"id\": \"second\" }\n").unwrap();
        assert_eq!(
            store.load_active().unwrap().as_deref(),
            Some("{ \"id\": \"second\" }\n")
        );
        assert!(!store.active_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn trial_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LicenseStore::new(dir.path());
        let trial = TrialLicense::generate(TrialPolicy::default(), Utc::now());
        store.save_trial(trial.record()).unwrap();
        assert_eq!(store.load_trial().unwrap().as_ref(), Some(trial.record()));
    }

    #[test]
    fn corrupt_trial_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LicenseStore::new(dir.path());
        fs::write(store.trial_path(), "garbage").unwrap();
        assert!(matches!(store.load_trial(), Err(LicenseError::Format(_))));
    }
}
