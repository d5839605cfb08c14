//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "License issuance, validation, and entitlement enforcement."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
//! Usage counts read from the accounting record store.
//!
//! Counts are recomputed from the store on demand; nothing here keeps a
//! ledger of its own. Full recounts scan the store, so callers hold one
//! [`UsageSession`] per UI interaction or rely on [`UsageTracker::snapshot_cached`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::{LicenseError, LicenseResult};

/// Read-only query surface over the accounting data store.
pub trait UsageSource: Send + Sync {
    /// Number of users allowed to sign in.
    fn active_users(&self) -> anyhow::Result<u64>;
    /// Number of stored withholding records.
    fn stored_records(&self) -> anyhow::Result<u64>;
    /// Number of configured companies.
    fn configured_companies(&self) -> anyhow::Result<u64>;
}

/// Usage counts at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Active users.
    pub users: u64,
    /// Stored records.
    pub records: u64,
    /// Configured companies.
    pub companies: u64,
    /// When the counts were taken; `None` before the first count.
    pub taken_at: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    /// Snapshot with explicit counts taken now.
    #[must_use]
    pub fn new(users: u64, records: u64, companies: u64) -> Self {
        Self {
            users,
            records,
            companies,
            taken_at: Some(Utc::now()),
        }
    }
}

/// Recomputes [`UsageSnapshot`]s from a [`UsageSource`].
pub struct UsageTracker {
    source: Arc<dyn UsageSource>,
    cache_ttl: Duration,
    last: Mutex<Option<UsageSnapshot>>,
}

impl fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageTracker")
            .field("cache_ttl", &self.cache_ttl)
            .field("last", &*self.last.lock())
            .finish_non_exhaustive()
    }
}

impl UsageTracker {
    /// Tracker without caching between calls to [`Self::snapshot_cached`].
    #[must_use]
    pub fn new(source: Arc<dyn UsageSource>) -> Self {
        Self {
            source,
            cache_ttl: Duration::ZERO,
            last: Mutex::new(None),
        }
    }

    /// Reuse snapshots younger than `ttl` in [`Self::snapshot_cached`].
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Count users, records, and companies now.
    pub fn snapshot(&self) -> LicenseResult<UsageSnapshot> {
        let users = self.source.active_users().map_err(usage_error)?;
        let records = self.source.stored_records().map_err(usage_error)?;
        let companies = self.source.configured_companies().map_err(usage_error)?;
        let snapshot = UsageSnapshot::new(users, records, companies);
        debug!(users, records, companies, "usage recomputed");
        *self.last.lock() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Last snapshot if it is younger than the cache TTL, otherwise a fresh one.
    pub fn snapshot_cached(&self) -> LicenseResult<UsageSnapshot> {
        if let Some(cached) = self.last.lock().as_ref() {
            let fresh = cached.taken_at.map_or(false, |taken_at| {
                (Utc::now() - taken_at)
                    .to_std()
                    .map_or(true, |age| age < self.cache_ttl)
            });
            if fresh {
                return Ok(cached.clone());
            }
        }
        self.snapshot()
    }

    /// Memoising view for a single interaction.
    #[must_use]
    pub fn session(&self) -> UsageSession<'_> {
        UsageSession {
            tracker: self,
            memo: OnceCell::new(),
        }
    }
}

/// Computes usage at most once, on first request.
#[derive(Debug)]
pub struct UsageSession<'a> {
    tracker: &'a UsageTracker,
    memo: OnceCell<UsageSnapshot>,
}

impl UsageSession<'_> {
    /// The session's snapshot, counting on first access.
    pub fn snapshot(&self) -> LicenseResult<&UsageSnapshot> {
        self.memo.get_or_try_init(|| self.tracker.snapshot())
    }
}

fn usage_error(err: anyhow::Error) -> LicenseError {
    LicenseError::Usage(format!("{err:#}"))
}

/// In-memory usage source for hosts without a record store and for tests.
#[derive(Debug, Default)]
pub struct StaticUsage {
    users: AtomicU64,
    records: AtomicU64,
    companies: AtomicU64,
    queries: AtomicU64,
}

impl StaticUsage {
    /// Source reporting fixed counts.
    #[must_use]
    pub fn new(users: u64, records: u64, companies: u64) -> Self {
        Self {
            users: AtomicU64::new(users),
            records: AtomicU64::new(records),
            companies: AtomicU64::new(companies),
            queries: AtomicU64::new(0),
        }
    }

    /// Replace the reported counts.
    pub fn set(&self, users: u64, records: u64, companies: u64) {
        self.users.store(users, Ordering::SeqCst);
        self.records.store(records, Ordering::SeqCst);
        self.companies.store(companies, Ordering::SeqCst);
    }

    /// Number of full recounts served so far.
    #[must_use]
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

impl UsageSource for StaticUsage {
    fn active_users(&self) -> anyhow::Result<u64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.load(Ordering::SeqCst))
    }

    fn stored_records(&self) -> anyhow::Result<u64> {
        Ok(self.records.load(Ordering::SeqCst))
    }

    fn configured_companies(&self) -> anyhow::Result<u64> {
        Ok(self.companies.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl UsageSource for BrokenStore {
        fn active_users(&self) -> anyhow::Result<u64> {
            Err(anyhow::anyhow!("database locked"))
        }
        fn stored_records(&self) -> anyhow::Result<u64> {
            Ok(0)
        }
        fn configured_companies(&self) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn snapshot_reflects_current_store() {
        let source = Arc::new(StaticUsage::new(1, 10, 1));
        let tracker = UsageTracker::new(source.clone());
        assert_eq!(tracker.snapshot().unwrap().records, 10);
        source.set(2, 11, 1);
        let snapshot = tracker.snapshot().unwrap();
        assert_eq!((snapshot.users, snapshot.records), (2, 11));
        assert!(snapshot.taken_at.is_some());
    }

    #[test]
    fn session_counts_once() {
        let source = Arc::new(StaticUsage::new(1, 10, 1));
        let tracker = UsageTracker::new(source.clone());
        let session = tracker.session();
        for _ in 0..5 {
            assert_eq!(session.snapshot().unwrap().records, 10);
        }
        assert_eq!(source.queries(), 1);
    }

    #[test]
    fn cached_snapshot_respects_ttl() {
        let source = Arc::new(StaticUsage::new(1, 10, 1));
        let tracker = UsageTracker::new(source.clone()).with_cache_ttl(Duration::from_secs(600));
        tracker.snapshot_cached().unwrap();
        source.set(1, 99, 1);
        assert_eq!(tracker.snapshot_cached().unwrap().records, 10);
        assert_eq!(tracker.snapshot().unwrap().records, 99);

        let uncached = UsageTracker::new(source.clone());
        uncached.snapshot_cached().unwrap();
        source.set(1, 5, 1);
        assert_eq!(uncached.snapshot_cached().unwrap().records, 5);
    }

    #[test]
    fn store_failures_surface_as_usage_errors() {
        let tracker = UsageTracker::new(Arc::new(BrokenStore));
        let err = tracker.snapshot().unwrap_err();
        assert!(matches!(err, LicenseError::Usage(ref msg) if msg.contains("database locked")));
    }
}
