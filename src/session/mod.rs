//! Scanning sessions.
//!
//! A session owns one [`CaptureCache`] for as long as the camera is active.
//! The frame-producing path and the host's command path both get a handle to
//! the same cache via [`ScanSession::cache`]; ending the session clears it.
//!
//! # Architecture
//!
//! * [`script`]: serializable replay scripts and reports.
//! * [`replay`]: runs a script against a session, step by step.

pub mod replay;
pub mod script;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::{CacheStats, CaptureCache, CaptureResult, StoragePolicy};

pub use replay::replay;
pub use script::{ReplayReport, Script, Step, StepOutcome, StepReport, SCRIPT_VERSION};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One active scanning session and its capture cache.
#[derive(Debug)]
pub struct ScanSession {
    id: u64,
    started_at: DateTime<Utc>,
    cache: Arc<CaptureCache>,
}

impl ScanSession {
    /// Start a session with a fresh cache using `policy`.
    #[must_use]
    pub fn start(policy: StoragePolicy) -> Self {
        Self::with_cache(Arc::new(CaptureCache::new(policy)))
    }

    /// Start a session around an existing cache.
    #[must_use]
    pub fn with_cache(cache: Arc<CaptureCache>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        log::info!("Scan session {} started ({} storage)", id, cache.policy());
        Self {
            id,
            started_at: Utc::now(),
            cache,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Shared handle to the session's cache.
    #[must_use]
    pub fn cache(&self) -> Arc<CaptureCache> {
        Arc::clone(&self.cache)
    }

    /// End the session: clear the cache and return its final counters.
    ///
    /// # Errors
    ///
    /// Returns the error from [`CaptureCache::clear`] if stored images could
    /// not be removed.
    pub fn end(self) -> CaptureResult<CacheStats> {
        let stats = self.cache.stats();
        self.cache.clear()?;
        log::info!(
            "Scan session {} ended: {} stored, {} duplicate detections skipped",
            self.id,
            stats.stored,
            stats.already_captured
        );
        Ok(stats)
    }

    /// End the session but leave its captured images in place.
    #[must_use]
    pub fn detach(self) -> Arc<CaptureCache> {
        log::info!("Scan session {} detached; captured images kept", self.id);
        self.cache
    }
}
