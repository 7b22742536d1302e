//! Shared stage cache.
//!
//! Multiple consumers opening the same description within one session
//! should share the underlying stage object. The cache is keyed by a
//! content fingerprint — the resolved identifier plus a modification
//! token — rather than pointer identity, and hands out shared,
//! reference-counted handles. Sharing scope: a handle stays live for
//! as long as any consumer holds it; evicting a fingerprint only
//! drops the cache's own reference.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::stage::stage::Stage;

/// Shared, mutex-guarded handle to a stage.
pub type StageHandle = Arc<Mutex<Stage>>;

/// Content fingerprint identifying one openable description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageFingerprint {
    /// Resolved identifier (e.g. a resolved file path).
    pub identifier: String,
    /// Modification token of the content at open time.
    pub token: u64,
}

impl StageFingerprint {
    #[must_use]
    pub fn new(identifier: &str, token: u64) -> Self {
        Self {
            identifier: identifier.to_string(),
            token,
        }
    }
}

/// Fingerprint-keyed cache of open stages.
#[derive(Default)]
pub struct StageCache {
    entries: FxHashMap<StageFingerprint, StageHandle>,
}

impl StageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly opened stage under its fingerprint and
    /// returns the shared handle.
    pub fn insert(&mut self, fingerprint: StageFingerprint, stage: Stage) -> StageHandle {
        let handle: StageHandle = Arc::new(Mutex::new(stage));
        self.entries.insert(fingerprint, Arc::clone(&handle));
        handle
    }

    /// Returns the shared handle for a fingerprint, if one is cached.
    /// Consumers acquiring the same fingerprint share one stage.
    #[must_use]
    pub fn acquire(&self, fingerprint: &StageFingerprint) -> Option<StageHandle> {
        self.entries.get(fingerprint).map(Arc::clone)
    }

    /// Drops the cache's reference for a fingerprint. Outstanding
    /// handles keep the stage alive.
    pub fn evict(&mut self, fingerprint: &StageFingerprint) {
        self.entries.remove(fingerprint);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
