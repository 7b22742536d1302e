//! Reference-counted required-path registry.
//!
//! A scene path is "required" when a native node must exist for it:
//! because it is an ancestor of a live schema prim, because an
//! external consumer selected it, or because a translator holds a
//! reference to it. Each entry tracks the three reasons with separate
//! counters and records the backing native node. The table is the
//! single source of truth for "is this still needed" — node
//! creation/destruction itself is delegated to the host graph.
//!
//! Entries whose three counters all reach zero are NOT removed
//! eagerly; they linger until the next [`RequiredPathTable::cleanup`]
//! pass so that code earlier in the same resync pass never loses an
//! entry it is still referencing.

use rustc_hash::FxHashMap;

use crate::graph::NativeNode;
use crate::path::ScenePath;

/// Why a path is being acquired or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireReason {
    /// Structural requirement: ancestor of a live schema prim.
    Required,
    /// Explicit external selection.
    Selected,
    /// A translator holds a reference.
    TranslatorRef,
}

/// Per-path entry: the backing node plus one counter per reason.
#[derive(Debug, Clone, Default)]
pub struct RequiredPathEntry {
    pub node: Option<NativeNode>,
    pub required: u32,
    pub selected: u32,
    pub translator_refs: u32,
}

impl RequiredPathEntry {
    fn counter_mut(&mut self, reason: AcquireReason) -> &mut u32 {
        match reason {
            AcquireReason::Required => &mut self.required,
            AcquireReason::Selected => &mut self.selected,
            AcquireReason::TranslatorRef => &mut self.translator_refs,
        }
    }

    /// The counter for one reason.
    #[must_use]
    pub fn count(&self, reason: AcquireReason) -> u32 {
        match reason {
            AcquireReason::Required => self.required,
            AcquireReason::Selected => self.selected,
            AcquireReason::TranslatorRef => self.translator_refs,
        }
    }

    /// True when all three counters are zero — eligible for removal
    /// by the next cleanup pass.
    #[must_use]
    pub fn is_unreferenced(&self) -> bool {
        self.required == 0 && self.selected == 0 && self.translator_refs == 0
    }
}

/// Reference-counted registry mapping scene paths to native nodes.
#[derive(Default)]
pub struct RequiredPathTable {
    entries: FxHashMap<ScenePath, RequiredPathEntry>,
    locked: bool,
}

impl RequiredPathTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter for `reason`, creating the entry (with
    /// a null node) if absent. Returns the new count.
    pub fn acquire(&mut self, path: &ScenePath, reason: AcquireReason) -> u32 {
        let entry = self.entries.entry(path.clone()).or_default();
        let counter = entry.counter_mut(reason);
        *counter += 1;
        *counter
    }

    /// Decrements the counter for `reason`, clamped at zero.
    ///
    /// Driving a counter below zero is a programming error: it fails
    /// loudly in debug builds and logs in release builds rather than
    /// silently ignoring the imbalance.
    pub fn release(&mut self, path: &ScenePath, reason: AcquireReason) -> u32 {
        let Some(entry) = self.entries.get_mut(path) else {
            debug_assert!(false, "release of untracked path {path}");
            log::error!("release of untracked path {path} ({reason:?})");
            return 0;
        };
        let counter = entry.counter_mut(reason);
        if *counter == 0 {
            debug_assert!(false, "refcount underflow at {path} for {reason:?}");
            log::error!("refcount underflow at {path} for {reason:?}");
            return 0;
        }
        *counter -= 1;
        *counter
    }

    /// Binds the native node backing a path. The entry must exist.
    pub fn set_node(&mut self, path: &ScenePath, node: NativeNode) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.node = Some(node);
        } else {
            debug_assert!(false, "set_node on untracked path {path}");
            log::error!("set_node on untracked path {path}");
        }
    }

    /// The node bound to a path, if any.
    #[must_use]
    pub fn node_for(&self, path: &ScenePath) -> Option<NativeNode> {
        self.entries.get(path).and_then(|e| e.node)
    }

    /// Read-only entry access.
    #[must_use]
    pub fn entry(&self, path: &ScenePath) -> Option<&RequiredPathEntry> {
        self.entries.get(path)
    }

    /// Shorthand for an entry's counter, zero when untracked.
    #[must_use]
    pub fn count(&self, path: &ScenePath, reason: AcquireReason) -> u32 {
        self.entries.get(path).map_or(0, |e| e.count(reason))
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&ScenePath, &RequiredPathEntry)> {
        self.entries.iter()
    }

    /// All tracked paths rooted at `root`, sorted parents-first.
    #[must_use]
    pub fn paths_under(&self, root: &ScenePath) -> Vec<ScenePath> {
        let mut out: Vec<ScenePath> = self
            .entries
            .keys()
            .filter(|p| p.has_prefix(root))
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Zeroes all three counters of an entry, dropping it from live
    /// bookkeeping so the next cleanup pass collects it. This is a
    /// marking operation, not a release: it never underflows and the
    /// entry (and its node) survive until cleanup runs.
    pub fn mark_unreferenced(&mut self, path: &ScenePath) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.required = 0;
            entry.selected = 0;
            entry.translator_refs = 0;
        }
    }

    /// Inserts a fully-formed entry. Restore-path helper; replaces
    /// any existing entry for the path.
    pub fn insert_entry(&mut self, path: ScenePath, entry: RequiredPathEntry) {
        self.entries.insert(path, entry);
    }

    /// Removes every entry whose three counters are all zero,
    /// returning the removed `(path, node)` pairs so the caller can
    /// delegate node destruction to the host graph.
    ///
    /// Called exactly once per resync pass, never mid-pass.
    pub fn cleanup(&mut self) -> Vec<(ScenePath, Option<NativeNode>)> {
        let mut removed = Vec::new();
        self.entries.retain(|path, entry| {
            if entry.is_unreferenced() {
                removed.push((path.clone(), entry.node));
                false
            } else {
                true
            }
        });
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        removed
    }

    // ========================================================================
    // Reentrancy guard
    // ========================================================================

    /// Marks the start of a logical pass over the table.
    ///
    /// # Panics
    ///
    /// Panics if the table is already locked — a resync attempting to
    /// run while another is in progress is a programming error and
    /// must fail fast rather than corrupt reference counts.
    pub fn lock(&mut self) {
        assert!(
            !self.locked,
            "required-path table is already locked: nested resync detected"
        );
        self.locked = true;
    }

    /// Marks the end of the logical pass started by [`Self::lock`].
    pub fn unlock(&mut self) {
        debug_assert!(self.locked, "unlock without matching lock");
        self.locked = false;
    }

    /// True while a pass holds the guard.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}
