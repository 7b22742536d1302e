//! Composition-change listener.
//!
//! Classifies incoming stage notices and maintains the dirty state the
//! resynchronizer consumes. The listener is a small state machine:
//!
//! ```text
//! Idle → PendingRemoval → Resyncing → Idle
//! ```
//!
//! A layer-contents change whose entries touch variant selection or
//! activation flags the composition dirty, records the changed root
//! (last write wins) and gathers pending removals through the
//! pre-removal callback. The following generic objects-changed notice
//! flushes: the accumulated state is handed to the resynchronizer and
//! reset. Notices arriving while the stage is being loaded are ignored
//! entirely — loading is a distinct, non-reentrant phase.

use crate::path::ScenePath;
use crate::stage::{LayerChangeEntry, StageNotice};

/// Listener phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
    Idle,
    PendingRemoval,
    Resyncing,
}

/// Dirty state accumulated between notices and consumed by a resync
/// pass.
#[derive(Debug, Clone)]
pub struct DirtyState {
    /// A structural change was notified since the last flush.
    pub composition_changed: bool,
    /// Root of the most recent structural change. Last write wins:
    /// when two distinct edits land before a flush, only the latest
    /// root is kept while removal paths accumulate from all of them.
    pub changed_root: ScenePath,
    /// Required-path entries gathered by the pre-removal callback,
    /// in notification order, deduplicated.
    pub pending_removals: Vec<ScenePath>,
}

impl DirtyState {
    fn empty() -> Self {
        Self {
            composition_changed: false,
            changed_root: ScenePath::root(),
            pending_removals: Vec::new(),
        }
    }
}

impl Default for DirtyState {
    fn default() -> Self {
        Self::empty()
    }
}

/// State machine driving resyncs from stage notices.
pub struct ChangeListener {
    phase: ListenerPhase,
    dirty: DirtyState,
    loading: bool,
}

impl Default for ChangeListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeListener {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ListenerPhase::Idle,
            dirty: DirtyState::empty(),
            loading: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> ListenerPhase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub fn dirty(&self) -> &DirtyState {
        &self.dirty
    }

    /// Marks the loading phase; all notices are ignored while set.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Feeds one notice into the state machine.
    ///
    /// For layer changes, `pre_remove` is invoked once per
    /// composition-affecting entry with the changed path and the
    /// accumulating removal list; it should append every live
    /// required-path entry rooted at that path.
    ///
    /// Returns `Some((changed_root, pending_removals))` when the
    /// notice flushes accumulated dirty state — the caller must then
    /// run the resync pass and call [`Self::complete_resync`].
    pub fn handle_notice(
        &mut self,
        notice: &StageNotice,
        mut pre_remove: impl FnMut(&ScenePath, &mut Vec<ScenePath>),
    ) -> Option<(ScenePath, Vec<ScenePath>)> {
        if self.loading {
            log::trace!("listener: ignoring notice during load");
            return None;
        }

        match notice {
            StageNotice::LayersChanged { entries } => {
                self.on_layers_changed(entries, &mut pre_remove);
                None
            }
            StageNotice::ObjectsChanged => self.on_objects_changed(),
            // Edit-target bookkeeping is handled by the bridge; the
            // listener's dirty state is not involved.
            StageNotice::EditTargetChanged { .. } => None,
        }
    }

    fn on_layers_changed(
        &mut self,
        entries: &[LayerChangeEntry],
        pre_remove: &mut impl FnMut(&ScenePath, &mut Vec<ScenePath>),
    ) {
        for entry in entries {
            if !entry.fields.affects_composition() {
                continue;
            }
            log::debug!(
                "listener: composition change at {} ({:?})",
                entry.path,
                entry.fields
            );
            self.dirty.composition_changed = true;
            self.dirty.changed_root = entry.path.clone();

            let mut gathered = Vec::new();
            pre_remove(&entry.path, &mut gathered);
            for path in gathered {
                if !self.dirty.pending_removals.contains(&path) {
                    self.dirty.pending_removals.push(path);
                }
            }

            if self.phase == ListenerPhase::Idle {
                self.phase = ListenerPhase::PendingRemoval;
            }
        }
    }

    fn on_objects_changed(&mut self) -> Option<(ScenePath, Vec<ScenePath>)> {
        if !self.dirty.composition_changed {
            return None;
        }
        self.phase = ListenerPhase::Resyncing;
        let flushed = std::mem::take(&mut self.dirty);
        Some((flushed.changed_root, flushed.pending_removals))
    }

    /// Returns the listener to `Idle` after the flushed resync pass
    /// completed.
    pub fn complete_resync(&mut self) {
        debug_assert_eq!(self.phase, ListenerPhase::Resyncing);
        self.phase = ListenerPhase::Idle;
    }

    /// Queues a path for removal on the next flush without flagging
    /// the composition dirty. Used for paths marked for pruning by
    /// the transform-validation pass.
    pub fn mark_for_removal(&mut self, path: ScenePath) {
        if !self.dirty.pending_removals.contains(&path) {
            self.dirty.pending_removals.push(path);
        }
    }
}
