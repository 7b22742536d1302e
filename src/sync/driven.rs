//! Driven transform table.
//!
//! The host writes computed transforms back into the description
//! through a table of driven entries, one per logical index. Entries
//! are created lazily on first reference to an index; the table grows
//! with the highest referenced index and shrinks only on explicit
//! resize. An apply pass pushes dirty matrices into the per-prim
//! transform-op stacks and dirty visibilities into the time-sampled
//! visibility attribute, skipping indices whose prim cannot be
//! resolved.

use glam::Mat4;

use crate::path::ScenePath;
use crate::stage::{PrimId, Stage, TimeCode};

/// One driven entry: target path, cached resolution, pending values.
#[derive(Debug, Clone)]
pub struct DrivenTransformEntry {
    pub path: ScenePath,
    pub cached_prim: Option<PrimId>,
    pub matrix: Mat4,
    pub visible: bool,
    pub matrix_dirty: bool,
    pub visibility_dirty: bool,
}

impl DrivenTransformEntry {
    fn new(path: ScenePath) -> Self {
        Self {
            path,
            cached_prim: None,
            matrix: Mat4::IDENTITY,
            visible: true,
            matrix_dirty: false,
            visibility_dirty: false,
        }
    }
}

/// Table of driven transforms, indexed by logical index.
#[derive(Default)]
pub struct DrivenTransforms {
    entries: Vec<Option<DrivenTransformEntry>>,
}

impl DrivenTransforms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current table size (highest referenced index + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only entry access.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&DrivenTransformEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Binds a logical index to a scene path, creating the entry
    /// lazily and growing the table as needed. Rebinding clears the
    /// cached prim resolution.
    pub fn set_path(&mut self, index: usize, path: ScenePath) {
        if index >= self.entries.len() {
            self.entries.resize(index + 1, None);
        }
        self.entries[index] = Some(DrivenTransformEntry::new(path));
    }

    /// Queues a matrix value for an index. Unbound indices are
    /// skipped; returns whether the value was queued.
    pub fn set_matrix(&mut self, index: usize, matrix: Mat4) -> bool {
        match self.entries.get_mut(index).and_then(Option::as_mut) {
            Some(entry) => {
                entry.matrix = matrix;
                entry.matrix_dirty = true;
                true
            }
            None => {
                log::debug!("driven transforms: matrix for unbound index {index} skipped");
                false
            }
        }
    }

    /// Queues a visibility value for an index. Unbound indices are
    /// skipped; returns whether the value was queued.
    pub fn set_visibility(&mut self, index: usize, visible: bool) -> bool {
        match self.entries.get_mut(index).and_then(Option::as_mut) {
            Some(entry) => {
                entry.visible = visible;
                entry.visibility_dirty = true;
                true
            }
            None => {
                log::debug!("driven transforms: visibility for unbound index {index} skipped");
                false
            }
        }
    }

    /// Explicitly resizes the table; the only way it shrinks.
    pub fn resize(&mut self, len: usize) {
        self.entries.resize(len, None);
    }

    /// Applies queued values into the stage at `time`, refreshing
    /// stale prim resolutions along the way. Entries whose path no
    /// longer resolves are left pointing at nothing (degraded state,
    /// not an error). Returns the number of values written.
    pub fn apply(&mut self, stage: &mut Stage, time: TimeCode) -> usize {
        let mut written = 0;
        for entry in self.entries.iter_mut().flatten() {
            if !entry.matrix_dirty && !entry.visibility_dirty {
                continue;
            }

            // Re-resolve when the cache is empty or points at a prim
            // no longer composed at this path.
            let resolved = stage.prim_at_path(&entry.path);
            if entry.cached_prim != resolved {
                entry.cached_prim = resolved;
            }
            let Some(prim) = entry.cached_prim else {
                log::debug!("driven transforms: {} does not resolve, skipping", entry.path);
                entry.matrix_dirty = false;
                entry.visibility_dirty = false;
                continue;
            };

            if entry.matrix_dirty {
                if let Some(ops) = stage.xform_ops_mut(prim) {
                    ops.write_matrix(entry.matrix, time);
                    written += 1;
                }
                entry.matrix_dirty = false;
            }
            if entry.visibility_dirty {
                stage.write_visibility(prim, entry.visible, time);
                entry.visibility_dirty = false;
                written += 1;
            }
        }
        written
    }
}
