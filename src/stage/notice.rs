//! Change notices emitted by stage edits.
//!
//! Every mutating stage operation returns the notices it produced, and
//! the caller dispatches them synchronously into the bridge. There is
//! no callback registry: dispatch is an explicit function call taking
//! the bridge state by mutable reference.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::path::ScenePath;

bitflags! {
    /// Which authored fields changed on a layer-change entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ChangedFields: u32 {
        /// A variant selection changed.
        const VARIANT_SELECTION = 1 << 0;
        /// The active flag changed.
        const ACTIVE            = 1 << 1;
        /// Some other metadata key changed.
        const METADATA          = 1 << 2;
    }
}

impl ChangedFields {
    /// True if the change affects composed structure (variant
    /// selection or activation), which forces a resync.
    #[inline]
    #[must_use]
    pub fn affects_composition(self) -> bool {
        self.intersects(Self::VARIANT_SELECTION | Self::ACTIVE)
    }
}

/// One changed path within a [`StageNotice::LayersChanged`] notice.
#[derive(Clone, Debug)]
pub struct LayerChangeEntry {
    /// Path whose authored fields changed.
    pub path: ScenePath,
    /// The fields that changed at that path.
    pub fields: ChangedFields,
}

/// A notification produced by a stage edit.
///
/// Mirrors the three notification kinds of the external description
/// library: a detailed per-path layer change list, a generic
/// objects-changed flush, and an edit-target switch.
#[derive(Clone, Debug)]
pub enum StageNotice {
    /// Layer contents changed; carries a per-path list of changed
    /// fields.
    LayersChanged {
        /// Changed entries, in edit order.
        entries: SmallVec<[LayerChangeEntry; 2]>,
    },
    /// Generic "something recomposed" notice. Carries no path detail.
    ObjectsChanged,
    /// The stage's edit target moved to another layer.
    EditTargetChanged {
        /// Identifier of the layer now being edited.
        layer: String,
    },
}

impl StageNotice {
    /// Builds the usual pair of notices for a structural edit at
    /// `path`: a single-entry layer change followed by the generic
    /// flush.
    #[must_use]
    pub fn composition_edit(path: ScenePath, fields: ChangedFields) -> SmallVec<[StageNotice; 2]> {
        let mut entries = SmallVec::new();
        entries.push(LayerChangeEntry { path, fields });
        let mut out = SmallVec::new();
        out.push(StageNotice::LayersChanged { entries });
        out.push(StageNotice::ObjectsChanged);
        out
    }
}
