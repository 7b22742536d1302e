//! The composed scene description.
//!
//! [`Stage`] holds authored prim specs in an arena and exposes the
//! composed view the engine walks: base children merged with the
//! selected option of each variant set, inactive subtrees pruned.
//! Every mutating edit bumps the stage revision and returns the
//! notices to dispatch, so callers drive the notification pipeline
//! explicitly instead of registering callbacks.

use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::errors::{Result, StageLinkError};
use crate::path::ScenePath;
use crate::stage::notice::{ChangedFields, StageNotice};
use crate::stage::prim::{MetadataValue, Prim, PrimId, PrimSpec, VariantSet, Visibility};
use crate::stage::xform::{TimeCode, XformOpStack};

/// An in-memory composed hierarchical scene description.
pub struct Stage {
    identifier: String,
    revision: u64,
    pub(crate) prims: SlotMap<PrimId, PrimSpec>,
    root: PrimId,
}

impl Stage {
    /// Creates an empty stage identified by `identifier` (typically a
    /// resolved file identity).
    #[must_use]
    pub fn new(identifier: &str) -> Self {
        let mut prims = SlotMap::with_key();
        let root = prims.insert(PrimSpec::new("", "", None));
        Self {
            identifier: identifier.to_string(),
            revision: 0,
            prims,
            root,
        }
    }

    #[inline]
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Modification token; bumped by every authored edit.
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The pseudo-root prim id (path `/`).
    #[inline]
    #[must_use]
    pub fn root(&self) -> PrimId {
        self.root
    }

    /// Number of authored prims, excluding the pseudo-root.
    #[must_use]
    pub fn prim_count(&self) -> usize {
        self.prims.len() - 1
    }

    /// True when no prims besides the pseudo-root are authored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prim_count() == 0
    }

    // ========================================================================
    // Authoring
    // ========================================================================

    /// Defines a new prim under `parent`, appended to its base
    /// children.
    pub fn define_prim(&mut self, parent: PrimId, name: &str, type_token: &str) -> PrimId {
        let id = self.prims.insert(PrimSpec::new(name, type_token, Some(parent)));
        self.prims[parent].children.push(id);
        self.revision += 1;
        id
    }

    /// Adds an (initially unselected) variant set to a prim.
    pub fn add_variant_set(&mut self, prim: PrimId, name: &str) {
        self.prims[prim].variant_sets.push(VariantSet {
            name: name.to_string(),
            selection: None,
            options: rustc_hash::FxHashMap::default(),
        });
        self.revision += 1;
    }

    /// Ensures an option exists on a variant set, possibly with no
    /// prims of its own. Selecting an empty option composes no
    /// children.
    pub fn add_variant_option(&mut self, owner: PrimId, set: &str, option: &str) {
        let vset = self.prims[owner]
            .variant_sets
            .iter_mut()
            .find(|v| v.name == set)
            .expect("variant set must be added before adding options");
        vset.options.entry(option.to_string()).or_default();
        self.revision += 1;
    }

    /// Defines a prim inside one option of a variant set on `owner`.
    /// The option is created on first use. The new prim only takes
    /// part in composition while its option is selected.
    pub fn define_variant_prim(
        &mut self,
        owner: PrimId,
        set: &str,
        option: &str,
        name: &str,
        type_token: &str,
    ) -> PrimId {
        let id = self.prims.insert(PrimSpec::new(name, type_token, Some(owner)));
        let vset = self.prims[owner]
            .variant_sets
            .iter_mut()
            .find(|v| v.name == set)
            .expect("variant set must be added before defining variant prims");
        vset.options.entry(option.to_string()).or_default().push(id);
        self.revision += 1;
        id
    }

    /// Writes a metadata key without producing notices. Authoring
    /// helper; the notified edit path is [`Stage::set_metadata`].
    pub fn set_metadata_raw(&mut self, prim: PrimId, key: &str, value: MetadataValue) {
        self.prims[prim].metadata.insert(key.to_string(), value);
        self.revision += 1;
    }

    // ========================================================================
    // Composed lookup & traversal
    // ========================================================================

    /// Composed children of a prim: base children followed by the
    /// selected option of each variant set.
    #[must_use]
    pub fn composed_children(&self, id: PrimId) -> Vec<PrimId> {
        let Some(spec) = self.prims.get(id) else {
            return Vec::new();
        };
        let mut out = spec.children.clone();
        for vset in &spec.variant_sets {
            out.extend_from_slice(vset.selected_children());
        }
        out
    }

    /// Resolves a path through the composed hierarchy. Inactive prims
    /// are found too — deactivation prunes traversal, not identity.
    #[must_use]
    pub fn prim_at_path(&self, path: &ScenePath) -> Option<PrimId> {
        let mut current = self.root;
        for segment in path.segments() {
            current = self
                .composed_children(current)
                .into_iter()
                .find(|&c| self.prims[c].name == segment)?;
        }
        Some(current)
    }

    /// Rebuilds the absolute path of a prim by walking parent links.
    #[must_use]
    pub fn path_of(&self, id: PrimId) -> ScenePath {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            let spec = &self.prims[c];
            if spec.parent.is_some() {
                segments.push(spec.name.clone());
            }
            current = spec.parent;
        }
        segments.reverse();
        let mut path = ScenePath::root();
        for s in &segments {
            path = path.append(s);
        }
        path
    }

    /// Read-only view of a live prim.
    #[must_use]
    pub fn prim(&self, id: PrimId) -> Option<Prim<'_>> {
        self.prims.contains_key(id).then_some(Prim { stage: self, id })
    }

    /// Read-only view of the prim at `path`.
    #[must_use]
    pub fn prim_at(&self, path: &ScenePath) -> Option<Prim<'_>> {
        self.prim_at_path(path).and_then(|id| self.prim(id))
    }

    /// Depth-first walk of the composed subtree under `start`,
    /// yielding active prims only. Inactive prims are pruned along
    /// with their entire subtree. The start prim itself is included
    /// (when active) unless it is the pseudo-root.
    #[must_use]
    pub fn walk_active(&self, start: PrimId) -> Vec<PrimId> {
        let mut out = Vec::new();
        let mut stack: Vec<PrimId> = vec![start];
        while let Some(id) = stack.pop() {
            let Some(spec) = self.prims.get(id) else {
                continue;
            };
            if !spec.active {
                continue;
            }
            if id != self.root {
                out.push(id);
            }
            let children = self.composed_children(id);
            for &child in children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    // ========================================================================
    // Notified edits
    // ========================================================================

    /// Toggles a prim's active flag. Returns the layer-change and
    /// objects-changed notices for the caller to dispatch.
    pub fn set_active(
        &mut self,
        path: &ScenePath,
        active: bool,
    ) -> Result<SmallVec<[StageNotice; 2]>> {
        let id = self
            .prim_at_path(path)
            .ok_or_else(|| StageLinkError::PrimNotFound(path.clone()))?;
        self.prims[id].active = active;
        self.revision += 1;
        Ok(StageNotice::composition_edit(path.clone(), ChangedFields::ACTIVE))
    }

    /// Switches a variant selection. Returns the notices for the
    /// caller to dispatch.
    pub fn select_variant(
        &mut self,
        path: &ScenePath,
        set: &str,
        option: &str,
    ) -> Result<SmallVec<[StageNotice; 2]>> {
        let id = self
            .prim_at_path(path)
            .ok_or_else(|| StageLinkError::PrimNotFound(path.clone()))?;
        let vset = self.prims[id]
            .variant_sets
            .iter_mut()
            .find(|v| v.name == set)
            .ok_or_else(|| StageLinkError::UnknownVariant {
                path: path.clone(),
                set: set.to_string(),
                option: option.to_string(),
            })?;
        if !vset.options.contains_key(option) {
            return Err(StageLinkError::UnknownVariant {
                path: path.clone(),
                set: set.to_string(),
                option: option.to_string(),
            });
        }
        vset.selection = Some(option.to_string());
        self.revision += 1;
        Ok(StageNotice::composition_edit(
            path.clone(),
            ChangedFields::VARIANT_SELECTION,
        ))
    }

    /// Writes a metadata key through the notified edit path.
    pub fn set_metadata(
        &mut self,
        path: &ScenePath,
        key: &str,
        value: MetadataValue,
    ) -> Result<SmallVec<[StageNotice; 2]>> {
        let id = self
            .prim_at_path(path)
            .ok_or_else(|| StageLinkError::PrimNotFound(path.clone()))?;
        self.set_metadata_raw(id, key, value);
        Ok(StageNotice::composition_edit(path.clone(), ChangedFields::METADATA))
    }

    /// Moves the edit target to another layer.
    pub fn set_edit_target(&mut self, layer: &str) -> SmallVec<[StageNotice; 1]> {
        self.revision += 1;
        let mut out = SmallVec::new();
        out.push(StageNotice::EditTargetChanged {
            layer: layer.to_string(),
        });
        out
    }

    // ========================================================================
    // Transform write-back
    // ========================================================================

    /// Mutable access to a prim's transform-op stack.
    pub fn xform_ops_mut(&mut self, id: PrimId) -> Option<&mut XformOpStack> {
        self.revision += 1;
        self.prims.get_mut(id).map(|spec| &mut spec.xform_ops)
    }

    /// Sets the time-sampled visibility on a prim: `true` maps to
    /// `Inherited`, `false` to `Invisible`.
    pub fn write_visibility(&mut self, id: PrimId, visible: bool, time: TimeCode) {
        if let Some(spec) = self.prims.get_mut(id) {
            let value = if visible {
                Visibility::Inherited
            } else {
                Visibility::Invisible
            };
            spec.set_visibility(time, value);
            self.revision += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ScenePath {
        ScenePath::new(s).unwrap()
    }

    #[test]
    fn prim_lookup_follows_composed_children() {
        let mut stage = Stage::new("test");
        let root = stage.root();
        let world = stage.define_prim(root, "world", "Scope");
        let body = stage.define_prim(world, "body", "Mesh");

        assert_eq!(stage.prim_at_path(&path("/world")), Some(world));
        assert_eq!(stage.prim_at_path(&path("/world/body")), Some(body));
        assert_eq!(stage.prim_at_path(&path("/missing")), None);
        assert_eq!(stage.path_of(body), path("/world/body"));
    }

    #[test]
    fn variant_selection_changes_composed_children() {
        let mut stage = Stage::new("test");
        let root = stage.root();
        let rig = stage.define_prim(root, "rig", "Scope");
        stage.add_variant_set(rig, "lod");
        let hi = stage.define_variant_prim(rig, "lod", "high", "geo", "Mesh");
        let lo = stage.define_variant_prim(rig, "lod", "low", "geo", "Mesh");

        assert_eq!(stage.prim_at_path(&path("/rig/geo")), None);

        stage.select_variant(&path("/rig"), "lod", "high").unwrap();
        assert_eq!(stage.prim_at_path(&path("/rig/geo")), Some(hi));

        stage.select_variant(&path("/rig"), "lod", "low").unwrap();
        assert_eq!(stage.prim_at_path(&path("/rig/geo")), Some(lo));
    }

    #[test]
    fn walk_active_prunes_inactive_subtrees() {
        let mut stage = Stage::new("test");
        let root = stage.root();
        let a = stage.define_prim(root, "a", "Scope");
        let _b = stage.define_prim(a, "b", "Mesh");
        let c = stage.define_prim(root, "c", "Mesh");

        assert_eq!(stage.walk_active(root).len(), 3);

        stage.set_active(&path("/a"), false).unwrap();
        let walked = stage.walk_active(root);
        assert_eq!(walked, vec![c]);

        // Deactivation prunes traversal but not identity.
        assert!(stage.prim_at_path(&path("/a")).is_some());
    }

    #[test]
    fn unknown_variant_edit_is_rejected() {
        let mut stage = Stage::new("test");
        let root = stage.root();
        let rig = stage.define_prim(root, "rig", "Scope");
        stage.add_variant_set(rig, "lod");

        let err = stage.select_variant(&path("/rig"), "lod", "nope");
        assert!(matches!(err, Err(StageLinkError::UnknownVariant { .. })));
        let err = stage.select_variant(&path("/rig"), "missing", "x");
        assert!(matches!(err, Err(StageLinkError::UnknownVariant { .. })));
    }

    #[test]
    fn edits_bump_the_revision() {
        let mut stage = Stage::new("test");
        let root = stage.root();
        let r0 = stage.revision();
        let a = stage.define_prim(root, "a", "Scope");
        assert!(stage.revision() > r0);

        let r1 = stage.revision();
        stage.write_visibility(a, false, TimeCode::ZERO);
        assert!(stage.revision() > r1);
    }
}
