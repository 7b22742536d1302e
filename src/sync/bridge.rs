//! The stage bridge.
//!
//! [`StageBridge`] owns the whole synchronization pipeline: the stage
//! handle, the host graph, the translator registries, the
//! required-path table, the change listener, the driven-transform
//! table and the excluded-geometry/imaging state. Stage edits go
//! through bridge methods, which apply the edit and then dispatch the
//! resulting notices synchronously — an explicit function call taking
//! the bridge by mutable reference, guarded against nested invocation
//! by a flag rather than caller discipline.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{Result, StageLinkError};
use crate::graph::{HostGraph, NativeNode};
use crate::path::ScenePath;
use crate::stage::{
    MetadataValue, PrimId, Stage, StageCache, StageFingerprint, StageHandle, StageNotice, TimeCode,
};
use crate::sync::codec::{self, PersistedBlobs};
use crate::sync::driven::DrivenTransforms;
use crate::sync::listener::ChangeListener;
use crate::sync::required_paths::{AcquireReason, RequiredPathTable};
use crate::sync::resync::ResyncPass;
use crate::translators::{SchemaPrimRegistry, TranslatorContext, TranslatorManufacture};

/// Registration-time configuration shared by every bridge instance.
///
/// Replaces class-level static attribute slots: built once at plugin
/// registration and passed by shared reference, never a process-wide
/// mutable static.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Name of the bridge's transform root node in the host graph.
    pub anchor_name: String,
    /// Attribute the ref-table blob persists through.
    pub ref_table_attr: String,
    /// Attribute the translator-context blob persists through.
    pub translator_context_attr: String,
    /// Attribute the schema-prim registry blob persists through.
    pub schema_prims_attr: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            anchor_name: "stageBridge".to_string(),
            ref_table_attr: "refTableData".to_string(),
            translator_context_attr: "translatorContextData".to_string(),
            schema_prims_attr: "schemaPrimData".to_string(),
        }
    }
}

/// Rendering-engine state derived from the excluded-geometry set.
/// Opaque to the engine; rebuilt whenever the set may have changed.
#[derive(Debug, Default)]
pub struct ImagingState {
    rebuilds: u64,
    excluded: Vec<ScenePath>,
}

impl ImagingState {
    /// How many times the imaging state has been rebuilt.
    #[must_use]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// The excluded subtree roots the last rebuild saw, sorted.
    #[must_use]
    pub fn excluded(&self) -> &[ScenePath] {
        &self.excluded
    }
}

/// Orchestrating engine keeping the host graph synchronized with the
/// composed stage.
pub struct StageBridge {
    config: Arc<BridgeConfig>,
    stage: Option<StageHandle>,
    graph: HostGraph,
    anchor: NativeNode,
    manufacture: TranslatorManufacture,
    context: TranslatorContext,
    schema_prims: SchemaPrimRegistry,
    table: RequiredPathTable,
    listener: ChangeListener,
    driven: DrivenTransforms,
    bindings: FxHashMap<NativeNode, PrimId>,
    excluded_tagged: Vec<ScenePath>,
    excluded_explicit: Vec<ScenePath>,
    imaging: ImagingState,
    root_path: ScenePath,
    current_edit_target: Option<String>,
    edit_target_history: FxHashMap<String, bool>,
    dispatching: bool,
}

impl StageBridge {
    /// Creates a bridge with its transform root in a fresh host
    /// graph.
    #[must_use]
    pub fn new(config: Arc<BridgeConfig>, manufacture: TranslatorManufacture) -> Self {
        let mut graph = HostGraph::new();
        let anchor = graph.create_node(&config.anchor_name, None);
        Self {
            config,
            stage: None,
            graph,
            anchor,
            manufacture,
            context: TranslatorContext::new(),
            schema_prims: SchemaPrimRegistry::new(),
            table: RequiredPathTable::new(),
            listener: ChangeListener::new(),
            driven: DrivenTransforms::new(),
            bindings: FxHashMap::default(),
            excluded_tagged: Vec::new(),
            excluded_explicit: Vec::new(),
            imaging: ImagingState::default(),
            root_path: ScenePath::root(),
            current_edit_target: None,
            edit_target_history: FxHashMap::default(),
            dispatching: false,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub fn graph(&self) -> &HostGraph {
        &self.graph
    }

    #[must_use]
    pub fn anchor(&self) -> NativeNode {
        self.anchor
    }

    #[must_use]
    pub fn table(&self) -> &RequiredPathTable {
        &self.table
    }

    #[must_use]
    pub fn schema_prims(&self) -> &SchemaPrimRegistry {
        &self.schema_prims
    }

    #[must_use]
    pub fn translator_context(&self) -> &TranslatorContext {
        &self.context
    }

    #[must_use]
    pub fn imaging(&self) -> &ImagingState {
        &self.imaging
    }

    pub fn driven_mut(&mut self) -> &mut DrivenTransforms {
        &mut self.driven
    }

    #[must_use]
    pub fn driven(&self) -> &DrivenTransforms {
        &self.driven
    }

    /// True while a stage is attached. "No stage" is a normal state:
    /// queries return empty results rather than erroring.
    #[must_use]
    pub fn has_stage(&self) -> bool {
        self.stage.is_some()
    }

    /// Shared handle to the attached stage.
    #[must_use]
    pub fn stage_handle(&self) -> Option<StageHandle> {
        self.stage.clone()
    }

    /// The native node backing a scene path, if one is required.
    #[must_use]
    pub fn node_at(&self, path: &ScenePath) -> Option<NativeNode> {
        self.table.node_for(path)
    }

    /// Whether a layer has ever been the edit target.
    #[must_use]
    pub fn layer_was_edit_target(&self, layer: &str) -> bool {
        self.edit_target_history.get(layer).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn current_edit_target(&self) -> Option<&str> {
        self.current_edit_target.as_deref()
    }

    // ========================================================================
    // Stage lifecycle
    // ========================================================================

    /// Opens a stage through the shared cache. A cache miss is a
    /// reported failure: it logs a user-visible warning and leaves
    /// the bridge without a stage, which downstream code treats as a
    /// normal state. Returns whether a stage was attached.
    pub fn open_stage(&mut self, cache: &StageCache, fingerprint: &StageFingerprint) -> bool {
        match cache.acquire(fingerprint) {
            Some(handle) => {
                self.attach_stage(handle);
                true
            }
            None => {
                log::warn!(
                    "failed to open stage {:?} (token {}): leaving description empty",
                    fingerprint.identifier,
                    fingerprint.token
                );
                self.stage = None;
                false
            }
        }
    }

    /// Attaches an already-open stage and runs the initial population
    /// pass. Notices arriving during the load phase are ignored.
    pub fn attach_stage(&mut self, handle: StageHandle) {
        self.stage = Some(handle.clone());
        self.listener.set_loading(true);
        {
            let mut stage = handle.lock();
            let root = self.root_path.clone();
            self.run_resync(&mut stage, &root, &[]);
        }
        self.listener.set_loading(false);
    }

    /// Detaches the stage. Bookkeeping stays as-is so a later save
    /// can still serialize it.
    pub fn close_stage(&mut self) {
        self.stage = None;
    }

    /// Sets the subtree root the bridge mirrors. A path that does not
    /// resolve falls back to the hierarchy root with a warning.
    pub fn set_root_path(&mut self, path: ScenePath) {
        let resolved = match &self.stage {
            Some(handle) => handle.lock().prim_at_path(&path).is_some(),
            None => true,
        };
        if resolved {
            self.root_path = path;
        } else {
            log::warn!("root path {path} does not resolve, falling back to the hierarchy root");
            self.root_path = ScenePath::root();
        }
    }

    #[must_use]
    pub fn root_path(&self) -> &ScenePath {
        &self.root_path
    }

    // ========================================================================
    // Outward operation surface
    // ========================================================================

    /// Toggles the active metadata at a path. The edit synchronously
    /// runs the layers-changed → objects-changed → resync pipeline
    /// before returning.
    pub fn set_prim_active(&mut self, path: &ScenePath, active: bool) -> Result<()> {
        let handle = self.stage.clone().ok_or(StageLinkError::StageNotOpen)?;
        let mut stage = handle.lock();
        let notices = stage.set_active(path, active)?;
        self.dispatch_all(&mut stage, &notices);
        Ok(())
    }

    /// Switches a variant selection, synchronously resyncing.
    pub fn select_variant(&mut self, path: &ScenePath, set: &str, option: &str) -> Result<()> {
        let handle = self.stage.clone().ok_or(StageLinkError::StageNotOpen)?;
        let mut stage = handle.lock();
        let notices = stage.select_variant(path, set, option)?;
        self.dispatch_all(&mut stage, &notices);
        Ok(())
    }

    /// Writes a metadata key through the notified edit path.
    pub fn set_prim_metadata(
        &mut self,
        path: &ScenePath,
        key: &str,
        value: MetadataValue,
    ) -> Result<()> {
        let handle = self.stage.clone().ok_or(StageLinkError::StageNotOpen)?;
        let mut stage = handle.lock();
        let notices = stage.set_metadata(path, key, value)?;
        self.dispatch_all(&mut stage, &notices);
        Ok(())
    }

    /// Moves the stage's edit target to another layer.
    pub fn set_edit_target(&mut self, layer: &str) -> Result<()> {
        let handle = self.stage.clone().ok_or(StageLinkError::StageNotOpen)?;
        let mut stage = handle.lock();
        let notices = stage.set_edit_target(layer);
        self.dispatch_all(&mut stage, &notices);
        Ok(())
    }

    /// Delivers externally produced notices into the pipeline, in
    /// order. This is the entry point for hosts that edit the stage
    /// directly through the shared handle and forward the notices the
    /// description library handed them.
    pub fn dispatch_notices(&mut self, notices: &[StageNotice]) -> Result<()> {
        let handle = self.stage.clone().ok_or(StageLinkError::StageNotOpen)?;
        let mut stage = handle.lock();
        self.dispatch_all(&mut stage, notices);
        Ok(())
    }

    /// Acquires or releases an explicit selection on a path.
    pub fn set_selected(&mut self, path: &ScenePath, selected: bool) {
        if selected {
            self.table.acquire(path, AcquireReason::Selected);
        } else {
            self.table.release(path, AcquireReason::Selected);
        }
    }

    /// Replaces the explicit excluded-path list and rebuilds the
    /// dependent imaging state.
    pub fn set_excluded_paths(&mut self, paths: Vec<ScenePath>) {
        self.excluded_explicit = paths;
        self.rebuild_imaging();
    }

    /// True when a path lies in an excluded subtree (explicitly
    /// listed or tag-derived).
    #[must_use]
    pub fn is_path_excluded(&self, path: &ScenePath) -> bool {
        self.imaging.excluded.iter().any(|root| path.has_prefix(root))
    }

    /// Applies queued driven-transform values into the stage.
    pub fn evaluate_driven(&mut self, time: TimeCode) -> Result<usize> {
        let handle = self.stage.clone().ok_or(StageLinkError::StageNotOpen)?;
        let mut stage = handle.lock();
        let written = self.driven.apply(&mut stage, time);
        if written > 0 {
            self.graph.propagate_dirty(self.anchor);
        }
        Ok(written)
    }

    // ========================================================================
    // Save / load
    // ========================================================================

    /// Pre-save hook: serializes the transient tables into the
    /// bridge node's persisted attributes.
    pub fn save(&mut self) {
        let blobs = codec::dump(&self.table, &self.graph, &self.context, &self.schema_prims);
        self.graph
            .write_attr(self.anchor, &self.config.ref_table_attr, blobs.ref_table);
        self.graph.write_attr(
            self.anchor,
            &self.config.translator_context_attr,
            blobs.translator_context,
        );
        self.graph
            .write_attr(self.anchor, &self.config.schema_prims_attr, blobs.schema_prims);
    }

    /// Post-load hook: consumes the persisted attributes (clearing
    /// them) and rebuilds the transient tables in restore order.
    pub fn load(&mut self) {
        let mut blobs = PersistedBlobs {
            ref_table: self
                .graph
                .take_attr(self.anchor, &self.config.ref_table_attr)
                .unwrap_or_default(),
            translator_context: self
                .graph
                .take_attr(self.anchor, &self.config.translator_context_attr)
                .unwrap_or_default(),
            schema_prims: self
                .graph
                .take_attr(self.anchor, &self.config.schema_prims_attr)
                .unwrap_or_default(),
        };
        codec::restore(
            &mut blobs,
            &mut self.table,
            &self.graph,
            &mut self.context,
            &mut self.schema_prims,
        );
        self.rebind_transforms();
    }

    /// Drops all transient bookkeeping (table, context, registry and
    /// bindings). Called when the host reloads a scene: the persisted
    /// attributes survive on the bridge node, the in-memory tables do
    /// not, and [`Self::load`] rebuilds them.
    pub fn clear_transients(&mut self) {
        self.table = RequiredPathTable::new();
        self.context = TranslatorContext::new();
        self.schema_prims = SchemaPrimRegistry::new();
        self.bindings.clear();
    }

    /// Rebuilds the transform-node → prim bindings after a restore,
    /// resolving each table entry's path against the attached stage.
    fn rebind_transforms(&mut self) {
        self.bindings.clear();
        let Some(handle) = self.stage.clone() else {
            return;
        };
        let stage = handle.lock();
        for (path, entry) in self.table.iter() {
            if let (Some(node), Some(prim)) = (entry.node, stage.prim_at_path(path)) {
                self.bindings.insert(node, prim);
            }
        }
    }

    // ========================================================================
    // Notice dispatch
    // ========================================================================

    fn dispatch_all(&mut self, stage: &mut Stage, notices: &[StageNotice]) {
        for notice in notices {
            self.dispatch(stage, notice);
        }
    }

    /// Dispatches one notice into the listener and runs any resync it
    /// flushes.
    ///
    /// # Panics
    ///
    /// Panics on nested invocation: a translator (or other callee)
    /// editing the stage mid-dispatch is a programming error.
    fn dispatch(&mut self, stage: &mut Stage, notice: &StageNotice) {
        assert!(!self.dispatching, "reentrant notice dispatch detected");
        self.dispatching = true;
        log::trace!("dispatch: {notice:?}");

        if let StageNotice::EditTargetChanged { layer } = notice {
            self.current_edit_target = Some(layer.clone());
            self.edit_target_history.insert(layer.clone(), true);
        } else {
            let schema_prims = &self.schema_prims;
            let flushed = self.listener.handle_notice(notice, |path, out| {
                out.extend(schema_prims.paths_under(path));
            });
            if let Some((root, removals)) = flushed {
                self.run_resync(stage, &root, &removals);
                self.listener.complete_resync();
            }
        }

        self.dispatching = false;
    }

    /// Runs one resync pass. A pass on an empty stage is a no-op.
    fn run_resync(&mut self, stage: &mut Stage, changed_root: &ScenePath, removals: &[ScenePath]) {
        if stage.is_empty() {
            log::debug!("resync skipped: stage is empty");
            return;
        }
        let outcome = ResyncPass {
            stage,
            graph: &mut self.graph,
            table: &mut self.table,
            manufacture: &self.manufacture,
            context: &mut self.context,
            schema_prims: &mut self.schema_prims,
            bindings: &mut self.bindings,
            excluded_tagged: &mut self.excluded_tagged,
            anchor: self.anchor,
        }
        .run(changed_root, removals);

        for path in outcome.prune {
            log::debug!("pruning transform binding at {path}");
            self.listener.mark_for_removal(path);
        }
        self.rebuild_imaging();
        self.graph.propagate_dirty(self.anchor);
    }

    /// Rebuilds the imaging state from the merged excluded set.
    fn rebuild_imaging(&mut self) {
        let mut excluded = self.excluded_tagged.clone();
        excluded.extend(self.excluded_explicit.iter().cloned());
        excluded.sort();
        excluded.dedup();
        self.imaging.excluded = excluded;
        self.imaging.rebuilds += 1;
        log::debug!(
            "imaging rebuilt ({} excluded roots)",
            self.imaging.excluded.len()
        );
    }
}
