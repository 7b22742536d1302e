//! Synchronization Pipeline Tests
//!
//! End-to-end tests driving the bridge through stage edits:
//! - Initial population and schema-prim filtering
//! - Variant switch round trips (structural equivalence)
//! - Activation toggles releasing and restoring subtrees
//! - Coalesced pre-flush edits (last-root-wins, pinned)
//! - Failure semantics: failed imports, missing stage, empty stage
//! - In-place updates, selection survival, excluded geometry

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Mat4;
use stagelink::stage::{md, ChangedFields};
use stagelink::{
    AcquireReason, BridgeConfig, HostGraph, MetadataValue, NativeNode, Prim, Result, ScenePath,
    Stage, StageBridge, StageCache, StageFingerprint, StageHandle, StageLinkError, StageNotice,
    TimeCode, Translator, TranslatorManufacture, Visibility, XformOpCategory,
};

fn path(s: &str) -> ScenePath {
    ScenePath::new(s).unwrap()
}

// ============================================================================
// Test Translator
// ============================================================================

/// Counts capability calls and materializes one `<name>Shape` node per
/// import.
struct CountingTranslator {
    token: &'static str,
    updatable: bool,
    fail_import_named: Option<&'static str>,
    imports: AtomicUsize,
    updates: AtomicUsize,
    teardowns: AtomicUsize,
}

impl CountingTranslator {
    fn new(token: &'static str) -> Arc<Self> {
        Arc::new(Self::unwrapped(token))
    }

    fn updatable(token: &'static str) -> Arc<Self> {
        Arc::new(Self {
            updatable: true,
            ..Self::unwrapped(token)
        })
    }

    fn failing_on(token: &'static str, prim_name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            fail_import_named: Some(prim_name),
            ..Self::unwrapped(token)
        })
    }

    fn unwrapped(token: &'static str) -> Self {
        Self {
            token,
            updatable: false,
            fail_import_named: None,
            imports: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
        }
    }

    fn imports(&self) -> usize {
        self.imports.load(Ordering::Relaxed)
    }

    fn updates(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }

    fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::Relaxed)
    }
}

impl Translator for CountingTranslator {
    fn type_token(&self) -> &str {
        self.token
    }

    fn supports_update(&self) -> bool {
        self.updatable
    }

    fn import(
        &self,
        prim: &Prim<'_>,
        parent: Option<NativeNode>,
        graph: &mut HostGraph,
    ) -> Result<NativeNode> {
        if self.fail_import_named == Some(prim.name()) {
            return Err(StageLinkError::TranslatorFailed {
                type_token: self.token.to_string(),
                reason: format!("refusing to import {}", prim.name()),
            });
        }
        self.imports.fetch_add(1, Ordering::Relaxed);
        Ok(graph.create_node(&format!("{}Shape", prim.name()), parent))
    }

    fn update(&self, _prim: &Prim<'_>, _node: NativeNode, _graph: &mut HostGraph) -> Result<()> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn tear_down(
        &self,
        _path: &ScenePath,
        node: Option<NativeNode>,
        graph: &mut HostGraph,
    ) -> Result<()> {
        self.teardowns.fetch_add(1, Ordering::Relaxed);
        if let Some(node) = node {
            graph.destroy_node(node);
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn bridge_with(translators: &[Arc<CountingTranslator>]) -> StageBridge {
    let mut manufacture = TranslatorManufacture::new();
    for translator in translators {
        let translator: Arc<dyn Translator> = translator.clone();
        manufacture.register(translator);
    }
    StageBridge::new(Arc::new(BridgeConfig::default()), manufacture)
}

fn open(stage: Stage) -> StageHandle {
    let mut cache = StageCache::new();
    cache.insert(StageFingerprint::new("test", 0), stage)
}

/// `/asset` carrying a variant set `rig` whose options `A` and `B`
/// each hold one schema prim, plus an always-empty option.
fn variant_stage() -> Stage {
    let mut stage = Stage::new("variants");
    let root = stage.root();
    let asset = stage.define_prim(root, "asset", "Scope");
    stage.add_variant_set(asset, "rig");
    stage.define_variant_prim(asset, "rig", "A", "a", "Rig");
    stage.define_variant_prim(asset, "rig", "B", "b", "Rig");
    stage.add_variant_option(asset, "rig", "empty");
    stage.select_variant(&path("/asset"), "rig", "A").unwrap();
    stage
}

/// Node names under `node` in depth-first order; structural shape
/// without native identity.
fn names_under(graph: &HostGraph, node: NativeNode) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        let n = graph.get(id).unwrap();
        out.push(n.name.clone());
        for &child in n.children().iter().rev() {
            stack.push(child);
        }
    }
    out
}

// ============================================================================
// Initial Population
// ============================================================================

#[test]
fn attach_imports_schema_prims_and_ignores_the_rest() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);

    let mut stage = Stage::new("world");
    let root = stage.root();
    let world = stage.define_prim(root, "world", "Scope");
    stage.define_prim(world, "rig", "Rig");
    stage.define_prim(world, "geo", "Mesh"); // no translator registered
    bridge.attach_stage(open(stage));

    assert_eq!(rig.imports(), 1);
    assert!(bridge.node_at(&path("/world/rig")).is_some());
    assert!(bridge.node_at(&path("/world/geo")).is_none());
    assert_eq!(bridge.schema_prims().len(), 1);

    // Ancestor chain shared bookkeeping: /world required by the chain.
    assert_eq!(bridge.table().count(&path("/world"), AcquireReason::Required), 1);
    assert_eq!(
        bridge
            .table()
            .count(&path("/world/rig"), AcquireReason::TranslatorRef),
        1
    );
}

// ============================================================================
// Variant Switches
// ============================================================================

#[test]
fn variant_switch_round_trip_restores_structural_shape() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);
    bridge.attach_stage(open(variant_stage()));

    let shape_a = names_under(bridge.graph(), bridge.anchor());
    assert_eq!(shape_a, vec!["stageBridge", "asset", "a", "aShape"]);

    bridge.select_variant(&path("/asset"), "rig", "B").unwrap();
    assert!(bridge.node_at(&path("/asset/a")).is_none());
    assert!(bridge.node_at(&path("/asset/b")).is_some());
    assert_eq!(
        names_under(bridge.graph(), bridge.anchor()),
        vec!["stageBridge", "asset", "b", "bShape"]
    );

    bridge.select_variant(&path("/asset"), "rig", "A").unwrap();

    // Same structural shape as the original A selection; native
    // identity is allowed to differ.
    assert_eq!(names_under(bridge.graph(), bridge.anchor()), shape_a);
    assert_eq!(bridge.schema_prims().type_for(&path("/asset/a")), Some("Rig"));
    assert_eq!(rig.imports(), 3);
    assert_eq!(rig.teardowns(), 2);
}

#[test]
fn empty_variant_option_leaves_no_live_entries() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);
    bridge.attach_stage(open(variant_stage()));
    assert!(!bridge.table().is_empty());

    bridge.select_variant(&path("/asset"), "rig", "empty").unwrap();

    assert!(bridge.table().paths_under(&path("/asset")).is_empty());
    assert!(bridge.table().is_empty());
    assert!(bridge.schema_prims().is_empty());
    assert_eq!(bridge.graph().node_count(), 1, "only the anchor survives");
}

// ============================================================================
// Activation Toggles
// ============================================================================

#[test]
fn deactivate_releases_descendants_and_reactivate_restores_them() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);

    let mut stage = Stage::new("world");
    let root = stage.root();
    let world = stage.define_prim(root, "world", "Scope");
    stage.define_prim(world, "rig", "Rig");
    bridge.attach_stage(open(stage));
    assert_eq!(bridge.table().len(), 2);

    bridge.set_prim_active(&path("/world/rig"), false).unwrap();
    assert!(bridge.table().paths_under(&path("/world")).is_empty());
    assert!(bridge.schema_prims().is_empty());
    assert_eq!(bridge.graph().node_count(), 1);

    bridge.set_prim_active(&path("/world/rig"), true).unwrap();
    assert_eq!(bridge.table().len(), 2);
    assert_eq!(bridge.table().count(&path("/world"), AcquireReason::Required), 1);
    assert_eq!(
        bridge
            .table()
            .count(&path("/world/rig"), AcquireReason::TranslatorRef),
        1
    );
    assert_eq!(bridge.graph().node_count(), 4);
}

// ============================================================================
// Coalesced Edits
// ============================================================================

// Two structural edits landing before a flush keep only the most
// recent changed root while pending removals accumulate from both.
// The earlier root is torn down but NOT repopulated — preserved
// observed behavior, deliberately not broadened to a union-of-roots
// resync.
#[test]
fn coalesced_edits_keep_last_root() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);

    let mut stage = Stage::new("coalesce");
    let root = stage.root();
    for name in ["one", "two"] {
        let owner = stage.define_prim(root, name, "Scope");
        stage.add_variant_set(owner, "v");
        stage.define_variant_prim(owner, "v", "A", "a", "Rig");
        stage.define_variant_prim(owner, "v", "B", "b", "Rig");
        let owner_path = ScenePath::root().append(name);
        stage.select_variant(&owner_path, "v", "A").unwrap();
    }
    bridge.attach_stage(open(stage));
    assert!(bridge.node_at(&path("/one/a")).is_some());
    assert!(bridge.node_at(&path("/two/a")).is_some());

    // Two edits, one flush: only the layer-change notices first, then
    // a single objects-changed.
    let handle = bridge.stage_handle().unwrap();
    let (first, second) = {
        let mut stage = handle.lock();
        let first = stage.select_variant(&path("/one"), "v", "B").unwrap();
        let second = stage.select_variant(&path("/two"), "v", "B").unwrap();
        (first[0].clone(), second[0].clone())
    };
    bridge
        .dispatch_notices(&[first, second, StageNotice::ObjectsChanged])
        .unwrap();

    // Removals accumulated from both edits...
    assert!(bridge.node_at(&path("/one/a")).is_none());
    assert!(bridge.node_at(&path("/two/a")).is_none());
    // ...but only the last root was repopulated.
    assert!(bridge.node_at(&path("/two/b")).is_some());
    assert!(bridge.node_at(&path("/one/b")).is_none());
}

// ============================================================================
// Failure Semantics
// ============================================================================

#[test]
fn failed_import_skips_the_prim_but_not_its_siblings() {
    let rig = CountingTranslator::failing_on("Rig", "bad");
    let mut bridge = bridge_with(&[rig.clone()]);

    let mut stage = Stage::new("partial");
    let root = stage.root();
    let grp = stage.define_prim(root, "grp", "Scope");
    stage.define_prim(grp, "bad", "Rig");
    stage.define_prim(grp, "good", "Rig");
    bridge.attach_stage(open(stage));

    assert_eq!(rig.imports(), 1);
    assert!(bridge.schema_prims().contains(&path("/grp/good")));
    assert!(!bridge.schema_prims().contains(&path("/grp/bad")));

    // The failed candidate's chain entry is back at zero counts; the
    // next pass's cleanup collects it.
    let entry = bridge.table().entry(&path("/grp/bad")).unwrap();
    assert!(entry.is_unreferenced());
}

#[test]
fn edits_without_a_stage_are_rejected() {
    let mut bridge = bridge_with(&[CountingTranslator::new("Rig")]);
    let err = bridge.set_prim_active(&path("/x"), false);
    assert!(matches!(err, Err(StageLinkError::StageNotOpen)));
}

#[test]
fn resync_on_an_empty_stage_is_a_no_op() {
    let mut bridge = bridge_with(&[CountingTranslator::new("Rig")]);
    bridge.attach_stage(open(Stage::new("empty")));
    assert_eq!(bridge.graph().node_count(), 1);

    // A forwarded composition notice on the empty stage changes
    // nothing.
    let notices = StageNotice::composition_edit(path("/x"), ChangedFields::ACTIVE);
    bridge.dispatch_notices(&notices).unwrap();
    assert_eq!(bridge.graph().node_count(), 1);
    assert!(bridge.table().is_empty());
}

#[test]
fn edit_at_a_missing_path_reports_prim_not_found() {
    let mut bridge = bridge_with(&[CountingTranslator::new("Rig")]);
    bridge.attach_stage(open(variant_stage()));
    let err = bridge.set_prim_active(&path("/nowhere"), false);
    assert!(matches!(err, Err(StageLinkError::PrimNotFound(_))));
}

#[test]
fn unresolved_root_path_falls_back_to_the_hierarchy_root() {
    let mut bridge = bridge_with(&[CountingTranslator::new("Rig")]);
    bridge.attach_stage(open(variant_stage()));

    bridge.set_root_path(path("/asset"));
    assert_eq!(bridge.root_path(), &path("/asset"));

    bridge.set_root_path(path("/does/not/exist"));
    assert_eq!(bridge.root_path(), &ScenePath::root());
}

// ============================================================================
// In-Place Updates
// ============================================================================

#[test]
fn updatable_prims_are_refreshed_without_a_recreate_cycle() {
    let mesh = CountingTranslator::updatable("Mesh");
    let mut bridge = bridge_with(&[mesh.clone()]);

    // The same prim name and type on both sides of the switch.
    let mut stage = Stage::new("swap");
    let root = stage.root();
    let asset = stage.define_prim(root, "asset", "Scope");
    stage.add_variant_set(asset, "v");
    stage.define_variant_prim(asset, "v", "A", "geo", "Mesh");
    stage.define_variant_prim(asset, "v", "B", "geo", "Mesh");
    stage.select_variant(&path("/asset"), "v", "A").unwrap();
    bridge.attach_stage(open(stage));

    let node_before = bridge.node_at(&path("/asset/geo")).unwrap();
    let count_before = bridge.graph().node_count();

    bridge.select_variant(&path("/asset"), "v", "B").unwrap();

    assert_eq!(bridge.node_at(&path("/asset/geo")), Some(node_before));
    assert_eq!(bridge.graph().node_count(), count_before);
    assert_eq!(mesh.imports(), 1, "no second import");
    assert_eq!(mesh.teardowns(), 0);
    assert_eq!(mesh.updates(), 1);
}

// ============================================================================
// Selection Ownership
// ============================================================================

#[test]
fn selected_paths_survive_resync_passes() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);

    let mut stage = Stage::new("world");
    let root = stage.root();
    let world = stage.define_prim(root, "world", "Scope");
    stage.define_prim(world, "rig", "Rig");
    bridge.attach_stage(open(stage));

    bridge.set_selected(&path("/world/rig"), true);

    // Deactivation tears the representation down, but the selected
    // entry must survive the pass.
    bridge.set_prim_active(&path("/world/rig"), false).unwrap();
    let entry = bridge.table().entry(&path("/world/rig")).unwrap();
    assert_eq!(entry.selected, 1);
    assert_eq!(entry.translator_refs, 0);

    // Reactivation rebuilds the chain and the representation on top
    // of the surviving entry.
    bridge.set_prim_active(&path("/world/rig"), true).unwrap();
    let entry = bridge.table().entry(&path("/world/rig")).unwrap();
    assert_eq!(entry.selected, 1);
    assert_eq!(entry.required, 1);
    assert_eq!(entry.translator_refs, 1);
    let node = bridge.node_at(&path("/world/rig")).unwrap();
    assert!(bridge.graph().contains(node));

    // Releasing the selection returns the count to its prior value.
    bridge.set_selected(&path("/world/rig"), false);
    assert_eq!(bridge.table().entry(&path("/world/rig")).unwrap().selected, 0);
}

// ============================================================================
// Excluded Geometry & Imaging
// ============================================================================

#[test]
fn excluded_subtrees_feed_the_imaging_state() {
    let mut bridge = bridge_with(&[CountingTranslator::new("Rig")]);

    let mut stage = Stage::new("exclusions");
    let root = stage.root();
    let world = stage.define_prim(root, "world", "Scope");
    let extras = stage.define_prim(world, "extras", "Scope");
    stage.set_metadata_raw(extras, md::EXCLUDE_FROM_PROXY, MetadataValue::Bool(true));
    stage.define_prim(extras, "mesh", "Mesh");
    bridge.attach_stage(open(stage));

    assert_eq!(bridge.imaging().excluded(), &[path("/world/extras")]);
    assert!(bridge.is_path_excluded(&path("/world/extras/mesh")));
    assert!(!bridge.is_path_excluded(&path("/world")));

    // Descendants without their own tag get the excluded schema type
    // stamped during the walk.
    let handle = bridge.stage_handle().unwrap();
    {
        let stage = handle.lock();
        let mesh = stage.prim_at(&path("/world/extras/mesh")).unwrap();
        assert_eq!(
            mesh.metadata(md::PROXY_SCHEMA_TYPE).and_then(MetadataValue::as_token),
            Some("excludedGeometry")
        );
    }

    // Explicitly listed paths merge in and trigger a rebuild.
    let rebuilds = bridge.imaging().rebuilds();
    bridge.set_excluded_paths(vec![path("/world/other")]);
    assert_eq!(bridge.imaging().rebuilds(), rebuilds + 1);
    assert_eq!(
        bridge.imaging().excluded(),
        &[path("/world/extras"), path("/world/other")]
    );
}

// ============================================================================
// Driven Transforms & Edit Targets
// ============================================================================

#[test]
fn driven_values_write_back_through_the_bridge() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);

    let mut stage = Stage::new("world");
    let root = stage.root();
    let world = stage.define_prim(root, "world", "Scope");
    stage.define_prim(world, "rig", "Rig");
    bridge.attach_stage(open(stage));

    bridge.driven_mut().set_path(0, path("/world/rig"));
    bridge.driven_mut().set_matrix(0, Mat4::IDENTITY);
    bridge.driven_mut().set_visibility(0, false);

    let written = bridge.evaluate_driven(TimeCode(3.0)).unwrap();
    assert_eq!(written, 2);

    let handle = bridge.stage_handle().unwrap();
    let stage = handle.lock();
    let prim = stage.prim_at(&path("/world/rig")).unwrap();
    assert_eq!(prim.xform_ops().categories(), vec![XformOpCategory::Matrix]);
    assert_eq!(prim.visibility_at(TimeCode(3.0)), Some(Visibility::Invisible));
}

#[test]
fn edit_target_switches_are_tracked_but_do_not_resync() {
    let rig = CountingTranslator::new("Rig");
    let mut bridge = bridge_with(&[rig.clone()]);
    bridge.attach_stage(open(variant_stage()));
    let imports = rig.imports();

    bridge.set_edit_target("anim_layer").unwrap();

    assert_eq!(bridge.current_edit_target(), Some("anim_layer"));
    assert!(bridge.layer_was_edit_target("anim_layer"));
    assert!(!bridge.layer_was_edit_target("other_layer"));
    assert_eq!(rig.imports(), imports, "no resync was triggered");
}
