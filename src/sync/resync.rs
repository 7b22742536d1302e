//! Incremental resynchronization.
//!
//! A resync pass consumes the dirty state flushed by the change
//! listener and reconciles the native hierarchy under the changed
//! root with the current composed stage: tearing down entries queued
//! for removal, collecting the schema prims now present, keeping
//! updatable representations alive, rebuilding transform chains, and
//! driving translator imports. The pass borrows only the subsystems
//! it needs, so the bridge can hand out disjoint mutable references
//! without aliasing.
//!
//! The pass runs under the required-path table's reentrancy guard: a
//! nested resync (e.g. a translator editing the stage mid-import)
//! fails fast instead of corrupting reference counts.

use rustc_hash::FxHashMap;

use crate::graph::{HostGraph, NativeNode};
use crate::path::ScenePath;
use crate::stage::{md, PrimId, Stage};
use crate::stage::MetadataValue;
use crate::sync::required_paths::{AcquireReason, RequiredPathTable};
use crate::translators::{SchemaPrimRegistry, TranslatorContext, TranslatorManufacture, TranslatorRef};

/// Token stamped on prims inside excluded subtrees.
const EXCLUDED_GEOMETRY_TOKEN: &str = "excludedGeometry";

/// What a finished pass reports back to the bridge.
#[derive(Debug, Default)]
pub(crate) struct ResyncOutcome {
    /// Paths whose transform binding could not be repointed; marked
    /// for removal on the next flush.
    pub prune: Vec<ScenePath>,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// One resynchronization pass over the subsystems it mutates.
pub(crate) struct ResyncPass<'a> {
    pub stage: &'a mut Stage,
    pub graph: &'a mut HostGraph,
    pub table: &'a mut RequiredPathTable,
    pub manufacture: &'a TranslatorManufacture,
    pub context: &'a mut TranslatorContext,
    pub schema_prims: &'a mut SchemaPrimRegistry,
    /// Transform-node → prim bindings maintained by the bridge.
    pub bindings: &'a mut FxHashMap<NativeNode, PrimId>,
    /// Refreshed set of explicitly tagged excluded subtree roots.
    pub excluded_tagged: &'a mut Vec<ScenePath>,
    /// The bridge's own transform root; chains hang under it.
    pub anchor: NativeNode,
}

struct Candidate {
    path: ScenePath,
    id: PrimId,
    type_token: String,
}

impl ResyncPass<'_> {
    pub fn run(mut self, changed_root: &ScenePath, pending_removals: &[ScenePath]) -> ResyncOutcome {
        let mut outcome = ResyncOutcome::default();
        log::debug!(
            "resync: root={changed_root} removals={}",
            pending_removals.len()
        );

        self.table.lock();

        // Unwind entries queued for removal before looking at the new
        // composition. Updatable-capable entries whose prim survived
        // with the same type are kept so the partition below can
        // reuse them in place.
        for path in pending_removals {
            if self.tear_down_entry(path) {
                outcome.removed += 1;
            }
        }

        // Walk the changed subtree, collecting schema prims and
        // refreshing the excluded-geometry tags as a side effect.
        let candidates = self.collect_candidates(changed_root);
        self.refresh_excluded_tags();

        // Partition: a prim is updatable in place iff its declared
        // type matches the type on record, the translator can update
        // and parents under a transform, and a native node already
        // backs the path. Everything else goes through create.
        let mut updatable: Vec<(Candidate, TranslatorRef, NativeNode)> = Vec::new();
        let mut to_create: Vec<(Candidate, TranslatorRef)> = Vec::new();
        for candidate in candidates {
            let Some(translator) = self.manufacture.get(&candidate.type_token) else {
                log::warn!(
                    "resync: no translator for schema prim {} of type {:?}, skipping",
                    candidate.path,
                    candidate.type_token
                );
                continue;
            };
            let recorded = self.context.type_for(&candidate.path);
            let type_matches = recorded == Some(candidate.type_token.as_str());
            match self.table.node_for(&candidate.path) {
                Some(node)
                    if type_matches
                        && translator.supports_update()
                        && translator.needs_transform_parent() =>
                {
                    updatable.push((candidate, translator, node));
                }
                _ => to_create.push((candidate, translator)),
            }
        }

        // Drop entries orphaned by the unwinding above and destroy
        // their native nodes. Exactly one cleanup per pass.
        for (path, node) in self.table.cleanup() {
            log::trace!("resync: cleaning up {path}");
            if let Some(node) = node {
                self.bindings.remove(&node);
                self.graph.destroy_node(node);
            }
        }

        // Refresh the recorded types for surviving records.
        let declared: Vec<(ScenePath, String)> = updatable
            .iter()
            .map(|(c, _, _)| (c.path.clone(), c.type_token.clone()))
            .collect();
        self.context
            .update_prim_types(declared.iter().map(|(p, t)| (p, t.as_str())));

        // Update pass: retained representations refresh in place.
        for (candidate, translator, node) in &updatable {
            let result = {
                let Some(prim) = self.stage.prim(candidate.id) else {
                    continue;
                };
                translator.update(&prim, *node, self.graph)
            };
            match result {
                Ok(()) => outcome.updated += 1,
                Err(err) => log::warn!("resync: update of {} failed: {err}", candidate.path),
            }
        }

        // Create pass: build/reuse ancestor transform chains, then
        // let the translator materialize the prim. A failed import
        // does not abort the pass; siblings still attempt creation.
        let mut created: Vec<(Candidate, TranslatorRef, NativeNode)> = Vec::new();
        for (candidate, translator) in to_create {
            let parent = self.ensure_transform_chain(&candidate.path);
            let result = {
                let Some(prim) = self.stage.prim(candidate.id) else {
                    self.release_transform_chain(&candidate.path);
                    continue;
                };
                translator.import(&prim, Some(parent), self.graph)
            };
            match result {
                Ok(node) => {
                    self.table.acquire(&candidate.path, AcquireReason::TranslatorRef);
                    self.context
                        .record(candidate.path.clone(), &candidate.type_token, Some(node));
                    self.schema_prims
                        .insert(candidate.path.clone(), &candidate.type_token);
                    outcome.created += 1;
                    created.push((candidate, translator, node));
                }
                Err(err) => {
                    log::warn!("resync: import of {} failed: {err}", candidate.path);
                    self.release_transform_chain(&candidate.path);
                }
            }
        }

        // Connection pass: cross-references between sibling
        // translators are only valid once every node exists.
        for (candidate, translator, node) in updatable.iter().chain(created.iter()) {
            let result = {
                let Some(prim) = self.stage.prim(candidate.id) else {
                    continue;
                };
                translator.post_import(&prim, *node, self.graph)
            };
            if let Err(err) = result {
                log::warn!("resync: post-import of {} failed: {err}", candidate.path);
            }
        }

        self.table.unlock();

        outcome.prune = self.validate_transforms();
        log::debug!(
            "resync: created={} updated={} removed={} prune={}",
            outcome.created,
            outcome.updated,
            outcome.removed,
            outcome.prune.len()
        );
        outcome
    }

    /// Unwinds one queued removal. Returns whether anything was torn
    /// down. Entries whose translator supports in-place update (and
    /// whose prim survived with the same declared type), or whose
    /// translator keeps inactive prims alive, are left intact.
    fn tear_down_entry(&mut self, path: &ScenePath) -> bool {
        let Some(type_token) = self.schema_prims.type_for(path).map(str::to_string) else {
            // Not a live schema entry (e.g. a pruned transform path):
            // drop it from live bookkeeping so cleanup collects it.
            if self.table.entry(path).is_some() {
                log::trace!("resync: marking stray entry {path} unreferenced");
                self.table.mark_unreferenced(path);
                return true;
            }
            return false;
        };

        let translator = self.manufacture.get(&type_token);
        if let Some(translator) = &translator {
            let prim = self.stage.prim_at(path);
            let same_type = prim
                .map(|p| p.type_token() == type_token)
                .unwrap_or(false);
            let active = prim.map(|p| p.active()).unwrap_or(false);
            let keep_updatable = same_type
                && active
                && translator.supports_update()
                && translator.needs_transform_parent();
            let keep_inactive = same_type && !active && translator.supports_inactive();
            if keep_updatable || keep_inactive {
                log::trace!("resync: keeping entry {path} ({type_token}) alive");
                return false;
            }
        }

        let node = self.context.node_for(path);
        if let Some(translator) = translator {
            if let Err(err) = translator.tear_down(path, node, self.graph) {
                log::warn!("resync: teardown of {path} failed: {err}");
            }
        } else {
            log::warn!("resync: no translator for {path} ({type_token}), dropping entry");
        }
        if let Some(node) = node {
            self.bindings.remove(&node);
        }

        self.schema_prims.remove(path);
        self.context.forget(path);
        self.table.release(path, AcquireReason::TranslatorRef);
        self.release_transform_chain(path);
        true
    }

    /// Collects the schema prims in the composed subtree under
    /// `changed_root`, in traversal order.
    fn collect_candidates(&self, changed_root: &ScenePath) -> Vec<Candidate> {
        let Some(start) = self.stage.prim_at_path(changed_root) else {
            log::debug!("resync: changed root {changed_root} no longer resolves");
            return Vec::new();
        };
        self.stage
            .walk_active(start)
            .into_iter()
            .filter_map(|id| {
                let prim = self.stage.prim(id)?;
                let type_token = prim.type_token();
                self.manufacture.is_schema_type(type_token).then(|| Candidate {
                    path: prim.path(),
                    id,
                    type_token: type_token.to_string(),
                })
            })
            .collect()
    }

    /// Refreshes the excluded-from-proxy tag set over the whole stage
    /// and stamps the excluded token onto descendants lacking their
    /// own explicit tag.
    fn refresh_excluded_tags(&mut self) {
        self.excluded_tagged.clear();
        let walked = self.stage.walk_active(self.stage.root());

        for &id in &walked {
            let Some(prim) = self.stage.prim(id) else { continue };
            if prim
                .metadata(md::EXCLUDE_FROM_PROXY)
                .and_then(MetadataValue::as_bool)
                == Some(true)
            {
                self.excluded_tagged.push(prim.path());
            }
        }
        self.excluded_tagged.sort();

        for id in walked {
            let (path, has_own_tag) = {
                let Some(prim) = self.stage.prim(id) else { continue };
                (prim.path(), prim.metadata(md::EXCLUDE_FROM_PROXY).is_some())
            };
            let in_excluded_subtree = self.excluded_tagged.iter().any(|t| path.has_prefix(t));
            if in_excluded_subtree && !has_own_tag {
                self.stage.set_metadata_raw(
                    id,
                    md::PROXY_SCHEMA_TYPE,
                    MetadataValue::Token(EXCLUDED_GEOMETRY_TOKEN.to_string()),
                );
            }
        }
    }

    /// Builds or reuses the transform-node chain covering every path
    /// element down to `path` inclusive, acquiring each element with
    /// the Required reason. Shared ancestors are reused across
    /// sibling prims. Returns the node at `path`.
    fn ensure_transform_chain(&mut self, path: &ScenePath) -> NativeNode {
        let mut parent = self.anchor;
        for element in path.chain() {
            self.table.acquire(&element, AcquireReason::Required);
            // A surviving entry may hold a handle whose node was
            // destroyed when an ancestor's subtree was cleaned up;
            // only a live node can be reused.
            if let Some(existing) = self.table.node_for(&element) {
                if self.graph.contains(existing) {
                    parent = existing;
                    continue;
                }
            }
            let node = self.graph.create_node(element.name(), Some(parent));
            self.table.set_node(&element, node);
            if let Some(prim) = self.stage.prim_at_path(&element) {
                self.bindings.insert(node, prim);
            }
            parent = node;
        }
        parent
    }

    /// Releases the Required counts acquired by
    /// [`Self::ensure_transform_chain`] for `path`.
    fn release_transform_chain(&mut self, path: &ScenePath) {
        for element in path.chain() {
            self.table.release(&element, AcquireReason::Required);
        }
    }

    /// Transform-validation pass: entries whose bound prim vanished
    /// are repointed to the prim now composed at the same path —
    /// unless that prim declares an explicit custom transform type —
    /// and otherwise marked for pruning.
    fn validate_transforms(&mut self) -> Vec<ScenePath> {
        let snapshot: Vec<(ScenePath, NativeNode)> = self
            .table
            .iter()
            .filter_map(|(path, entry)| entry.node.map(|n| (path.clone(), n)))
            .collect();

        let mut prune = Vec::new();
        for (path, node) in snapshot {
            if !self.graph.contains(node) {
                self.bindings.remove(&node);
                continue;
            }
            let Some(&bound) = self.bindings.get(&node) else {
                continue;
            };
            let resolved = self.stage.prim_at_path(&path);
            if resolved == Some(bound) {
                continue;
            }
            match resolved {
                Some(new_prim) => {
                    let custom_type = self
                        .stage
                        .prim(new_prim)
                        .and_then(|p| p.metadata(md::TRANSFORM_TYPE).cloned());
                    if custom_type.is_none() {
                        log::trace!("resync: repointing transform at {path}");
                        self.bindings.insert(node, new_prim);
                    } else {
                        prune.push(path);
                    }
                }
                None => prune.push(path),
            }
        }
        prune.sort();
        prune
    }
}
