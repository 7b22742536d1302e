//! Translator capability contract and registries.
//!
//! A translator materializes (and tears down) the native
//! representation of a "schema prim" — a prim whose type token it has
//! registered for. This module holds:
//! - [`Translator`]: the capability trait the engine consumes
//! - [`TranslatorManufacture`]: type-token → translator resolution
//! - [`TranslatorContext`]: per-path records of what was imported,
//!   round-tripped as an opaque blob across save/reload
//! - [`SchemaPrimRegistry`]: the set of live schema prims, queried by
//!   the pre-removal callback and likewise blob round-tripped

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::graph::{HostGraph, NativeNode};
use crate::path::ScenePath;
use crate::stage::Prim;

/// Capability contract for materializing schema prims.
///
/// `import` runs once per candidate prim during a resync pass;
/// `post_import` runs in a second pass after every import completed,
/// because cross-references between sibling translators are only
/// valid once all nodes exist.
pub trait Translator {
    /// The prim type token this translator handles.
    fn type_token(&self) -> &str;

    /// Whether an existing native representation can be updated in
    /// place instead of destroyed and recreated.
    fn supports_update(&self) -> bool {
        false
    }

    /// Whether the native representation lives under a transform
    /// parent chain.
    fn needs_transform_parent(&self) -> bool {
        true
    }

    /// Whether the translator keeps its representation alive for
    /// inactive prims.
    fn supports_inactive(&self) -> bool {
        false
    }

    /// Materializes the native representation under `parent`,
    /// returning the created node.
    fn import(
        &self,
        prim: &Prim<'_>,
        parent: Option<NativeNode>,
        graph: &mut HostGraph,
    ) -> Result<NativeNode>;

    /// Post-creation connection step; runs after all imports of the
    /// pass completed.
    fn post_import(&self, prim: &Prim<'_>, node: NativeNode, graph: &mut HostGraph) -> Result<()> {
        let _ = (prim, node, graph);
        Ok(())
    }

    /// Updates an existing representation in place.
    fn update(&self, prim: &Prim<'_>, node: NativeNode, graph: &mut HostGraph) -> Result<()> {
        let _ = (prim, node, graph);
        Ok(())
    }

    /// Tears down the representation previously imported for `path`.
    fn tear_down(
        &self,
        path: &ScenePath,
        node: Option<NativeNode>,
        graph: &mut HostGraph,
    ) -> Result<()>;
}

/// Shared translator handle.
pub type TranslatorRef = Arc<dyn Translator>;

/// Type-token keyed translator registry.
#[derive(Default, Clone)]
pub struct TranslatorManufacture {
    by_type: FxHashMap<String, TranslatorRef>,
}

impl TranslatorManufacture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a translator under its type token. Last registration
    /// wins.
    pub fn register(&mut self, translator: TranslatorRef) {
        self.by_type
            .insert(translator.type_token().to_string(), translator);
    }

    /// Resolves the translator for a type token.
    #[must_use]
    pub fn get(&self, type_token: &str) -> Option<TranslatorRef> {
        self.by_type.get(type_token).map(Arc::clone)
    }

    /// True if some translator recognizes the type token — the
    /// definition of a "schema prim".
    #[must_use]
    pub fn is_schema_type(&self, type_token: &str) -> bool {
        self.by_type.contains_key(type_token)
    }
}

// ============================================================================
// Translator context
// ============================================================================

/// One imported-path record in the translator context.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    /// Type token recorded at import time.
    pub type_token: String,
    /// Native node the translator produced, when still bound.
    pub node: Option<NativeNode>,
}

/// Per-path bookkeeping of what the translators imported.
///
/// Serialized as an opaque blob (`scenePath typeToken;` records) and
/// restored after the required-path table, resolving nodes by path
/// through it.
#[derive(Default)]
pub struct TranslatorContext {
    entries: FxHashMap<ScenePath, ContextEntry>,
}

impl TranslatorContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or refreshes) the import record for a path.
    pub fn record(&mut self, path: ScenePath, type_token: &str, node: Option<NativeNode>) {
        self.entries.insert(
            path,
            ContextEntry {
                type_token: type_token.to_string(),
                node,
            },
        );
    }

    /// Drops the record for a path.
    pub fn forget(&mut self, path: &ScenePath) {
        self.entries.remove(path);
    }

    /// The type token on record for a path.
    #[must_use]
    pub fn type_for(&self, path: &ScenePath) -> Option<&str> {
        self.entries.get(path).map(|e| e.type_token.as_str())
    }

    /// The node on record for a path.
    #[must_use]
    pub fn node_for(&self, path: &ScenePath) -> Option<NativeNode> {
        self.entries.get(path).and_then(|e| e.node)
    }

    /// Refreshes the recorded type tokens from currently declared
    /// prim types.
    pub fn update_prim_types<'a>(&mut self, declared: impl Iterator<Item = (&'a ScenePath, &'a str)>) {
        for (path, type_token) in declared {
            if let Some(entry) = self.entries.get_mut(path) {
                entry.type_token = type_token.to_string();
            }
        }
    }

    /// Serializes the context to its opaque blob form.
    #[must_use]
    pub fn serialise(&self) -> String {
        let mut paths: Vec<&ScenePath> = self.entries.keys().collect();
        paths.sort();
        let mut out = String::new();
        for path in paths {
            let entry = &self.entries[path];
            out.push_str(path.as_str());
            out.push(' ');
            out.push_str(&entry.type_token);
            out.push(';');
        }
        out
    }

    /// Restores the context from its blob form, resolving node
    /// bindings by path through `resolve` (the already-restored
    /// required-path table). Malformed records are dropped.
    pub fn deserialise(&mut self, blob: &str, resolve: impl Fn(&ScenePath) -> Option<NativeNode>) {
        self.entries.clear();
        for record in blob.split(';').filter(|r| !r.is_empty()) {
            let mut fields = record.split_whitespace();
            let (Some(path), Some(type_token)) = (fields.next(), fields.next()) else {
                log::warn!("translator context: dropping malformed record {record:?}");
                continue;
            };
            let Ok(path) = ScenePath::new(path) else {
                log::warn!("translator context: dropping record with bad path {path:?}");
                continue;
            };
            let node = resolve(&path);
            self.record(path, type_token, node);
        }
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

// ============================================================================
// Schema prim registry
// ============================================================================

/// The set of live schema prims, keyed by path.
///
/// The pre-removal callback queries it for entries rooted at a changed
/// path; the resynchronizer tears those entries down before
/// repopulating. Round-trips as an opaque blob of
/// `scenePath typeToken;` records.
#[derive(Default)]
pub struct SchemaPrimRegistry {
    entries: FxHashMap<ScenePath, String>,
}

impl SchemaPrimRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live schema prim.
    pub fn insert(&mut self, path: ScenePath, type_token: &str) {
        self.entries.insert(path, type_token.to_string());
    }

    /// Removes a schema prim entry, returning its type token.
    pub fn remove(&mut self, path: &ScenePath) -> Option<String> {
        self.entries.remove(path)
    }

    #[must_use]
    pub fn contains(&self, path: &ScenePath) -> bool {
        self.entries.contains_key(path)
    }

    /// The type token a live entry was imported as.
    #[must_use]
    pub fn type_for(&self, path: &ScenePath) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// All entry paths rooted at `root`, sorted parents-first. This is
    /// the pre-removal query invoked when a composition change is
    /// notified.
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

    /// Serializes the registry to its opaque blob form.
    #[must_use]
    pub fn serialise(&self) -> String {
        let mut paths: Vec<&ScenePath> = self.entries.keys().collect();
        paths.sort();
        let mut out = String::new();
        for path in paths {
            out.push_str(path.as_str());
            out.push(' ');
            out.push_str(&self.entries[path]);
            out.push(';');
        }
        out
    }

    /// Restores the registry from its blob form. Malformed records
    /// are dropped.
    pub fn deserialise(&mut self, blob: &str) {
        self.entries.clear();
        for record in blob.split(';').filter(|r| !r.is_empty()) {
            let mut fields = record.split_whitespace();
            let (Some(path), Some(type_token)) = (fields.next(), fields.next()) else {
                log::warn!("schema prim registry: dropping malformed record {record:?}");
                continue;
            };
            let Ok(path) = ScenePath::new(path) else {
                log::warn!("schema prim registry: dropping record with bad path {path:?}");
                continue;
            };
            self.insert(path, type_token);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates live entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&ScenePath, &str)> {
        self.entries.iter().map(|(p, t)| (p, t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ScenePath {
        ScenePath::new(s).unwrap()
    }

    #[test]
    fn registry_pre_removal_query_is_prefix_rooted() {
        let mut reg = SchemaPrimRegistry::new();
        reg.insert(path("/a/rig"), "Rig");
        reg.insert(path("/a/rig/arm"), "Limb");
        reg.insert(path("/ab/rig"), "Rig");

        let under = reg.paths_under(&path("/a"));
        assert_eq!(under, vec![path("/a/rig"), path("/a/rig/arm")]);
    }

    #[test]
    fn registry_blob_round_trip() {
        let mut reg = SchemaPrimRegistry::new();
        reg.insert(path("/a"), "Rig");
        reg.insert(path("/b/c"), "Limb");

        let blob = reg.serialise();
        let mut restored = SchemaPrimRegistry::new();
        restored.deserialise(&blob);

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.type_for(&path("/a")), Some("Rig"));
        assert_eq!(restored.type_for(&path("/b/c")), Some("Limb"));
    }

    #[test]
    fn context_restore_resolves_nodes_by_path() {
        let mut graph = HostGraph::new();
        let node = graph.create_node("n", None);

        let mut ctx = TranslatorContext::new();
        ctx.record(path("/a"), "Rig", Some(node));
        ctx.record(path("/b"), "Limb", None);
        let blob = ctx.serialise();

        let mut restored = TranslatorContext::new();
        restored.deserialise(&blob, |p| (p == &path("/a")).then_some(node));
        assert_eq!(restored.node_for(&path("/a")), Some(node));
        assert_eq!(restored.node_for(&path("/b")), None);
        assert_eq!(restored.type_for(&path("/b")), Some("Limb"));
    }

    #[test]
    fn malformed_records_are_dropped() {
        let mut reg = SchemaPrimRegistry::new();
        reg.deserialise("/a Rig;garbage;/b Limb;");
        assert_eq!(reg.len(), 2);
    }
}
