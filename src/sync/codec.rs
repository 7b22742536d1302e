//! Serialization codec for transient sync state.
//!
//! The host graph cannot serialize handles to external-library
//! objects, so the engine's bookkeeping is flattened to text at save
//! time and rebuilt at load time. Three independent blobs are
//! produced:
//!
//! 1. the required-path table, as repeated records
//!    `nodePath sceneScenePath required selected translatorRefs;`
//! 2. the translator context (opaque, delegated)
//! 3. the schema-prim registry (opaque, delegated)
//!
//! Restore order matters and is fixed: the required-path table is
//! applied first, then the translator context, then the schema-prim
//! registry — the later blobs resolve native nodes by path through
//! the already-restored table. Each blob is cleared as soon as it has
//! been consumed so repeated save cycles never accumulate stale text.
//!
//! Record fields are separated by single spaces and records by `;`,
//! with no escaping: node and scene paths must not contain either
//! separator. That constraint is documented, not enforced.

use crate::graph::HostGraph;
use crate::path::ScenePath;
use crate::sync::required_paths::{RequiredPathEntry, RequiredPathTable};
use crate::translators::{SchemaPrimRegistry, TranslatorContext};

/// The three persisted blobs, in restore order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedBlobs {
    pub ref_table: String,
    pub translator_context: String,
    pub schema_prims: String,
}

/// Serializes the transient tables into their three text blobs.
///
/// Table entries without a bound native node are transient by nature
/// (they cannot be resolved again on restore) and are skipped.
#[must_use]
pub fn dump(
    table: &RequiredPathTable,
    graph: &HostGraph,
    context: &TranslatorContext,
    schema_prims: &SchemaPrimRegistry,
) -> PersistedBlobs {
    let mut entries: Vec<(&ScenePath, &RequiredPathEntry)> = table.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut ref_table = String::new();
    for (path, entry) in entries {
        let Some(node_path) = entry.node.and_then(|n| graph.node_path(n)) else {
            log::debug!("codec: skipping nodeless entry at {path}");
            continue;
        };
        ref_table.push_str(&node_path);
        ref_table.push(' ');
        ref_table.push_str(path.as_str());
        ref_table.push(' ');
        ref_table.push_str(&entry.required.to_string());
        ref_table.push(' ');
        ref_table.push_str(&entry.selected.to_string());
        ref_table.push(' ');
        ref_table.push_str(&entry.translator_refs.to_string());
        ref_table.push(';');
    }

    PersistedBlobs {
        ref_table,
        translator_context: context.serialise(),
        schema_prims: schema_prims.serialise(),
    }
}

/// Applies the three blobs in their required order, clearing each
/// field immediately after it is consumed. Malformed ref-table rows
/// (bad field count, unresolvable node path, unparsable counts) are
/// dropped with a warning; the remaining rows still apply.
pub fn restore(
    blobs: &mut PersistedBlobs,
    table: &mut RequiredPathTable,
    graph: &HostGraph,
    context: &mut TranslatorContext,
    schema_prims: &mut SchemaPrimRegistry,
) {
    let ref_table = std::mem::take(&mut blobs.ref_table);
    restore_ref_table(&ref_table, table, graph);

    let ctx_blob = std::mem::take(&mut blobs.translator_context);
    context.deserialise(&ctx_blob, |path| table.node_for(path));

    let schema_blob = std::mem::take(&mut blobs.schema_prims);
    schema_prims.deserialise(&schema_blob);
}

fn restore_ref_table(blob: &str, table: &mut RequiredPathTable, graph: &HostGraph) {
    for record in blob.split(';').filter(|r| !r.is_empty()) {
        let fields: Vec<&str> = record.split_whitespace().collect();
        if fields.len() != 5 {
            log::warn!("codec: dropping malformed ref-table record {record:?}");
            continue;
        }

        let Some(node) = graph.find_by_path(fields[0]) else {
            log::warn!("codec: dropping record for unresolved node path {:?}", fields[0]);
            continue;
        };
        let Ok(path) = ScenePath::new(fields[1]) else {
            log::warn!("codec: dropping record with bad scene path {:?}", fields[1]);
            continue;
        };
        let counts: std::result::Result<Vec<u32>, _> =
            fields[2..5].iter().map(|f| f.parse::<u32>()).collect();
        let Ok(counts) = counts else {
            log::warn!("codec: dropping record with bad counts {record:?}");
            continue;
        };

        table.insert_entry(
            path,
            RequiredPathEntry {
                node: Some(node),
                required: counts[0],
                selected: counts[1],
                translator_refs: counts[2],
            },
        );
    }
}
