//! Prim specs and read-only prim views.
//!
//! A [`PrimSpec`] is the authored record for one prim: its type token,
//! active flag, metadata, variant sets, transform-op stack and
//! visibility track. Specs live in the stage's arena; consumers see
//! them through the read-only [`Prim`] view.

use rustc_hash::FxHashMap;
use slotmap::new_key_type;

use crate::path::ScenePath;
use crate::stage::stage::Stage;
use crate::stage::xform::{TimeCode, XformOpStack};

new_key_type! {
    /// Generational key into the stage's prim arena.
    pub struct PrimId;
}

/// Well-known metadata keys.
pub mod md {
    /// Boolean tag marking a subtree to be represented as ordinary
    /// host geometry instead of through a translator.
    pub const EXCLUDE_FROM_PROXY: &str = "excludeFromProxy";
    /// Token naming a custom transform-node type; its presence blocks
    /// transform repointing during validation.
    pub const TRANSFORM_TYPE: &str = "transformType";
    /// Token stamped onto prims inside an excluded subtree so later
    /// passes recognize them without re-walking ancestors.
    pub const PROXY_SCHEMA_TYPE: &str = "proxySchemaType";
}

/// A metadata value. Only the two shapes the engine reads are modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Bool(bool),
    Token(String),
}

impl MetadataValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            MetadataValue::Token(_) => None,
        }
    }

    #[must_use]
    pub fn as_token(&self) -> Option<&str> {
        match self {
            MetadataValue::Token(t) => Some(t),
            MetadataValue::Bool(_) => None,
        }
    }
}

/// Time-sampled prim visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Inherited,
    Invisible,
}

/// A named variant set on a prim: a selected option and per-option
/// child lists. Only the selected option's children take part in
/// composed traversal.
#[derive(Debug, Clone, Default)]
pub struct VariantSet {
    pub name: String,
    pub selection: Option<String>,
    pub(crate) options: FxHashMap<String, Vec<PrimId>>,
}

impl VariantSet {
    /// Children contributed by the currently selected option.
    #[must_use]
    pub(crate) fn selected_children(&self) -> &[PrimId] {
        self.selection
            .as_deref()
            .and_then(|sel| self.options.get(sel))
            .map_or(&[], Vec::as_slice)
    }
}

/// The authored record for one prim.
#[derive(Debug, Clone)]
pub struct PrimSpec {
    pub(crate) name: String,
    pub(crate) type_token: String,
    pub(crate) active: bool,
    pub(crate) parent: Option<PrimId>,
    pub(crate) children: Vec<PrimId>,
    pub(crate) variant_sets: Vec<VariantSet>,
    pub(crate) metadata: FxHashMap<String, MetadataValue>,
    pub(crate) xform_ops: XformOpStack,
    pub(crate) visibility: Vec<(TimeCode, Visibility)>,
}

impl PrimSpec {
    pub(crate) fn new(name: &str, type_token: &str, parent: Option<PrimId>) -> Self {
        Self {
            name: name.to_string(),
            type_token: type_token.to_string(),
            active: true,
            parent,
            children: Vec::new(),
            variant_sets: Vec::new(),
            metadata: FxHashMap::default(),
            xform_ops: XformOpStack::new(),
            visibility: Vec::new(),
        }
    }

    pub(crate) fn set_visibility(&mut self, time: TimeCode, value: Visibility) {
        match self.visibility.binary_search_by(|(t, _)| t.cmp(&time)) {
            Ok(idx) => self.visibility[idx].1 = value,
            Err(idx) => self.visibility.insert(idx, (time, value)),
        }
    }
}

/// Read-only view of a prim at a path in the composed stage.
///
/// Cheap to construct; borrows the stage for its lifetime.
#[derive(Clone, Copy)]
pub struct Prim<'a> {
    pub(crate) stage: &'a Stage,
    pub(crate) id: PrimId,
}

impl<'a> Prim<'a> {
    /// The prim's generational id. Stable until the spec is removed.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PrimId {
        self.id
    }

    fn spec(&self) -> &'a PrimSpec {
        // A Prim view is only handed out for live ids.
        &self.stage.prims[self.id]
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.spec().name
    }

    /// The prim's declared type token.
    #[must_use]
    pub fn type_token(&self) -> &'a str {
        &self.spec().type_token
    }

    /// The authored active flag.
    #[must_use]
    pub fn active(&self) -> bool {
        self.spec().active
    }

    /// Looks up an arbitrary metadata key.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&'a MetadataValue> {
        self.spec().metadata.get(key)
    }

    /// The prim's ordered transform-operation stack.
    #[must_use]
    pub fn xform_ops(&self) -> &'a XformOpStack {
        &self.spec().xform_ops
    }

    /// The visibility sample authored exactly at `time`.
    #[must_use]
    pub fn visibility_at(&self, time: TimeCode) -> Option<Visibility> {
        self.spec()
            .visibility
            .binary_search_by(|(t, _)| t.cmp(&time))
            .ok()
            .map(|idx| self.spec().visibility[idx].1)
    }

    /// Rebuilds the prim's absolute path by walking parent links.
    #[must_use]
    pub fn path(&self) -> ScenePath {
        self.stage.path_of(self.id)
    }
}
