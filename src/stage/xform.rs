//! Transform-operation stacks.
//!
//! Each prim carries an ordered list of transform operations
//! (translate/rotate/scale/matrix) that define its local transform.
//! The editor in this module inserts new operations so that freshly
//! authored stacks come out in conventional composition order
//! (Translate · Rotate · Scale) while never reordering operations that
//! already exist — a stack authored in a non-canonical order stays in
//! that order, insertions just slot around it.

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

/// Time key for sampled values. Ordered by `f64::total_cmp` so it can
/// be searched and sorted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCode(pub f64);

impl TimeCode {
    /// The default sample time.
    pub const ZERO: TimeCode = TimeCode(0.0);
}

impl Eq for TimeCode {}

impl PartialOrd for TimeCode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeCode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Category of a transform operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XformOpCategory {
    Translate,
    Rotate,
    Scale,
    Matrix,
    /// An operation the editor does not recognize. Never matched by
    /// ordering scans.
    Other,
}

impl XformOpCategory {
    /// Canonical composition rank: Translate < Rotate < Scale.
    /// Matrix and Other operations are unranked.
    #[must_use]
    pub fn canonical_rank(self) -> Option<u8> {
        match self {
            XformOpCategory::Translate => Some(0),
            XformOpCategory::Rotate => Some(1),
            XformOpCategory::Scale => Some(2),
            XformOpCategory::Matrix | XformOpCategory::Other => None,
        }
    }
}

/// A sampled operation value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XformValue {
    Vec3(Vec3),
    Matrix(Mat4),
}

/// One transform operation: a category, an inversion flag, and a
/// time-sampled value track. Inverse-suffixed variants share their
/// base category's rank, so the flag never affects ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct XformOp {
    pub category: XformOpCategory,
    pub inverted: bool,
    samples: Vec<(TimeCode, XformValue)>,
}

impl XformOp {
    #[must_use]
    pub fn new(category: XformOpCategory, inverted: bool) -> Self {
        Self {
            category,
            inverted,
            samples: Vec::new(),
        }
    }

    /// Writes a value at `time`, replacing an existing sample at the
    /// same time code.
    pub fn set_sample(&mut self, time: TimeCode, value: XformValue) {
        match self.samples.binary_search_by(|(t, _)| t.cmp(&time)) {
            Ok(idx) => self.samples[idx].1 = value,
            Err(idx) => self.samples.insert(idx, (time, value)),
        }
    }

    /// The sample authored exactly at `time`, if any.
    #[must_use]
    pub fn sample_at(&self, time: TimeCode) -> Option<&XformValue> {
        self.samples
            .binary_search_by(|(t, _)| t.cmp(&time))
            .ok()
            .map(|idx| &self.samples[idx].1)
    }

    /// All authored samples in time order.
    #[must_use]
    pub fn samples(&self) -> &[(TimeCode, XformValue)] {
        &self.samples
    }
}

/// An ordered stack of transform operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XformOpStack {
    ops: SmallVec<[XformOp; 4]>,
}

impl XformOpStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn ops(&self) -> &[XformOp] {
        &self.ops
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&XformOp> {
        self.ops.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut XformOp> {
        self.ops.get_mut(index)
    }

    /// Inserts a new operation of `category`, returning its position.
    ///
    /// - Translate always lands at index 0.
    /// - Rotate scans forward for the first operation whose canonical
    ///   rank exceeds Rotate's and inserts immediately before it; if
    ///   none is found it appends.
    /// - Scale scans backward for the first operation whose canonical
    ///   rank is below Scale's and inserts immediately after it; if
    ///   none is found it lands at index 0.
    /// - Matrix and Other operations append at the end.
    ///
    /// Unranked operations never satisfy a scan, so pre-existing
    /// foreign operations are only ever inserted around, not moved.
    pub fn insert(&mut self, category: XformOpCategory, inverted: bool) -> usize {
        let position = match category {
            XformOpCategory::Translate => 0,
            XformOpCategory::Rotate => {
                let rank = 1u8;
                self.ops
                    .iter()
                    .position(|op| op.category.canonical_rank().is_some_and(|r| r > rank))
                    .unwrap_or(self.ops.len())
            }
            XformOpCategory::Scale => {
                let rank = 2u8;
                self.ops
                    .iter()
                    .rposition(|op| op.category.canonical_rank().is_some_and(|r| r < rank))
                    .map_or(0, |idx| idx + 1)
            }
            XformOpCategory::Matrix | XformOpCategory::Other => self.ops.len(),
        };
        self.ops.insert(position, XformOp::new(category, inverted));
        position
    }

    /// Writes a matrix value at `time` into the stack's Matrix
    /// operation, appending one if the stack has none.
    pub fn write_matrix(&mut self, value: Mat4, time: TimeCode) {
        let idx = match self
            .ops
            .iter()
            .position(|op| op.category == XformOpCategory::Matrix)
        {
            Some(idx) => idx,
            None => self.insert(XformOpCategory::Matrix, false),
        };
        self.ops[idx].set_sample(time, XformValue::Matrix(value));
    }

    /// The categories currently in the stack, in order. Handy for
    /// structural assertions.
    #[must_use]
    pub fn categories(&self) -> Vec<XformOpCategory> {
        self.ops.iter().map(|op| op.category).collect()
    }
}
