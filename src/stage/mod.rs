//! Scene-description collaborator.
//!
//! Everything the engine consumes from the external description
//! library lives here:
//! - `Stage`: composed prim hierarchy with variant sets and notified edits
//! - `Prim`: read-only per-path view (type token, active flag, metadata)
//! - `XformOpStack`: ordered transform operations and the insertion editor
//! - `StageNotice`: the three notification kinds
//! - `StageCache`: fingerprint-keyed sharing of open stages

pub mod cache;
pub mod notice;
pub mod prim;
#[allow(clippy::module_inception)]
pub mod stage;
pub mod xform;

pub use cache::{StageCache, StageFingerprint, StageHandle};
pub use notice::{ChangedFields, LayerChangeEntry, StageNotice};
pub use prim::{md, MetadataValue, Prim, PrimId, Visibility};
pub use stage::Stage;
pub use xform::{TimeCode, XformOp, XformOpCategory, XformOpStack, XformValue};
