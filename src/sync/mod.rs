//! The synchronization core.
//!
//! Notification-driven reconciliation of the host graph with the
//! composed stage:
//! - `RequiredPathTable`: reference-counted path → node registry
//! - `ChangeListener`: notice classification and dirty state
//! - `ResyncPass`: the incremental resynchronization algorithm
//! - `DrivenTransforms`: host-computed value write-back
//! - `codec`: textual persistence of the transient tables
//! - `StageBridge`: the engine tying the pipeline together

pub mod bridge;
pub mod codec;
pub mod driven;
pub mod listener;
pub mod required_paths;
pub(crate) mod resync;

pub use bridge::{BridgeConfig, ImagingState, StageBridge};
pub use codec::PersistedBlobs;
pub use driven::{DrivenTransformEntry, DrivenTransforms};
pub use listener::{ChangeListener, DirtyState, ListenerPhase};
pub use required_paths::{AcquireReason, RequiredPathEntry, RequiredPathTable};
