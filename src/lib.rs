#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod graph;
pub mod path;
pub mod stage;
pub mod sync;
pub mod translators;

pub use errors::{Result, StageLinkError};
pub use graph::{HostGraph, NativeNode};
pub use path::ScenePath;
pub use stage::{
    md, MetadataValue, Prim, PrimId, Stage, StageCache, StageFingerprint, StageHandle, StageNotice,
    TimeCode, Visibility, XformOpCategory, XformOpStack,
};
pub use sync::{
    AcquireReason, BridgeConfig, ChangeListener, DrivenTransforms, PersistedBlobs,
    RequiredPathTable, StageBridge,
};
pub use translators::{SchemaPrimRegistry, Translator, TranslatorContext, TranslatorManufacture};
