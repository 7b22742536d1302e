//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`StageLinkError`] covers all failure modes including:
//! - Scene path parsing errors
//! - Stage lookup and composition errors
//! - Translator import/teardown failures
//! - Host graph lookup errors
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, StageLinkError>`.

use thiserror::Error;

use crate::path::ScenePath;

/// The main error type for the stagelink engine.
///
/// Each variant provides specific context about what went wrong. Note
/// that "no stage is open" is a normal, checkable state for queries;
/// [`StageLinkError::StageNotOpen`] is only returned by operations that
/// cannot proceed without one.
#[derive(Error, Debug)]
pub enum StageLinkError {
    // ========================================================================
    // Path Errors
    // ========================================================================
    /// A scene path string could not be parsed.
    #[error("Invalid scene path: {0:?}")]
    InvalidPath(String),

    // ========================================================================
    // Stage Errors
    // ========================================================================
    /// An operation that requires an open stage was invoked without one.
    #[error("No stage is open")]
    StageNotOpen,

    /// No prim exists at the given path in the composed stage.
    #[error("No prim at path {0}")]
    PrimNotFound(ScenePath),

    /// A variant set or option referenced by an edit does not exist.
    #[error("Unknown variant {set}={option} on prim {path}")]
    UnknownVariant {
        /// Prim carrying the variant set
        path: ScenePath,
        /// Variant set name
        set: String,
        /// Requested option name
        option: String,
    },

    // ========================================================================
    // Translator Errors
    // ========================================================================
    /// A translator reported a failure while materializing or tearing
    /// down a native representation.
    #[error("Translator {type_token:?} failed: {reason}")]
    TranslatorFailed {
        /// Type token of the failing translator
        type_token: String,
        /// Translator-provided failure description
        reason: String,
    },

    // ========================================================================
    // Host Graph Errors
    // ========================================================================
    /// A native node handle did not resolve in the host graph.
    #[error("Native node not found in host graph: {0}")]
    NodeNotFound(String),
}

/// Alias for `Result<T, StageLinkError>`.
pub type Result<T> = std::result::Result<T, StageLinkError>;
