//! Error types for Winstate.
//!
//! Property operations never fail: invalid objects are signalled through the
//! owner's validity flag, and write clamping is reconciled into events. The
//! errors below cover the edges of the system instead: reading a backing,
//! building entities, loading configuration, and running the CLI.

use thiserror::Error;

use crate::config::ConfigError;
use crate::state::{ApplicationId, ObjectRef};

/// Errors reported by a backing collaborator when it is queried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackingError {
    /// The underlying object no longer responds (window closed, app quit).
    #[error("backing object is no longer valid")]
    Invalid,
    /// The backing has been dropped by its owner.
    #[error("backing has been released")]
    Released,
    /// The attribute cannot be read right now.
    #[error("attribute unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while driving the state facade or the CLI.
#[derive(Debug, Error)]
pub enum WinstateError {
    /// Reading an attribute through its backing failed.
    #[error("Backing error: {0}")]
    Backing(#[from] BackingError),
    /// A window referenced an application that is not registered.
    #[error("Unknown application: {0}")]
    UnknownApplication(ApplicationId),
    /// An object with the same identity is already registered.
    #[error("Object already registered: {0}")]
    DuplicateObject(ObjectRef),
    /// A replay step referenced an object that was never created.
    #[error("Unknown object: {0}")]
    UnknownObject(ObjectRef),
    /// A replay step is not applicable to its target.
    #[error("Invalid step: {0}")]
    InvalidStep(String),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
