//! Error types for realm.

use alloc::string::String;
use thiserror::Error;

/// Result type alias for realm operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for realm labeling and composition.
///
/// Publishing and subscribing through typed node handles cannot fail; errors
/// only arise where nodes are addressed by name or where systems are composed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A name was never registered by any composed system.
    #[error("missing label `{key}`: the system providing it is not installed")]
    MissingLabel { key: String },
    /// A name resolved to a node carrying a different value type.
    #[error("type mismatch for `{key}`: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A name was registered twice for different nodes.
    #[error("label `{key}` is already bound to another node")]
    LabelConflict { key: String },
    /// A system (transitively) depends on itself.
    #[error("dependency cycle while constructing system `{system}`")]
    DependencyCycle { system: String },
    /// A system constructor reported a failure.
    #[error("system `{system}` failed to construct: {message}")]
    Construction { system: String, message: String },
}

impl Error {
    /// Creates a missing label error.
    pub fn missing_label(key: impl Into<String>) -> Self {
        Error::MissingLabel { key: key.into() }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(key: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Error::TypeMismatch {
            key: key.into(),
            expected,
            found,
        }
    }

    /// Creates a label conflict error.
    pub fn label_conflict(key: impl Into<String>) -> Self {
        Error::LabelConflict { key: key.into() }
    }

    /// Creates a dependency cycle error.
    pub fn dependency_cycle(system: impl Into<String>) -> Self {
        Error::DependencyCycle {
            system: system.into(),
        }
    }

    /// Creates a construction error.
    pub fn construction(system: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Construction {
            system: system.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error signals an uninstalled system.
    pub fn is_missing_label(&self) -> bool {
        matches!(self, Error::MissingLabel { .. })
    }
}
