//! Error types for the resolution engine.

use std::fmt;

use crate::descriptor::TypeDescriptor;

/// Resolution and binding errors.
///
/// Represents the error conditions that can occur while selecting a creator,
/// binding properties, or building values from structured input.
///
/// Definition errors are always fatal for the affected type and are never
/// retried by the engine; nothing is committed to the handler cache when one
/// is raised.
///
/// # Examples
///
/// ```rust
/// use bindery::{BindError, TypeDescriptor};
///
/// let err = BindError::definition(TypeDescriptor::of("Point"), "no usable creator")
///     .with_candidate("Point(int,int)")
///     .with_param(0);
///
/// let text = err.to_string();
/// assert!(text.contains("Point"));
/// assert!(text.contains("parameter #0"));
/// ```
#[derive(Debug, Clone)]
pub enum BindError {
    /// The type's creator/property configuration is contradictory or
    /// incomplete (ambiguous delegate, unnamed multi-arg parameter, duplicate
    /// capture-remaining fallback, ...). Carries the offending candidate
    /// signature and parameter index when known.
    Definition {
        /// Type whose configuration is broken.
        ty: TypeDescriptor,
        /// Signature of the offending creator candidate, if one is involved.
        candidate: Option<String>,
        /// Index of the offending parameter within the candidate.
        param: Option<usize>,
        /// Human-readable explanation.
        message: String,
    },
    /// No creator could be found for an otherwise-expected type.
    UnknownType {
        /// Type that could not be resolved.
        ty: TypeDescriptor,
        /// Explanation, distinguishing abstract from concrete raw types.
        message: String,
    },
    /// A registered extension (instantiator provider or strategy modifier)
    /// violated its contract.
    ExtensionContract {
        /// Type being resolved when the violation occurred.
        ty: TypeDescriptor,
        /// Name of the offending extension.
        extension: String,
    },
    /// Structured input did not fit the selected strategy at build time
    /// (wrong node shape, missing injectable value, ...).
    Input(String),
}

impl BindError {
    /// Creates a definition error for `ty` with no candidate attached yet.
    pub fn definition(ty: TypeDescriptor, message: impl Into<String>) -> Self {
        BindError::Definition {
            ty,
            candidate: None,
            param: None,
            message: message.into(),
        }
    }

    /// Creates an unknown-type error for `ty`.
    pub fn unknown_type(ty: TypeDescriptor, message: impl Into<String>) -> Self {
        BindError::UnknownType {
            ty,
            message: message.into(),
        }
    }

    /// Creates a build-time input error.
    pub fn input(message: impl Into<String>) -> Self {
        BindError::Input(message.into())
    }

    /// Attaches the offending candidate signature to a definition error.
    /// No-op for other variants.
    pub fn with_candidate(mut self, signature: impl Into<String>) -> Self {
        if let BindError::Definition { candidate, .. } = &mut self {
            *candidate = Some(signature.into());
        }
        self
    }

    /// Attaches the offending parameter index to a definition error.
    /// No-op for other variants.
    pub fn with_param(mut self, index: usize) -> Self {
        if let BindError::Definition { param, .. } = &mut self {
            *param = Some(index);
        }
        self
    }

    /// Returns the offending parameter index, if this is a definition error
    /// that carries one.
    pub fn param_index(&self) -> Option<usize> {
        match self {
            BindError::Definition { param, .. } => *param,
            _ => None,
        }
    }

    /// Returns the offending candidate signature, if any.
    pub fn candidate(&self) -> Option<&str> {
        match self {
            BindError::Definition { candidate, .. } => candidate.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::Definition {
                ty,
                candidate,
                param,
                message,
            } => {
                write!(f, "Invalid definition for `{}`: {}", ty, message)?;
                if let Some(sig) = candidate {
                    write!(f, " (creator {})", sig)?;
                }
                if let Some(idx) = param {
                    write!(f, " at parameter #{}", idx)?;
                }
                Ok(())
            }
            BindError::UnknownType { ty, message } => {
                write!(f, "Cannot resolve `{}`: {}", ty, message)
            }
            BindError::ExtensionContract { ty, extension } => write!(
                f,
                "Broken extension `{}` while resolving `{}`: returned no strategy",
                extension, ty
            ),
            BindError::Input(message) => write!(f, "Invalid input: {}", message),
        }
    }
}

impl std::error::Error for BindError {}

/// Result type for resolution operations.
///
/// A convenience alias for `Result<T, BindError>` used throughout bindery.
pub type BindResult<T> = Result<T, BindError>;
