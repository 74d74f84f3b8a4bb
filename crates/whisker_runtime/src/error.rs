//! Runtime error types.
//!
//! Errors split into two tiers. [`RuntimeError::ExecutionLimit`] aborts the
//! current turn and rolls engine state back; every other variant degrades
//! the current operation to a `Nil` result (or a refused call) and surfaces
//! through the `on_error` hook. Hosts that want hard failures enable strict
//! mode and treat the diagnostics as fatal themselves.

use std::fmt;

use whisker_base::{DiagCode, Diagnostic};

/// Everything that can go wrong while running a story.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The per-turn instruction or wall-clock budget was exceeded.
    ExecutionLimit { detail: String },
    /// A plugin used a capability it never declared.
    CapabilityDenied {
        plugin: String,
        capability: String,
    },
    TypeMismatch { detail: String },
    DivisionByZero,
    UnknownPassage { id: String },
    EmptyUndoStack,
    /// A save bundle belongs to a different story.
    SaveMismatch { expected: String, found: String },
    /// An engine method was called in a state that does not allow it.
    InvalidState { operation: String, state: String },
    /// `choose()` index outside the presented choices.
    InvalidChoice { index: usize, available: usize },
    PluginLoad { plugin: String, reason: String },
}

impl RuntimeError {
    /// The diagnostic code for this error.
    pub fn code(&self) -> DiagCode {
        match self {
            RuntimeError::ExecutionLimit { .. } => DiagCode::ExecutionLimit,
            RuntimeError::CapabilityDenied { .. } => DiagCode::CapabilityDenied,
            RuntimeError::TypeMismatch { .. } => DiagCode::TypeMismatch,
            RuntimeError::DivisionByZero => DiagCode::DivisionByZero,
            RuntimeError::UnknownPassage { .. } => DiagCode::UnknownPassage,
            RuntimeError::EmptyUndoStack => DiagCode::EmptyUndoStack,
            RuntimeError::SaveMismatch { .. } => DiagCode::SaveMismatch,
            RuntimeError::InvalidState { .. } => DiagCode::UnknownPassage,
            RuntimeError::InvalidChoice { .. } => DiagCode::UnknownPassage,
            RuntimeError::PluginLoad { .. } => DiagCode::PluginLoadError,
        }
    }

    /// Renders this error as a warning diagnostic for the host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warning(self.code(), self.to_string())
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::ExecutionLimit { detail } => {
                write!(f, "execution budget exceeded: {}", detail)
            }
            RuntimeError::CapabilityDenied { plugin, capability } => {
                write!(f, "plugin '{}' denied capability '{}'", plugin, capability)
            }
            RuntimeError::TypeMismatch { detail } => write!(f, "type mismatch: {}", detail),
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::UnknownPassage { id } => write!(f, "unknown passage '{}'", id),
            RuntimeError::EmptyUndoStack => write!(f, "nothing to undo"),
            RuntimeError::SaveMismatch { expected, found } => {
                write!(f, "save bundle is for story '{}', not '{}'", found, expected)
            }
            RuntimeError::InvalidState { operation, state } => {
                write!(f, "cannot {} while the engine is {}", operation, state)
            }
            RuntimeError::InvalidChoice { index, available } => {
                write!(f, "choice index {} out of range ({} offered)", index, available)
            }
            RuntimeError::PluginLoad { plugin, reason } => {
                write!(f, "failed to load plugin '{}': {}", plugin, reason)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        let err = RuntimeError::CapabilityDenied {
            plugin: "stats".into(),
            capability: "state:write".into(),
        };
        let text = err.to_string();
        assert!(text.contains("stats"));
        assert!(text.contains("state:write"));
    }

    #[test]
    fn diagnostics_carry_stable_codes() {
        assert_eq!(
            RuntimeError::EmptyUndoStack.to_diagnostic().code,
            DiagCode::EmptyUndoStack
        );
        assert_eq!(
            RuntimeError::DivisionByZero.code(),
            DiagCode::DivisionByZero
        );
    }
}
