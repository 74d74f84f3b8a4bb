//! Diagnostic records with stable codes.
//!
//! Every problem the pipeline can report — from a stray character in the
//! lexer to a capability violation at runtime — is a [`Diagnostic`] with a
//! stable [`DiagCode`], a severity, a message, and optional source spans.
//! Compile stages collect diagnostics and return them next to their partial
//! results; nothing in the library prints or panics on user input.

use serde::{Deserialize, Serialize};

use crate::span::SourceLocation;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

/// The closed set of diagnostic codes.
///
/// Codes are grouped by subsystem: `WSK00xx` lexer, `WSK01xx` parser,
/// `WSK02xx` semantic analysis and IR integrity, `WSK03xx` runtime. The
/// numeric code of a variant never changes once released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagCode {
    // Lexer
    UnexpectedChar,
    UnterminatedString,
    InvalidNumber,
    UnterminatedFence,

    // Parser
    UnexpectedToken,
    UnclosedDelimiter,
    ExpectedExpression,
    ExpectedPassageHeader,
    InvalidChoice,
    UnterminatedConditional,
    InvalidMetadata,
    RawExpression,

    // Semantic analysis
    DuplicatePassage,
    UnresolvedTarget,
    UnusedVariable,
    UndeclaredVariable,
    UnreferencedPassage,
    EmptyPassage,
    OverlongPassage,
    TooManyChoices,
    NoPassages,
    NoStartPassage,

    // IR integrity
    EmptyPassageId,
    DuplicatePassageId,
    MissingStart,
    InvalidReference,

    // Format adapters
    UnsupportedConstruct,
    MalformedInput,
    UnknownDialect,
    LossyExport,
    UnknownConfigKey,

    // Runtime
    ExecutionLimit,
    CapabilityDenied,
    TypeMismatch,
    DivisionByZero,
    UnknownPassage,
    EmptyUndoStack,
    SaveMismatch,
    AutosaveFailed,
    HookHandlerError,
    PluginLoadError,
}

impl DiagCode {
    /// The stable `WSKnnnn` code string for this variant.
    pub fn code(self) -> &'static str {
        match self {
            DiagCode::UnexpectedChar => "WSK0001",
            DiagCode::UnterminatedString => "WSK0002",
            DiagCode::InvalidNumber => "WSK0003",
            DiagCode::UnterminatedFence => "WSK0004",

            DiagCode::UnexpectedToken => "WSK0101",
            DiagCode::UnclosedDelimiter => "WSK0102",
            DiagCode::ExpectedExpression => "WSK0103",
            DiagCode::ExpectedPassageHeader => "WSK0104",
            DiagCode::InvalidChoice => "WSK0105",
            DiagCode::UnterminatedConditional => "WSK0106",
            DiagCode::InvalidMetadata => "WSK0107",
            DiagCode::RawExpression => "WSK0108",

            DiagCode::DuplicatePassage => "WSK0201",
            DiagCode::UnresolvedTarget => "WSK0210",
            DiagCode::UnusedVariable => "WSK0220",
            DiagCode::UndeclaredVariable => "WSK0221",
            DiagCode::UnreferencedPassage => "WSK0250",
            DiagCode::EmptyPassage => "WSK0251",
            DiagCode::OverlongPassage => "WSK0252",
            DiagCode::TooManyChoices => "WSK0253",
            DiagCode::NoPassages => "WSK0260",
            DiagCode::NoStartPassage => "WSK0261",

            DiagCode::EmptyPassageId => "WSK0270",
            DiagCode::DuplicatePassageId => "WSK0271",
            DiagCode::MissingStart => "WSK0272",
            DiagCode::InvalidReference => "WSK0273",

            DiagCode::UnsupportedConstruct => "WSK0280",
            DiagCode::MalformedInput => "WSK0281",
            DiagCode::UnknownDialect => "WSK0282",
            DiagCode::LossyExport => "WSK0283",
            DiagCode::UnknownConfigKey => "WSK0290",

            DiagCode::ExecutionLimit => "WSK0301",
            DiagCode::CapabilityDenied => "WSK0302",
            DiagCode::TypeMismatch => "WSK0303",
            DiagCode::DivisionByZero => "WSK0304",
            DiagCode::UnknownPassage => "WSK0305",
            DiagCode::EmptyUndoStack => "WSK0306",
            DiagCode::SaveMismatch => "WSK0307",
            DiagCode::AutosaveFailed => "WSK0308",
            DiagCode::HookHandlerError => "WSK0309",
            DiagCode::PluginLoadError => "WSK0310",
        }
    }
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub severity: Severity,
    pub message: String,
    /// The main location the diagnostic points at, if any.
    pub primary: Option<SourceLocation>,
    /// Additional labeled locations ("first defined here", ...).
    pub secondary: Vec<(SourceLocation, String)>,
    /// A machine-applicable or human-readable fix suggestion.
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(code: DiagCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            primary: None,
            secondary: Vec::new(),
            suggestion: None,
        }
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    pub fn hint(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Hint, message)
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.primary = Some(location);
        self
    }

    pub fn with_secondary(mut self, location: SourceLocation, label: impl Into<String>) -> Self {
        self.secondary.push((location, label.into()));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Returns `true` if any diagnostic in the slice is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}

/// Returns the highest severity present, or `None` for an empty slice.
pub fn max_severity(diags: &[Diagnostic]) -> Option<Severity> {
    diags.iter().map(|d| d.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SourcePosition, SourceSpan};

    fn loc(line: u32, col: u32) -> SourceLocation {
        SourceLocation::new(
            "test.ws",
            SourceSpan::at(SourcePosition::new(line, col, 0)),
        )
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(DiagCode::UnexpectedChar.code(), "WSK0001");
        assert_eq!(DiagCode::UnreferencedPassage.code(), "WSK0250");
        assert_eq!(DiagCode::ExecutionLimit.code(), "WSK0301");
    }

    #[test]
    fn severity_orders_hint_warning_error() {
        assert!(Severity::Hint < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn builder_attaches_locations_and_suggestion() {
        let diag = Diagnostic::error(DiagCode::DuplicatePassage, "duplicate passage 'Start'")
            .with_location(loc(5, 1))
            .with_secondary(loc(1, 1), "first defined here")
            .with_suggestion("rename one of the passages");
        assert!(diag.primary.is_some());
        assert_eq!(diag.secondary.len(), 1);
        assert!(diag.suggestion.is_some());
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let diags = vec![
            Diagnostic::warning(DiagCode::UnusedVariable, "unused"),
            Diagnostic::hint(DiagCode::UndeclaredVariable, "hint"),
        ];
        assert!(!has_errors(&diags));
        assert_eq!(max_severity(&diags), Some(Severity::Warning));
    }
}
