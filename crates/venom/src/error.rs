//! Error kinds and the structured compile result returned at the pipeline
//! boundary. No logging framework is introduced here — diagnostics are
//! plain typed values propagated with `Result`, the same discipline the
//! rest of this workspace's ambient code follows.

use std::fmt;
use strum::Display;

/// The five error kinds named by the pipeline's failure model. `VMFatal` is
/// not user-recoverable: it aborts the process rather than being returned
/// through `CompileResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    InvalidSyntax,
    SemanticViolation,
    TypeViolation,
    UnknownError,
    VMFatal,
}

#[derive(Debug, Clone)]
pub struct VenomError {
    pub kind: ErrorKind,
    /// One line identifying the kind and site, then the offending
    /// type/name, per spec.md §7's user-visible format.
    pub message: String,
}

impl VenomError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSyntax, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SemanticViolation, message)
    }

    pub fn ty(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeViolation, message)
    }
}

impl fmt::Display for VenomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for VenomError {}

pub type VenomResult<T> = Result<T, VenomError>;

/// Structured outcome of one call to the compile pipeline, per spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Success,
    InvalidSyntax,
    SemanticError,
    TypeError,
    UnknownError,
}

#[derive(Debug, Clone)]
pub struct CompileResult {
    pub result: CompileOutcome,
    pub message: String,
}

impl CompileResult {
    pub fn success() -> Self {
        Self {
            result: CompileOutcome::Success,
            message: String::new(),
        }
    }

    pub fn from_error(err: &VenomError) -> Self {
        let result = match err.kind {
            ErrorKind::InvalidSyntax => CompileOutcome::InvalidSyntax,
            ErrorKind::SemanticViolation => CompileOutcome::SemanticError,
            ErrorKind::TypeViolation => CompileOutcome::TypeError,
            ErrorKind::UnknownError | ErrorKind::VMFatal => CompileOutcome::UnknownError,
        };
        Self {
            result,
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == CompileOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_matches_kind_then_message() {
        let err = VenomError::semantic("'x' already declared in this scope");
        assert_eq!(
            err.to_string(),
            "SemanticViolation: 'x' already declared in this scope"
        );
    }

    #[test]
    fn compile_result_from_error_maps_kind() {
        let err = VenomError::ty("expected Int, got Bool");
        let result = CompileResult::from_error(&err);
        assert_eq!(result.result, CompileOutcome::TypeError);
    }
}
