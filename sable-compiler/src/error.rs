//! Compiler-internal error plumbing. Every error renders to a diagnostic;
//! internal errors are compiler bugs and surface as crashes with context.

use sable_diagnostics::{error_codes, Diagnostic, Span};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("{}", .0.message)]
    Diagnostic(Diagnostic),
    #[error("internal compiler error: {message} at {location}")]
    Internal { message: String, location: Span },
}

impl CompileError {
    pub fn error(code: &str, message: impl Into<String>, location: Span) -> Self {
        CompileError::Diagnostic(Diagnostic::error(code, message.into(), location))
    }

    pub fn with_note(self, note: String, location: Span) -> Self {
        match self {
            CompileError::Diagnostic(diagnostic) => {
                let note = if location.is_known() {
                    format!("{} (at {})", note, location)
                } else {
                    note
                };
                CompileError::Diagnostic(diagnostic.with_note(note))
            }
            other => other,
        }
    }

    pub fn internal(message: impl Into<String>, location: Span) -> Self {
        CompileError::Internal {
            message: message.into(),
            location,
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        match self {
            CompileError::Diagnostic(diagnostic) => diagnostic,
            CompileError::Internal { message, location } => Diagnostic::error(
                error_codes::INTERNAL,
                format!("internal compiler error: {}", message),
                location,
            ),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
