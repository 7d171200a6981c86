//! Recursive-descent parser producing the Sable AST.

mod parser;

pub use parser::Parser;

use sable_diagnostics::{error_codes, Diagnostic, Span};

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at {span}")]
pub struct ParseError {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code, self.message.clone(), self.span.clone())
    }

    pub(crate) fn unexpected(message: impl Into<String>, span: Span) -> Self {
        Self {
            code: error_codes::UNEXPECTED_TOKEN,
            message: message.into(),
            span,
        }
    }
}
