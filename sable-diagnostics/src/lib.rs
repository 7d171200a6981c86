// Error system for the Sable compiler
// Provides Rust-quality error messages with spans, colors, and suggestions

use colored::Colorize;
use std::fmt;
use std::path::Path;

/// Source code location (line, column, file)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize, // Length of the error span
}

impl Span {
    pub fn new(file: String, line: usize, column: usize, length: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }

    /// Compute line/column from a byte range into the source text.
    pub fn from_file_and_range(file: &str, source: &str, range: std::ops::Range<usize>) -> Self {
        let before = &source[..range.start.min(source.len())];
        let line = before.chars().filter(|&c| c == '\n').count() + 1;
        let column = before
            .rfind('\n')
            .map_or(before.len() + 1, |pos| before.len() - pos);
        let length = range.end.saturating_sub(range.start).max(1);

        Self {
            file: file.to_string(),
            line,
            column,
            length,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self {
            file: path.display().to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
    Info,
    Note,
    Help,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "{}", "error".red().bold()),
            ErrorLevel::Warning => write!(f, "{}", "warning".yellow().bold()),
            ErrorLevel::Info => write!(f, "{}", "info".blue().bold()),
            ErrorLevel::Note => write!(f, "{}", "note".cyan().bold()),
            ErrorLevel::Help => write!(f, "{}", "help".green().bold()),
        }
    }
}

/// Structured diagnostic message
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub code: String, // e.g., "E0308" for type mismatch
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(level: ErrorLevel, code: &str, message: String, span: Span) -> Self {
        Self {
            level,
            code: code.to_string(),
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Error, code, message, span)
    }

    pub fn warning(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Warning, code, message, span)
    }

    pub fn note(message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Note, "", message, span)
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Format diagnostic in Rust-style
    pub fn format(&self, source_code: &str) -> String {
        let mut output = String::new();

        // Header: error[E0308]: message
        if self.code.is_empty() {
            output.push_str(&format!("{}: {}\n", self.level, self.message.bold()));
        } else {
            output.push_str(&format!(
                "{}[{}]: {}\n",
                self.level,
                self.code,
                self.message.bold()
            ));
        }

        // Location: --> file.sb:12:15
        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        // Source code snippet with highlight
        if let Some(snippet) = self.get_source_snippet(source_code) {
            output.push_str(&snippet);
        }

        // Notes
        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }

        // Help
        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        output
    }

    fn format_simple(&self) -> String {
        let mut output = String::new();

        if self.code.is_empty() {
            output.push_str(&format!("{}: {}\n", self.level, self.message));
        } else {
            output.push_str(&format!("{}[{}]: {}\n", self.level, self.code, self.message));
        }

        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note));
        }

        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        output
    }

    /// Extract source code snippet with error highlight
    fn get_source_snippet(&self, source_code: &str) -> Option<String> {
        let lines: Vec<&str> = source_code.lines().collect();

        if self.span.line == 0 || self.span.line > lines.len() {
            return None;
        }

        let line = lines[self.span.line - 1];
        let mut snippet = String::new();

        let line_num_width = self.span.line.to_string().len().max(2);

        snippet.push_str(&format!(" {}\n", " ".repeat(line_num_width + 1)));
        snippet.push_str(&format!(
            " {} {} {}\n",
            format!("{:>width$}", self.span.line, width = line_num_width)
                .cyan()
                .bold(),
            "|".cyan().bold(),
            line
        ));

        // Error indicator (^^^)
        let padding = " ".repeat(line_num_width + 3 + self.span.column.saturating_sub(1));
        let underline = "^".repeat(self.span.length.max(1));
        snippet.push_str(&format!(" {}{}\n", padding, underline.red().bold()));

        Some(snippet)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

/// Diagnostic collection and reporting engine
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            ErrorLevel::Error => self.error_count += 1,
            ErrorLevel::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn emit_error(&mut self, code: &str, message: String, span: Span) {
        self.emit(Diagnostic::error(code, message, span));
    }

    pub fn emit_warning(&mut self, code: &str, message: String, span: Span) {
        self.emit(Diagnostic::warning(code, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Print all diagnostics to stderr
    pub fn print_all(&self, source_code: &str) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.format(source_code));
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "\n{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }

        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }
}

/// Closest-name helper for "did you mean?" suggestions.
/// Returns the candidate with the smallest edit distance, if close enough.
pub fn suggest_name<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, &str)> = None;

    for candidate in candidates {
        let distance = strsim::levenshtein(name, candidate);
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }

    // Only suggest names within a third of the length, so `foo` never
    // suggests `unrelated_thing`.
    best.filter(|(d, _)| *d * 3 <= name.len().max(3))
        .map(|(_, s)| s.to_string())
}

/// Stable diagnostic codes, grouped by compiler stage
pub mod error_codes {
    // Lexing
    pub const UNKNOWN_TOKEN: &str = "L0001";
    pub const UNTERMINATED_LITERAL: &str = "L0002";
    pub const INVALID_DIGIT: &str = "L0003";

    // Parsing
    pub const UNEXPECTED_TOKEN: &str = "P0001";
    pub const MISSING_DELIMITER: &str = "P0002";

    // Name resolution
    pub const UNDEFINED_IDENTIFIER: &str = "N0001";
    pub const REDEFINITION: &str = "N0002";
    pub const AMBIGUOUS_IMPORT: &str = "N0003";
    pub const UNSUPPORTED_IMPORT: &str = "N0004";

    // Types
    pub const TYPE_MISMATCH: &str = "T0001";
    pub const INVALID_CAST: &str = "T0002";
    pub const NON_OPTIONAL_NULL: &str = "T0003";
    pub const USE_AFTER_MOVE: &str = "T0004";

    // Overload resolution
    pub const NO_MATCHING_CALL: &str = "O0001";
    pub const AMBIGUOUS_CALL: &str = "O0002";

    // Generics
    pub const GENERIC_ARG_COUNT: &str = "G0001";
    pub const INFERENCE_FAILED: &str = "G0002";
    pub const CONSTRAINT_NOT_SATISFIED: &str = "G0003";
    pub const RECURSIVE_INSTANTIATION: &str = "G0004";

    // Semantics
    pub const BREAK_OUTSIDE_LOOP: &str = "S0001";
    pub const RETURN_TYPE_MISMATCH: &str = "S0002";
    pub const MISSING_RETURN: &str = "S0003";
    pub const MISSING_INTERFACE_REQUIREMENT: &str = "S0004";

    // Compiler bugs
    pub const INTERNAL: &str = "X0001";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_from_range_computes_line_and_column() {
        let source = "var x = 1;\nvar y = 2;\n";
        let span = Span::from_file_and_range("test.sb", source, 15..16);
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 5);
        assert_eq!(span.length, 1);
    }

    #[test]
    fn engine_counts_severities() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error(error_codes::TYPE_MISMATCH, "mismatched types".into(), Span::unknown());
        engine.emit_warning("W0001", "unused".into(), Span::unknown());
        assert!(engine.has_errors());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 1);
    }

    #[test]
    fn suggestions_require_similarity() {
        let names = ["hasValue", "increment", "value"];
        assert_eq!(
            suggest_name("hasValue", names.iter().copied()),
            Some("hasValue".to_string())
        );
        assert_eq!(suggest_name("zzz", names.iter().copied()), None);
    }
}
