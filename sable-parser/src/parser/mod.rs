// Modular parser for the Sable language, organized by syntactic area.

use crate::ParseError;
use sable_ast::*;
use sable_diagnostics::{error_codes, Span};
use sable_lexer::{Lexer, Token, TokenSpan};
use std::collections::HashSet;

mod expressions;
mod items;
mod statements;
mod types;

pub struct Parser<'a> {
    pub(crate) tokens: Vec<TokenSpan>,
    pub(crate) current: usize,
    pub(crate) source: &'a str,
    pub(crate) file_path: String,
    pub(crate) module_name: String,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file_path: &str, module_name: &str) -> Result<Self, ParseError> {
        Self::with_defines(source, file_path, module_name, &HashSet::new())
    }

    /// `defines` drives `#if NAME` conditional compilation.
    pub fn with_defines(
        source: &'a str,
        file_path: &str,
        module_name: &str,
        defines: &HashSet<String>,
    ) -> Result<Self, ParseError> {
        let tokens: Result<Vec<_>, _> = Lexer::new(source).collect();
        let tokens = tokens.map_err(|e| ParseError {
            code: match e.kind {
                sable_lexer::LexErrorKind::UnterminatedString
                | sable_lexer::LexErrorKind::UnterminatedCharacter => {
                    error_codes::UNTERMINATED_LITERAL
                }
                sable_lexer::LexErrorKind::InvalidDigit => error_codes::INVALID_DIGIT,
                _ => error_codes::UNKNOWN_TOKEN,
            },
            message: e.kind.to_string(),
            span: Span::from_file_and_range(file_path, source, e.span),
        })?;

        let tokens = filter_directives(tokens, defines, file_path, source)?;

        Ok(Self {
            tokens,
            current: 0,
            source,
            file_path: file_path.to_string(),
            module_name: module_name.to_string(),
        })
    }

    /// Parses a source file's ordered top-level declarations.
    pub fn parse_file(&mut self) -> Result<Vec<DeclRef>, ParseError> {
        let mut decls = Vec::new();

        while !self.is_at_end() {
            decls.push(self.parse_top_level_decl()?);
        }

        Ok(decls)
    }

    /// Parses a single type written on its own, e.g. `"int*?"`. Used by the
    /// embedding surface and tests.
    pub fn parse_standalone_type(&mut self) -> Result<Type, ParseError> {
        let ty = self.parse_type()?;
        if !self.is_at_end() {
            return Err(self.error("expected end of type"));
        }
        Ok(ty)
    }

    // ==================== Helper methods ====================

    pub(crate) fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, kind: &Token) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn check_ahead(&self, offset: usize, kind: &Token) -> bool {
        self.tokens
            .get(self.current + offset)
            .map(|ts| std::mem::discriminant(&ts.token) == std::mem::discriminant(kind))
            .unwrap_or(false)
    }

    pub(crate) fn check_identifier(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Identifier(n) if n == name)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> &Token {
        static END: Token = Token::Semicolon;
        self.tokens.get(self.current).map(|ts| &ts.token).unwrap_or(&END)
    }

    pub(crate) fn consume(&mut self, kind: &Token, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    pub(crate) fn consume_identifier(&mut self, message: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(message)),
        }
    }

    /// Span of the current token (or of the last token at end of input).
    pub(crate) fn current_span(&self) -> Span {
        let index = self.current.min(self.tokens.len().saturating_sub(1));
        match self.tokens.get(index) {
            Some(ts) => Span::from_file_and_range(&self.file_path, self.source, ts.span.clone()),
            None => Span::from_file_and_range(&self.file_path, self.source, 0..0),
        }
    }

    pub(crate) fn error(&self, message: &str) -> ParseError {
        let found = if self.is_at_end() {
            "end of input".to_string()
        } else {
            self.peek().describe()
        };
        ParseError::unexpected(format!("{}, found {}", message, found), self.current_span())
    }

    /// Save/restore for speculative parses (generic argument lists).
    pub(crate) fn position(&self) -> usize {
        self.current
    }

    pub(crate) fn rewind(&mut self, position: usize) {
        self.current = position;
    }
}

/// Evaluates `#if NAME` / `#else` / `#endif` over the raw token stream.
/// Conditions are identifiers checked against the define set, or the
/// literals `true` / `false`. Directives nest.
fn filter_directives(
    tokens: Vec<TokenSpan>,
    defines: &HashSet<String>,
    file_path: &str,
    source: &str,
) -> Result<Vec<TokenSpan>, ParseError> {
    let mut result = Vec::with_capacity(tokens.len());
    // Each frame: (condition value, currently in else branch)
    let mut stack: Vec<(bool, bool)> = Vec::new();
    let mut iter = tokens.into_iter();

    let span_of = |ts: &TokenSpan| Span::from_file_and_range(file_path, source, ts.span.clone());

    while let Some(ts) = iter.next() {
        match ts.token {
            Token::HashIf => {
                let condition = match iter.next() {
                    Some(cond) => match &cond.token {
                        Token::True => true,
                        Token::False => false,
                        Token::Identifier(name) => defines.contains(name),
                        _ => {
                            return Err(ParseError::unexpected(
                                "expected a condition after `#if`",
                                span_of(&cond),
                            ))
                        }
                    },
                    None => {
                        return Err(ParseError::unexpected(
                            "expected a condition after `#if`",
                            span_of(&ts),
                        ))
                    }
                };
                stack.push((condition, false));
            }
            Token::HashElse => match stack.last_mut() {
                Some(frame) => frame.1 = true,
                None => {
                    return Err(ParseError::unexpected(
                        "`#else` without a matching `#if`",
                        span_of(&ts),
                    ))
                }
            },
            Token::HashEndif => {
                if stack.pop().is_none() {
                    return Err(ParseError::unexpected(
                        "`#endif` without a matching `#if`",
                        span_of(&ts),
                    ));
                }
            }
            _ => {
                let included = stack
                    .iter()
                    .all(|(condition, in_else)| *condition != *in_else);
                if included {
                    result.push(ts);
                }
            }
        }
    }

    if stack.is_empty() {
        Ok(result)
    } else {
        Err(ParseError::unexpected(
            "unterminated `#if`",
            Span::from_file_and_range(file_path, source, source.len()..source.len()),
        ))
    }
}
