// Type syntax: `const T`, `T*`, `T?`, `T[N]`, `T[?]`, `T[]`, `Name<args>`,
// `(T a, U b)` tuples, `(T, U) -> R` function types.

use super::Parser;
use crate::ParseError;
use sable_ast::{ArraySize, Mutability, TupleElement, Type};
use sable_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mutability = if self.match_token(&Token::Const) {
            Mutability::Const
        } else {
            Mutability::Mutable
        };

        let mut ty = self.parse_base_type(mutability)?;

        loop {
            let location = self.current_span();
            if self.match_token(&Token::Star) {
                ty = Type::pointer(ty, Mutability::Mutable, location);
            } else if self.match_token(&Token::QuestionMark) {
                ty = Type::optional(ty, Mutability::Mutable, location);
            } else if self.check(&Token::LeftBracket) {
                self.advance();
                let size = if self.match_token(&Token::RightBracket) {
                    ArraySize::Unknown
                } else if self.match_token(&Token::QuestionMark) {
                    self.consume(&Token::RightBracket, "expected `]` after array size")?;
                    ArraySize::Runtime
                } else {
                    let size = match self.peek().clone() {
                        Token::IntLiteral(value) => {
                            self.advance();
                            ArraySize::Constant(value)
                        }
                        _ => return Err(self.error("expected array size")),
                    };
                    self.consume(&Token::RightBracket, "expected `]` after array size")?;
                    size
                };
                ty = Type::array(ty, size, Mutability::Mutable, location);
            } else {
                break;
            }
        }

        Ok(ty)
    }

    fn parse_base_type(&mut self, mutability: Mutability) -> Result<Type, ParseError> {
        let location = self.current_span();

        if self.check(&Token::LeftParen) {
            return self.parse_tuple_or_function_type(mutability, location);
        }

        let name = self.consume_identifier("expected a type name")?;
        let generic_args = if self.check(&Token::Less) {
            self.parse_generic_type_args()?
        } else {
            Vec::new()
        };

        Ok(Type::basic(name, generic_args, mutability, location))
    }

    /// `<T, U, ...>` in type position.
    pub(crate) fn parse_generic_type_args(&mut self) -> Result<Vec<Type>, ParseError> {
        self.consume(&Token::Less, "expected `<`")?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::Greater, "expected `>` after generic arguments")?;
        Ok(args)
    }

    fn parse_tuple_or_function_type(
        &mut self,
        mutability: Mutability,
        location: sable_diagnostics::Span,
    ) -> Result<Type, ParseError> {
        self.consume(&Token::LeftParen, "expected `(`")?;

        let mut elements: Vec<TupleElement> = Vec::new();
        let mut is_variadic = false;

        if !self.check(&Token::RightParen) {
            loop {
                if self.match_token(&Token::DotDotDot) {
                    is_variadic = true;
                    break;
                }
                let ty = self.parse_type()?;
                let name = match self.peek().clone() {
                    Token::Identifier(name) => {
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                elements.push(TupleElement { name, ty });
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.consume(&Token::RightParen, "expected `)`")?;

        if self.match_token(&Token::RightArrow) {
            let return_type = self.parse_type()?;
            let param_types = elements.into_iter().map(|element| element.ty).collect();
            return Ok(Type::function(return_type, param_types, is_variadic, location));
        }

        if is_variadic {
            return Err(self.error("`...` is only allowed in function types"));
        }

        Ok(Type::tuple(elements, mutability, location))
    }
}
