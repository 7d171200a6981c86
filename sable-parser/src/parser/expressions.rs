// Expression syntax with C-style precedence. Ranges `a..b` / `a...b`
// construct the standard library's `Range` / `ClosedRange`.

use super::Parser;
use crate::ParseError;
use sable_ast::*;
use sable_lexer::Token;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_range()
    }

    fn parse_range(&mut self) -> Result<Expr, ParseError> {
        let start = self.parse_logical_or()?;

        let constructor = if self.check(&Token::DotDot) {
            "Range"
        } else if self.check(&Token::DotDotDot) {
            "ClosedRange"
        } else {
            return Ok(start);
        };
        let location = self.current_span();
        self.advance();
        let end = self.parse_logical_or()?;

        Ok(Expr::new(
            ExprKind::Call(CallExpr {
                callee: Box::new(Expr::new(
                    ExprKind::Var {
                        name: constructor.to_string(),
                        decl: None,
                    },
                    location.clone(),
                )),
                args: vec![
                    NamedArg {
                        name: None,
                        value: start,
                    },
                    NamedArg {
                        name: None,
                        value: end,
                    },
                ],
                generic_args: Vec::new(),
                callee_decl: None,
                receiver_type: None,
            }),
            location,
        ))
    }

    fn parse_binary_level<F>(
        &mut self,
        mut parse_operand: F,
        table: &[(Token, BinaryOp)],
    ) -> Result<Expr, ParseError>
    where
        F: FnMut(&mut Self) -> Result<Expr, ParseError>,
    {
        let mut lhs = parse_operand(self)?;

        'outer: loop {
            for (token, op) in table {
                if self.check(token) {
                    let location = self.current_span();
                    self.advance();
                    let rhs = parse_operand(self)?;
                    lhs = Expr::new(
                        ExprKind::Binary {
                            op: *op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        location,
                    );
                    continue 'outer;
                }
            }
            break;
        }

        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            Self::parse_logical_and,
            &[(Token::OrOr, BinaryOp::LogicalOr)],
        )
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(Self::parse_bit_or, &[(Token::AndAnd, BinaryOp::LogicalAnd)])
    }

    fn parse_bit_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(Self::parse_bit_xor, &[(Token::Or, BinaryOp::BitOr)])
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(Self::parse_bit_and, &[(Token::Xor, BinaryOp::BitXor)])
    }

    fn parse_bit_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(Self::parse_equality, &[(Token::And, BinaryOp::BitAnd)])
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            Self::parse_relational,
            &[
                (Token::Equal, BinaryOp::Equal),
                (Token::NotEqual, BinaryOp::NotEqual),
            ],
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            Self::parse_shift,
            &[
                (Token::LessOrEqual, BinaryOp::LessOrEqual),
                (Token::GreaterOrEqual, BinaryOp::GreaterOrEqual),
                (Token::Less, BinaryOp::Less),
                (Token::Greater, BinaryOp::Greater),
            ],
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            Self::parse_additive,
            &[
                (Token::LeftShift, BinaryOp::Shl),
                (Token::RightShift, BinaryOp::Shr),
            ],
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            Self::parse_multiplicative,
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            Self::parse_cast,
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Modulo, BinaryOp::Mod),
            ],
        )
    }

    fn parse_cast(&mut self) -> Result<Expr, ParseError> {
        let mut operand = self.parse_unary()?;

        while self.check(&Token::As) {
            let location = self.current_span();
            self.advance();
            let target = self.parse_type()?;
            operand = Expr::new(
                ExprKind::Cast {
                    operand: Box::new(operand),
                    target,
                },
                location,
            );
        }

        Ok(operand)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let location = self.current_span();
        let op = match self.peek() {
            Token::Minus => Some(UnaryOp::Negate),
            Token::Not => Some(UnaryOp::Not),
            Token::Tilde => Some(UnaryOp::BitwiseNot),
            Token::Star => Some(UnaryOp::Deref),
            Token::And => Some(UnaryOp::AddressOf),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                location,
            ));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            let location = self.current_span();

            if self.check(&Token::LeftParen) {
                let args = self.parse_call_args()?;
                expr = Expr::new(
                    ExprKind::Call(CallExpr {
                        callee: Box::new(expr),
                        args,
                        generic_args: Vec::new(),
                        callee_decl: None,
                        receiver_type: None,
                    }),
                    location,
                );
            } else if self.check(&Token::Less) && self.callee_position(&expr) {
                // `f<int>(x)` needs a speculative parse to separate it from
                // the comparison `f < int`.
                let saved = self.position();
                match self.parse_generic_type_args() {
                    Ok(generic_args) if self.check(&Token::LeftParen) => {
                        let args = self.parse_call_args()?;
                        expr = Expr::new(
                            ExprKind::Call(CallExpr {
                                callee: Box::new(expr),
                                args,
                                generic_args,
                                callee_decl: None,
                                receiver_type: None,
                            }),
                            location,
                        );
                    }
                    _ => {
                        self.rewind(saved);
                        break;
                    }
                }
            } else if self.check(&Token::Dot) {
                self.advance();
                let member = self.consume_identifier("expected a member name after `.`")?;
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        member,
                        decl: None,
                    },
                    location,
                );
            } else if self.check(&Token::LeftBracket) {
                self.advance();
                let index = self.parse_expr()?;
                self.consume(&Token::RightBracket, "expected `]` after subscript")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    location,
                );
            } else if self.check(&Token::Not) {
                self.advance();
                expr = Expr::new(
                    ExprKind::Unwrap {
                        operand: Box::new(expr),
                    },
                    location,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn callee_position(&self, expr: &Expr) -> bool {
        matches!(expr.kind, ExprKind::Var { .. } | ExprKind::Member { .. })
    }

    fn parse_call_args(&mut self) -> Result<Vec<NamedArg>, ParseError> {
        self.consume(&Token::LeftParen, "expected `(`")?;
        let mut args = Vec::new();

        if !self.check(&Token::RightParen) {
            loop {
                let name = if matches!(self.peek(), Token::Identifier(_))
                    && self.check_ahead(1, &Token::Colon)
                {
                    let name = self.consume_identifier("expected an argument name")?;
                    self.advance(); // :
                    Some(name)
                } else {
                    None
                };
                let value = self.parse_expr()?;
                args.push(NamedArg { name, value });

                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }

        self.consume(&Token::RightParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let location = self.current_span();

        match self.peek().clone() {
            Token::IntLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLiteral(value), location))
            }
            Token::FloatLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::FloatLiteral(value), location))
            }
            Token::StringLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(value), location))
            }
            Token::CharacterLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::CharacterLiteral(value), location))
            }
            Token::True => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(true), location))
            }
            Token::False => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(false), location))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::NullLiteral, location))
            }
            Token::Undefined => {
                self.advance();
                Ok(Expr::new(ExprKind::UndefinedLiteral, location))
            }
            Token::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This, location))
            }
            Token::Sizeof => {
                self.advance();
                self.consume(&Token::LeftParen, "expected `(` after `sizeof`")?;
                let ty = self.parse_type()?;
                self.consume(&Token::RightParen, "expected `)` after type")?;
                Ok(Expr::new(ExprKind::Sizeof { ty }, location))
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Var { name, decl: None }, location))
            }
            Token::LeftParen => self.parse_tuple_or_grouping(location),
            Token::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&Token::RightBracket) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.consume(&Token::RightBracket, "expected `]` after array literal")?;
                Ok(Expr::new(ExprKind::ArrayLiteral(elements), location))
            }
            _ => Err(self.error("expected an expression")),
        }
    }

    /// `(expr)` grouping or `(a, b)` / `(x: 1, y: 2)` tuple literal.
    fn parse_tuple_or_grouping(
        &mut self,
        location: sable_diagnostics::Span,
    ) -> Result<Expr, ParseError> {
        self.consume(&Token::LeftParen, "expected `(`")?;
        let mut elements = Vec::new();

        loop {
            let name = if matches!(self.peek(), Token::Identifier(_))
                && self.check_ahead(1, &Token::Colon)
            {
                let name = self.consume_identifier("expected an element name")?;
                self.advance(); // :
                Some(name)
            } else {
                None
            };
            let value = self.parse_expr()?;
            elements.push(NamedArg { name, value });

            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::RightParen, "expected `)`")?;

        if elements.len() == 1 && elements[0].name.is_none() {
            let element = elements.into_iter().next().map(|e| e.value);
            match element {
                Some(value) => Ok(value),
                None => Err(self.error("expected an expression")),
            }
        } else {
            Ok(Expr::new(ExprKind::TupleLiteral(elements), location))
        }
    }
}
