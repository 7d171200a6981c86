// Statement syntax.

use super::Parser;
use crate::ParseError;
use sable_ast::*;
use sable_lexer::Token;

impl<'a> Parser<'a> {
    /// `{ stmt* }`
    pub(crate) fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.consume(&Token::LeftBrace, "expected `{`")?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RightBrace) && !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }
        self.consume(&Token::RightBrace, "expected `}`")?;
        Ok(stmts)
    }

    /// A brace-delimited block, or a single statement treated as one.
    fn parse_block_or_stmt(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.check(&Token::LeftBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    pub(crate) fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let location = self.current_span();

        if self.check(&Token::LeftBrace) {
            return Ok(Stmt::new(StmtKind::Compound(self.parse_block()?), location));
        }
        if self.check(&Token::Return) {
            self.advance();
            let value = if self.check(&Token::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.consume(&Token::Semicolon, "expected `;` after return")?;
            return Ok(Stmt::new(StmtKind::Return(value), location));
        }
        if self.check(&Token::Break) {
            self.advance();
            self.consume(&Token::Semicolon, "expected `;` after `break`")?;
            return Ok(Stmt::new(StmtKind::Break, location));
        }
        if self.check(&Token::Continue) {
            self.advance();
            self.consume(&Token::Semicolon, "expected `;` after `continue`")?;
            return Ok(Stmt::new(StmtKind::Continue, location));
        }
        if self.check(&Token::Defer) {
            self.advance();
            let expr = self.parse_expr()?;
            self.consume(&Token::Semicolon, "expected `;` after deferred expression")?;
            return Ok(Stmt::new(StmtKind::Defer(expr), location));
        }
        if self.check(&Token::If) {
            return self.parse_if_stmt(location);
        }
        if self.check(&Token::While) {
            self.advance();
            self.consume(&Token::LeftParen, "expected `(` after `while`")?;
            let condition = self.parse_expr()?;
            self.consume(&Token::RightParen, "expected `)` after condition")?;
            let body = self.parse_block_or_stmt()?;
            return Ok(Stmt::new(StmtKind::While { condition, body }, location));
        }
        if self.check(&Token::For) {
            return self.parse_for_stmt(location);
        }
        if self.check(&Token::Switch) {
            return self.parse_switch_stmt(location);
        }
        let is_var_stmt = self.check(&Token::Var)
            || (self.check(&Token::Const)
                && self.check_ahead(1, &Token::Identifier(String::new()))
                && (self.check_ahead(2, &Token::Assignment)
                    || self.check_ahead(2, &Token::Colon)));
        if is_var_stmt {
            let decl = self.parse_var_decl(false, AccessLevel::Default)?;
            return Ok(Stmt::new(StmtKind::Var(decl), location));
        }

        // Typed local declaration (`Type name = init;`) requires lookahead
        // to separate it from an expression statement like `a * b;`.
        if self.looks_like_typed_var_decl() {
            let ty = self.parse_type()?;
            let name = self.consume_identifier("expected a variable name")?;
            let initializer = if self.match_token(&Token::Assignment) {
                if self.match_token(&Token::Undefined) {
                    None
                } else {
                    Some(self.parse_expr()?)
                }
            } else {
                None
            };
            self.consume(&Token::Semicolon, "expected `;` after variable declaration")?;
            let decl = decl_ref(Decl::Var(VarDecl {
                ty: Some(ty),
                is_const: false,
                name,
                initializer,
                moved: false,
                is_global: false,
                access: AccessLevel::Default,
                module: self.module_name.clone(),
                location: location.clone(),
                state: CheckState::Declared,
            }));
            return Ok(Stmt::new(StmtKind::Var(decl), location));
        }

        // Expression-rooted statements: assignment, compound assignment,
        // increment/decrement, or a plain expression.
        let target = self.parse_expr()?;

        if self.match_token(&Token::Increment) {
            self.consume(&Token::Semicolon, "expected `;` after `++`")?;
            return Ok(Stmt::new(StmtKind::Increment(target), location));
        }
        if self.match_token(&Token::Decrement) {
            self.consume(&Token::Semicolon, "expected `;` after `--`")?;
            return Ok(Stmt::new(StmtKind::Decrement(target), location));
        }
        if self.match_token(&Token::Assignment) {
            let value = self.parse_expr()?;
            self.consume(&Token::Semicolon, "expected `;` after assignment")?;
            return Ok(Stmt::new(StmtKind::Assign { target, value }, location));
        }
        if let Some(op) = self.compound_assignment_op() {
            self.advance();
            let value = self.parse_expr()?;
            self.consume(&Token::Semicolon, "expected `;` after assignment")?;
            // `a op= b` is sugar for `a = a op b`.
            let combined = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(target.clone()),
                    rhs: Box::new(value),
                },
                location.clone(),
            );
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target,
                    value: combined,
                },
                location,
            ));
        }

        self.consume(&Token::Semicolon, "expected `;` after expression")?;
        Ok(Stmt::new(StmtKind::Expr(target), location))
    }

    fn compound_assignment_op(&self) -> Option<BinaryOp> {
        let op = match self.peek() {
            Token::PlusEqual => BinaryOp::Add,
            Token::MinusEqual => BinaryOp::Sub,
            Token::StarEqual => BinaryOp::Mul,
            Token::SlashEqual => BinaryOp::Div,
            Token::ModuloEqual => BinaryOp::Mod,
            Token::AndEqual => BinaryOp::BitAnd,
            Token::OrEqual => BinaryOp::BitOr,
            Token::XorEqual => BinaryOp::BitXor,
            Token::LeftShiftEqual => BinaryOp::Shl,
            Token::RightShiftEqual => BinaryOp::Shr,
            Token::AndAndEqual => BinaryOp::LogicalAnd,
            Token::OrOrEqual => BinaryOp::LogicalOr,
            _ => return None,
        };
        Some(op)
    }

    /// Heuristic: `Identifier ident (= | ;)`, or a type followed by
    /// `* ? [` postfixes and then an identifier. Resolved by speculative
    /// parse with rewind.
    fn looks_like_typed_var_decl(&mut self) -> bool {
        if !self.check(&Token::Identifier(String::new()))
            && !self.check(&Token::Const)
            && !self.check(&Token::LeftParen)
        {
            return false;
        }

        let saved = self.position();
        let mut is_decl = false;
        if self.parse_type().is_ok()
            && matches!(self.peek(), Token::Identifier(_))
        {
            self.advance();
            is_decl = self.check(&Token::Assignment) || self.check(&Token::Semicolon);
        }
        self.rewind(saved);
        is_decl
    }

    fn parse_if_stmt(&mut self, location: sable_diagnostics::Span) -> Result<Stmt, ParseError> {
        self.consume(&Token::If, "expected `if`")?;
        self.consume(&Token::LeftParen, "expected `(` after `if`")?;
        let condition = self.parse_expr()?;
        self.consume(&Token::RightParen, "expected `)` after condition")?;

        let then_body = self.parse_block_or_stmt()?;
        let else_body = if self.match_token(&Token::Else) {
            self.parse_block_or_stmt()?
        } else {
            Vec::new()
        };

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_body,
                else_body,
            },
            location,
        ))
    }

    /// `for (init; cond; inc) body`, `for (var x in range) body`, or the
    /// unparenthesized `for x in range body`.
    fn parse_for_stmt(&mut self, location: sable_diagnostics::Span) -> Result<Stmt, ParseError> {
        self.consume(&Token::For, "expected `for`")?;

        let parenthesized = self.match_token(&Token::LeftParen);

        // for-in form: `[var] ident in range`
        let is_for_in = {
            let ident_offset = if self.check(&Token::Var) { 1 } else { 0 };
            self.check_ahead(ident_offset, &Token::Identifier(String::new()))
                && self.check_ahead(ident_offset + 1, &Token::In)
        };

        if is_for_in {
            self.match_token(&Token::Var);
            let variable_location = self.current_span();
            let name = self.consume_identifier("expected a loop variable")?;
            self.consume(&Token::In, "expected `in`")?;
            let range = self.parse_expr()?;
            if parenthesized {
                self.consume(&Token::RightParen, "expected `)`")?;
            }
            let body = self.parse_block_or_stmt()?;

            let variable = decl_ref(Decl::Var(VarDecl {
                ty: None,
                is_const: false,
                name,
                initializer: None,
                moved: false,
                is_global: false,
                access: AccessLevel::Default,
                module: self.module_name.clone(),
                location: variable_location,
                state: CheckState::Declared,
            }));
            return Ok(Stmt::new(
                StmtKind::ForEach {
                    variable,
                    range,
                    body,
                },
                location,
            ));
        }

        if !parenthesized {
            return Err(self.error("expected `(` after `for`"));
        }

        // C-style loop; every header slot is optional.
        let variable = if self.check(&Token::Semicolon) {
            self.advance();
            None
        } else {
            let decl = self.parse_var_decl(false, AccessLevel::Default)?;
            Some(decl)
        };

        let condition = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(&Token::Semicolon, "expected `;` in for loop")?;

        let increment = if self.check(&Token::RightParen) {
            None
        } else {
            Some(Box::new(self.parse_loop_increment()?))
        };
        self.consume(&Token::RightParen, "expected `)` after for header")?;

        let body = self.parse_block_or_stmt()?;
        Ok(Stmt::new(
            StmtKind::For {
                variable,
                condition,
                increment,
                body,
            },
            location,
        ))
    }

    /// The increment slot of a C-style for: an expression, `x++`/`x--`, or
    /// an assignment.
    fn parse_loop_increment(&mut self) -> Result<Stmt, ParseError> {
        let location = self.current_span();
        let expr = self.parse_expr()?;

        if self.match_token(&Token::Increment) {
            return Ok(Stmt::new(StmtKind::Increment(expr), location));
        }
        if self.match_token(&Token::Decrement) {
            return Ok(Stmt::new(StmtKind::Decrement(expr), location));
        }
        if self.match_token(&Token::Assignment) {
            let value = self.parse_expr()?;
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target: expr,
                    value,
                },
                location,
            ));
        }
        if let Some(op) = self.compound_assignment_op() {
            self.advance();
            let value = self.parse_expr()?;
            let combined = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(expr.clone()),
                    rhs: Box::new(value),
                },
                location.clone(),
            );
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target: expr,
                    value: combined,
                },
                location,
            ));
        }
        Ok(Stmt::new(StmtKind::Expr(expr), location))
    }

    fn parse_switch_stmt(&mut self, location: sable_diagnostics::Span) -> Result<Stmt, ParseError> {
        self.consume(&Token::Switch, "expected `switch`")?;
        self.consume(&Token::LeftParen, "expected `(` after `switch`")?;
        let condition = self.parse_expr()?;
        self.consume(&Token::RightParen, "expected `)` after switch condition")?;
        self.consume(&Token::LeftBrace, "expected `{` in switch")?;

        let mut cases = Vec::new();
        let mut default_body = Vec::new();

        while !self.check(&Token::RightBrace) && !self.is_at_end() {
            if self.match_token(&Token::Default) {
                self.consume(&Token::Colon, "expected `:` after `default`")?;
                default_body = self.parse_case_body()?;
            } else {
                self.consume(&Token::Case, "expected `case` or `default`")?;
                let (value, associated_value) = self.parse_case_pattern()?;
                self.consume(&Token::Colon, "expected `:` after case value")?;
                let body = self.parse_case_body()?;
                cases.push(SwitchCase {
                    value,
                    associated_value,
                    body,
                });
            }
        }
        self.consume(&Token::RightBrace, "expected `}` after switch")?;

        Ok(Stmt::new(
            StmtKind::Switch {
                condition,
                cases,
                default_body,
            },
            location,
        ))
    }

    /// Case patterns are either plain expressions (`case 3:`) or an enum
    /// case path with an associated-value binding: `case Shape.circle(var r):`.
    fn parse_case_pattern(&mut self) -> Result<(Expr, Option<DeclRef>), ParseError> {
        if matches!(self.peek(), Token::Identifier(_)) {
            let saved = self.position();
            let location = self.current_span();

            // Path: ident (.ident)*
            let mut expr = {
                let name = self.consume_identifier("expected a case value")?;
                Expr::new(ExprKind::Var { name, decl: None }, location.clone())
            };
            while self.check(&Token::Dot) && self.check_ahead(1, &Token::Identifier(String::new())) {
                self.advance();
                let member_location = self.current_span();
                let member = self.consume_identifier("expected a member name")?;
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        member,
                        decl: None,
                    },
                    member_location,
                );
            }

            if self.check(&Token::LeftParen) && self.check_ahead(1, &Token::Var) {
                self.advance(); // (
                self.advance(); // var
                let binding_location = self.current_span();
                let name = self.consume_identifier("expected a binding name")?;
                self.consume(&Token::RightParen, "expected `)` after binding")?;

                let binding = decl_ref(Decl::Var(VarDecl {
                    ty: None,
                    is_const: false,
                    name,
                    initializer: None,
                    moved: false,
                    is_global: false,
                    access: AccessLevel::Default,
                    module: self.module_name.clone(),
                    location: binding_location,
                    state: CheckState::Declared,
                }));
                return Ok((expr, Some(binding)));
            }

            if self.check(&Token::Colon) {
                return Ok((expr, None));
            }

            // Not a plain path after all (e.g. `case x + 1:`); reparse as a
            // general expression.
            self.rewind(saved);
        }

        Ok((self.parse_expr()?, None))
    }

    fn parse_case_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.check(&Token::Case)
            && !self.check(&Token::Default)
            && !self.check(&Token::RightBrace)
            && !self.is_at_end()
        {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }
}
