// Statement typechecking, including the canonicalizing loop lowerings:
// `while` and `for-in` are rewritten into the canonical `for` form here, on
// the typed AST, so the synthesized iterator calls resolve like any other
// call. IR generation only ever sees `for`.

use super::Typechecker;
use crate::error::{CompileError, CompileResult};
use sable_ast::*;
use sable_diagnostics::{error_codes, Diagnostic};

impl Typechecker<'_> {
    pub(crate) fn typecheck_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        let location = stmt.location.clone();

        match &mut stmt.kind {
            StmtKind::Return(value) => {
                let return_type = self.function_return_type.clone().ok_or_else(|| {
                    CompileError::internal("return outside a function".to_string(), location.clone())
                })?;
                match value {
                    Some(value) => {
                        let value_ty = self.typecheck_expr(value, false, Some(&return_type))?;
                        if return_type.is_void() {
                            return Err(CompileError::error(
                                error_codes::RETURN_TYPE_MISMATCH,
                                "void function cannot return a value".to_string(),
                                location,
                            ));
                        }
                        self.convert_or_error(value, &value_ty, &return_type)
                            .map_err(|error| match error {
                                CompileError::Diagnostic(d) => {
                                    CompileError::Diagnostic(Diagnostic {
                                        code: error_codes::RETURN_TYPE_MISMATCH.to_string(),
                                        ..d
                                    })
                                }
                                other => other,
                            })?;
                    }
                    None => {
                        if !return_type.is_void() && !self.current_function_is_main {
                            return Err(CompileError::error(
                                error_codes::RETURN_TYPE_MISMATCH,
                                format!("non-void function must return `{}`", return_type),
                                location,
                            ));
                        }
                    }
                }
                Ok(())
            }

            StmtKind::Var(decl) => {
                let decl = decl.clone();
                self.typecheck_var_decl(&decl)?;
                let name = decl.borrow().name();
                let previous = self.module.borrow().symbol_table.find_in_current_scope(&name);
                if let Some(previous) = previous.first() {
                    return Err(CompileError::error(
                        error_codes::REDEFINITION,
                        format!("redefinition of `{}`", name),
                        location,
                    )
                    .with_note(
                        "previous definition is here".to_string(),
                        previous.borrow().location(),
                    ));
                }
                self.module.borrow_mut().symbol_table.add(name, decl);
                Ok(())
            }

            StmtKind::Expr(expr) => {
                self.typecheck_expr(expr, false, None)?;
                Ok(())
            }

            StmtKind::Increment(expr) | StmtKind::Decrement(expr) => {
                if !expr.is_lvalue() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        "increment target must be assignable".to_string(),
                        location,
                    ));
                }
                let ty = self.typecheck_expr(expr, false, None)?;
                if !ty.is_integer() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot increment a value of type `{}`", ty),
                        location,
                    ));
                }
                if !ty.is_mutable() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        "cannot mutate an immutable value".to_string(),
                        location,
                    ));
                }
                Ok(())
            }

            StmtKind::Defer(expr) => {
                self.typecheck_expr(expr, false, None)?;
                Ok(())
            }

            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.typecheck_condition(condition)?;
                let mut then_body = std::mem::take(then_body);
                let mut else_body = std::mem::take(else_body);
                let result = self
                    .typecheck_scoped_block(&mut then_body)
                    .and_then(|()| self.typecheck_scoped_block(&mut else_body));
                if let StmtKind::If {
                    then_body: then_slot,
                    else_body: else_slot,
                    ..
                } = &mut stmt.kind
                {
                    *then_slot = then_body;
                    *else_slot = else_body;
                }
                result
            }

            StmtKind::Switch { .. } => self.typecheck_switch_stmt(stmt),

            // `while (cond) body` -> `for (; cond; ) body`
            StmtKind::While { condition, body } => {
                let condition = std::mem::replace(
                    condition,
                    Expr::new(ExprKind::NullLiteral, location.clone()),
                );
                let body = std::mem::take(body);
                *stmt = lower_while(condition, body, location);
                self.typecheck_stmt(stmt)
            }

            StmtKind::ForEach { .. } => self.typecheck_for_each_stmt(stmt),

            StmtKind::For {
                variable,
                condition,
                increment,
                body,
            } => {
                self.module.borrow_mut().symbol_table.push_scope();

                let result = (|this: &mut Self| -> CompileResult<()> {
                    if let Some(variable) = variable {
                        let variable = variable.clone();
                        this.typecheck_var_decl(&variable)?;
                        let name = variable.borrow().name();
                        this.module.borrow_mut().symbol_table.add(name, variable);
                    }
                    if let Some(condition) = condition {
                        this.typecheck_condition(condition)?;
                    }
                    this.breakable_blocks += 1;
                    this.continuable_blocks += 1;
                    let mut result = Ok(());
                    for stmt in body.iter_mut() {
                        if let Err(error) = this.typecheck_stmt(stmt) {
                            result = Err(error);
                            break;
                        }
                    }
                    if result.is_ok() {
                        if let Some(increment) = increment {
                            result = this.typecheck_stmt(increment);
                        }
                    }
                    this.breakable_blocks -= 1;
                    this.continuable_blocks -= 1;
                    result
                })(self);

                self.module.borrow_mut().symbol_table.pop_scope();
                result
            }

            StmtKind::Break => {
                if self.breakable_blocks == 0 {
                    return Err(CompileError::error(
                        error_codes::BREAK_OUTSIDE_LOOP,
                        "`break` outside a loop or switch".to_string(),
                        location,
                    ));
                }
                Ok(())
            }

            StmtKind::Continue => {
                if self.continuable_blocks == 0 {
                    return Err(CompileError::error(
                        error_codes::BREAK_OUTSIDE_LOOP,
                        "`continue` outside a loop".to_string(),
                        location,
                    ));
                }
                Ok(())
            }

            StmtKind::Compound(body) => {
                let mut body = std::mem::take(body);
                let result = self.typecheck_scoped_block(&mut body);
                if let StmtKind::Compound(slot) = &mut stmt.kind {
                    *slot = body;
                }
                result
            }

            StmtKind::Assign { target, value } => {
                // Null literals need the target's type; everything else is
                // checked before the target so a moved binding cannot be
                // read through its own revival.
                let value_ty = if value.is_null_literal() {
                    None
                } else {
                    Some(self.typecheck_expr(value, false, None)?)
                };

                if !target.is_lvalue() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        "cannot assign to this expression".to_string(),
                        location,
                    ));
                }
                let target_ty = self.typecheck_expr(target, true, None)?;
                if !target_ty.is_mutable() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        "cannot assign to an immutable value".to_string(),
                        location,
                    ));
                }

                let value_ty = match value_ty {
                    Some(ty) => ty,
                    None => self.typecheck_expr(value, false, Some(&target_ty))?,
                };
                self.convert_or_error(value, &value_ty, &target_ty)?;
                Ok(())
            }
        }
    }

    fn typecheck_scoped_block(&mut self, body: &mut [Stmt]) -> CompileResult<()> {
        self.module.borrow_mut().symbol_table.push_scope();
        let mut result = Ok(());
        for stmt in body.iter_mut() {
            if let Err(error) = self.typecheck_stmt(stmt) {
                result = Err(error);
                break;
            }
        }
        self.module.borrow_mut().symbol_table.pop_scope();
        result
    }

    /// `for (x in range)` -> canonical `for` with a synthesized iterator.
    /// If the range's type (pointers stripped) conforms to `Iterator`, the
    /// `.iterator()` call is omitted.
    fn typecheck_for_each_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        let location = stmt.location.clone();

        let (variable, mut range, body) = match std::mem::replace(&mut stmt.kind, StmtKind::Break) {
            StmtKind::ForEach {
                variable,
                range,
                body,
            } => (variable, range, body),
            _ => unreachable!("typecheck_for_each_stmt on a non-for-each statement"),
        };

        let range_ty = self.typecheck_expr(&mut range, false, None)?;
        let stripped = range_ty.remove_pointer();
        let range_is_iterator = match self.resolve_type_decl(&stripped, &location)? {
            Some(decl) => {
                let conforms = match &*decl.borrow() {
                    Decl::Type(type_decl) => type_decl.conforms_to("Iterator"),
                    _ => false,
                };
                conforms
            }
            None => false,
        };

        let level = self.foreach_nest_level;
        *stmt = lower_for_each(variable, range, body, location, level, range_is_iterator);

        self.foreach_nest_level += 1;
        let result = self.typecheck_stmt(stmt);
        self.foreach_nest_level -= 1;
        result
    }

    fn typecheck_switch_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        let location = stmt.location.clone();
        let (condition, cases, default_body) = match &mut stmt.kind {
            StmtKind::Switch {
                condition,
                cases,
                default_body,
            } => (condition, cases, default_body),
            _ => unreachable!("typecheck_switch_stmt on a non-switch statement"),
        };

        let condition_ty = self.typecheck_expr(condition, false, None)?;
        let enum_decl = self.resolve_type_decl(&condition_ty, &location)?.filter(
            |decl| matches!(&*decl.borrow(), Decl::Enum(_)),
        );

        self.breakable_blocks += 1;
        let mut result = Ok(());

        'cases: for case in cases.iter_mut() {
            if let Some(enum_decl) = &enum_decl {
                if let Err(error) = self.resolve_enum_case_pattern(case, enum_decl, &condition_ty) {
                    result = Err(error);
                    break 'cases;
                }
            } else {
                if case.associated_value.is_some() {
                    result = Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        "associated-value bindings require an enum switch".to_string(),
                        case.value.location.clone(),
                    ));
                    break 'cases;
                }
                match self.typecheck_expr(&mut case.value, false, Some(&condition_ty)) {
                    Ok(value_ty) => {
                        if let Err(error) =
                            self.convert_or_error(&mut case.value, &value_ty, &condition_ty)
                        {
                            result = Err(error);
                            break 'cases;
                        }
                    }
                    Err(error) => {
                        result = Err(error);
                        break 'cases;
                    }
                }
            }

            self.module.borrow_mut().symbol_table.push_scope();
            if let Some(binding) = &case.associated_value {
                let name = binding.borrow().name();
                self.module.borrow_mut().symbol_table.add(name, binding.clone());
            }
            for stmt in case.body.iter_mut() {
                if let Err(error) = self.typecheck_stmt(stmt) {
                    result = Err(error);
                    break;
                }
            }
            self.module.borrow_mut().symbol_table.pop_scope();
            if result.is_err() {
                break 'cases;
            }
        }

        if result.is_ok() {
            result = self.typecheck_scoped_block(default_body);
        }

        self.breakable_blocks -= 1;
        result
    }

    /// Case patterns over an enum condition: `Enum.case` or a bare case
    /// name, with an optional associated-value binding.
    fn resolve_enum_case_pattern(
        &mut self,
        case: &mut SwitchCase,
        enum_decl: &DeclRef,
        condition_ty: &Type,
    ) -> CompileResult<()> {
        let location = case.value.location.clone();

        let case_name = match &case.value.kind {
            ExprKind::Member { member, .. } => member.clone(),
            ExprKind::Var { name, .. } => name.clone(),
            _ => {
                return Err(CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    "expected an enum case pattern".to_string(),
                    location,
                ))
            }
        };

        let (case_decl, associated_type) = {
            let borrowed = enum_decl.borrow();
            match &*borrowed {
                Decl::Enum(e) => match e.find_case(&case_name) {
                    Some(case_decl) => {
                        let associated = match &*case_decl.borrow() {
                            Decl::EnumCase(c) => c.associated_type.clone(),
                            _ => None,
                        };
                        (case_decl, associated)
                    }
                    None => {
                        return Err(CompileError::error(
                            error_codes::UNDEFINED_IDENTIFIER,
                            format!("enum has no case named `{}`", case_name),
                            location,
                        ))
                    }
                },
                _ => unreachable!("not an enum"),
            }
        };

        case.value.ty = Some(condition_ty.clone());
        match &mut case.value.kind {
            ExprKind::Member { decl, .. } | ExprKind::Var { decl, .. } => {
                *decl = Some(case_decl);
            }
            _ => {}
        }

        if let Some(binding) = &case.associated_value {
            let associated_type = associated_type.ok_or_else(|| {
                CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    format!("enum case `{}` carries no associated value", case_name),
                    location.clone(),
                )
            })?;
            if let Decl::Var(var) = &mut *binding.borrow_mut() {
                var.ty = Some(associated_type);
                var.state = CheckState::Typed;
            }
        }
        Ok(())
    }
}
