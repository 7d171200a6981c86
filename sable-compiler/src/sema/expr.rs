// Expression typechecking: name resolution, literal typing against the
// expected type, implicit casts inserted in place.

use super::convert::types_match;
use super::Typechecker;
use crate::error::{CompileError, CompileResult};
use sable_ast::*;
use sable_diagnostics::{error_codes, suggest_name};

impl Typechecker<'_> {
    /// Resolves names, infers the expression type, inserts implicit casts,
    /// and returns the final type. A second pass over an already-typed
    /// expression is a no-op and returns the same type.
    pub(crate) fn typecheck_expr(
        &mut self,
        expr: &mut Expr,
        write_only: bool,
        expected: Option<&Type>,
    ) -> CompileResult<Type> {
        if let Some(ty) = &expr.ty {
            return Ok(ty.clone());
        }

        let location = expr.location.clone();
        let ty = match &mut expr.kind {
            ExprKind::Var { .. } => self.typecheck_var_expr(expr, write_only)?,
            ExprKind::This => match &self.receiver_type {
                Some(receiver) => receiver.pointer_to(),
                None => {
                    return Err(CompileError::error(
                        error_codes::UNDEFINED_IDENTIFIER,
                        "`this` is only allowed inside methods".to_string(),
                        location,
                    ))
                }
            },
            ExprKind::IntLiteral(value) => {
                let value = *value;
                self.integer_literal_type(value, expected, &location)?
            }
            ExprKind::FloatLiteral(_) => match expected.map(Type::remove_optional) {
                Some(target) if target.is_float32() || target.is_float() => target,
                _ => Type::float64(location.clone()),
            },
            ExprKind::BoolLiteral(_) => Type::bool_(location.clone()),
            ExprKind::CharacterLiteral(_) => Type::char_(location.clone()),
            ExprKind::StringLiteral(_) => {
                Type::char_(location.clone()).pointer_to()
            }
            ExprKind::NullLiteral => match expected {
                Some(target) if target.is_optional() || target.is_pointer() => target.clone(),
                _ => {
                    return Err(CompileError::error(
                        error_codes::NON_OPTIONAL_NULL,
                        "`null` requires an optional or pointer context".to_string(),
                        location,
                    ))
                }
            },
            ExprKind::UndefinedLiteral => {
                return Err(CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    "`undefined` is only allowed as a variable initializer".to_string(),
                    location,
                ))
            }
            ExprKind::ArrayLiteral(elements) => {
                let mut elements = std::mem::take(elements);
                let expected_element = expected.and_then(|t| t.element_type().cloned());
                let ty = self.typecheck_array_literal(&mut elements, expected_element, &location)?;
                if let ExprKind::ArrayLiteral(slot) = &mut expr.kind {
                    *slot = elements;
                }
                ty
            }
            ExprKind::TupleLiteral(elements) => {
                let mut elements = std::mem::take(elements);
                let mut tuple_elements = Vec::with_capacity(elements.len());
                for element in &mut elements {
                    let ty = self.typecheck_expr(&mut element.value, false, None)?;
                    tuple_elements.push(TupleElement {
                        name: element.name.clone(),
                        ty,
                    });
                }
                if let ExprKind::TupleLiteral(slot) = &mut expr.kind {
                    *slot = elements;
                }
                Type::tuple(tuple_elements, Mutability::Mutable, location.clone())
            }
            ExprKind::Unary { .. } => self.typecheck_unary_expr(expr, expected)?,
            ExprKind::Binary { .. } => self.typecheck_binary_expr(expr, expected)?,
            ExprKind::Call(_) => self.typecheck_call_expr(expr, expected)?,
            ExprKind::Member { .. } => self.typecheck_member_expr(expr, write_only)?,
            ExprKind::Subscript { base, index } => {
                let base_ty = self.typecheck_expr(base, false, None)?;
                let index_ty = self.typecheck_expr(index, false, None)?;
                if !index_ty.is_integer() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("subscript index must be an integer, found `{}`", index_ty),
                        index.location.clone(),
                    ));
                }
                let stripped = base_ty.remove_pointer();
                match stripped.element_type() {
                    Some(element) => element.clone(),
                    None => match base_ty.pointee() {
                        Some(pointee) => pointee.clone(),
                        None => {
                            return Err(CompileError::error(
                                error_codes::TYPE_MISMATCH,
                                format!("cannot subscript a value of type `{}`", base_ty),
                                location,
                            ))
                        }
                    },
                }
            }
            ExprKind::Unwrap { operand } => {
                let operand_ty = self.typecheck_expr(operand, false, None)?;
                if let Some(wrapped) = operand_ty.wrapped_type() {
                    wrapped.clone()
                } else if operand_ty.is_pointer() {
                    operand_ty
                } else {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot unwrap a non-optional value of type `{}`", operand_ty),
                        location,
                    ));
                }
            }
            ExprKind::Cast { operand, target } => {
                let target = target.clone();
                let source = self.typecheck_expr(operand, false, None)?;
                self.typecheck_type(&target, &location)?;
                if !is_valid_cast(&source, &target) {
                    return Err(CompileError::error(
                        error_codes::INVALID_CAST,
                        format!("invalid cast from `{}` to `{}`", source, target),
                        location,
                    ));
                }
                target
            }
            ExprKind::Sizeof { ty } => {
                let ty = ty.clone();
                self.typecheck_type(&ty, &location)?;
                Type::uint64(location.clone())
            }
            ExprKind::ImplicitCast { .. } => {
                return Err(CompileError::internal(
                    "implicit cast encountered before typechecking".to_string(),
                    location,
                ))
            }
        };

        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn integer_literal_type(
        &mut self,
        value: u64,
        expected: Option<&Type>,
        location: &sable_diagnostics::Span,
    ) -> CompileResult<Type> {
        if let Some(target) = expected.map(Type::remove_optional) {
            if target.is_integer() && integer_literal_fits(value, &target) {
                return Ok(target);
            }
            if target.is_floating_point() {
                return Ok(target);
            }
        }
        if value > i32::MAX as u64 {
            return Ok(Type::int64(location.clone()));
        }
        Ok(Type::int(location.clone()))
    }

    fn typecheck_array_literal(
        &mut self,
        elements: &mut [Expr],
        expected_element: Option<Type>,
        location: &sable_diagnostics::Span,
    ) -> CompileResult<Type> {
        let mut element_ty = expected_element;
        for element in elements.iter_mut() {
            let ty = self.typecheck_expr(element, false, element_ty.as_ref())?;
            match &element_ty {
                Some(existing) => {
                    self.convert_or_error(element, &ty, existing)?;
                }
                None => element_ty = Some(ty),
            }
        }
        let element_ty = element_ty.ok_or_else(|| {
            CompileError::error(
                error_codes::TYPE_MISMATCH,
                "cannot infer the element type of an empty array literal".to_string(),
                location.clone(),
            )
        })?;
        Ok(Type::array(
            element_ty,
            ArraySize::Constant(elements.len() as u64),
            Mutability::Mutable,
            location.clone(),
        ))
    }

    fn typecheck_var_expr(&mut self, expr: &mut Expr, write_only: bool) -> CompileResult<Type> {
        let location = expr.location.clone();
        let name = match &expr.kind {
            ExprKind::Var { name, .. } => name.clone(),
            _ => unreachable!("typecheck_var_expr on a non-var expression"),
        };

        let candidates = self.find_decls(&name);
        let decl = match candidates.first() {
            Some(decl) => decl.clone(),
            None => {
                let visible = self.visible_names();
                let mut error = CompileError::error(
                    error_codes::UNDEFINED_IDENTIFIER,
                    format!("undefined identifier `{}`", name),
                    location,
                );
                if let Some(suggestion) =
                    suggest_name(&name, visible.iter().map(String::as_str))
                {
                    error = match error {
                        CompileError::Diagnostic(d) => CompileError::Diagnostic(
                            d.with_help(format!("did you mean `{}`?", suggestion)),
                        ),
                        other => other,
                    };
                }
                return Err(error);
            }
        };

        let ty = self.decl_value_type(&decl, &location)?;

        // Move tracking: any use of a moved binding before reassignment is
        // an error; a write revives the binding.
        if decl.borrow().is_movable() {
            if write_only {
                decl.borrow_mut().set_moved(false);
            } else if decl.borrow().has_been_moved() {
                return Err(CompileError::error(
                    error_codes::USE_AFTER_MOVE,
                    format!("use of moved value `{}`", name),
                    expr.location.clone(),
                ));
            }
        }

        if let ExprKind::Var { decl: slot, .. } = &mut expr.kind {
            *slot = Some(decl);
        }
        Ok(ty)
    }

    /// The type a declaration has when referenced as a value.
    pub(crate) fn decl_value_type(
        &mut self,
        decl: &DeclRef,
        location: &sable_diagnostics::Span,
    ) -> CompileResult<Type> {
        enum Info {
            Ready(Type),
            LazyVar,
            NotAValue(String),
        }

        let info = match &*decl.borrow() {
            Decl::Param(param) => Info::Ready(param.ty.clone()),
            Decl::Var(var) => match (&var.ty, var.state) {
                (Some(ty), CheckState::Typed) => Info::Ready(ty.clone()),
                _ => Info::LazyVar,
            },
            Decl::Function(function) => Info::Ready(function.function_type()),
            Decl::FunctionTemplate(template) => Info::NotAValue(format!(
                "generic function `{}` needs generic arguments",
                template.name()
            )),
            Decl::EnumCase(case) => match case.parent() {
                Some(parent) => match &*parent.borrow() {
                    Decl::Enum(enum_decl) => Info::Ready(enum_decl.ty()),
                    _ => Info::NotAValue("enum case without an enum".to_string()),
                },
                None => Info::NotAValue("enum case without an enum".to_string()),
            },
            other => Info::NotAValue(format!("`{}` is not a value", other.name())),
        };

        match info {
            Info::Ready(ty) => Ok(ty),
            Info::LazyVar => {
                // Forward-referenced global: typecheck it on demand.
                self.typecheck_var_decl(decl)?;
                match &*decl.borrow() {
                    Decl::Var(var) => var.ty.clone().ok_or_else(|| {
                        CompileError::error(
                            error_codes::TYPE_MISMATCH,
                            format!("could not infer the type of `{}`", var.name),
                            location.clone(),
                        )
                    }),
                    _ => unreachable!("lazy var is not a var"),
                }
            }
            Info::NotAValue(message) => Err(CompileError::error(
                error_codes::TYPE_MISMATCH,
                message,
                location.clone(),
            )),
        }
    }

    fn typecheck_unary_expr(
        &mut self,
        expr: &mut Expr,
        expected: Option<&Type>,
    ) -> CompileResult<Type> {
        let location = expr.location.clone();
        let (op, operand) = match &mut expr.kind {
            ExprKind::Unary { op, operand } => (*op, operand.as_mut()),
            _ => unreachable!("typecheck_unary_expr on a non-unary expression"),
        };

        match op {
            UnaryOp::Negate => {
                let ty = self.typecheck_expr(operand, false, expected)?;
                if ty.is_signed_integer() || ty.is_floating_point() {
                    Ok(ty)
                } else {
                    Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot negate a value of type `{}`", ty),
                        location,
                    ))
                }
            }
            UnaryOp::Not => {
                self.typecheck_condition(operand)?;
                Ok(Type::bool_(location))
            }
            UnaryOp::BitwiseNot => {
                let ty = self.typecheck_expr(operand, false, expected)?;
                if ty.is_integer() {
                    Ok(ty)
                } else {
                    Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot apply `~` to a value of type `{}`", ty),
                        location,
                    ))
                }
            }
            UnaryOp::Deref => {
                let ty = self.typecheck_expr(operand, false, None)?;
                ty.pointee().cloned().ok_or_else(|| {
                    CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot dereference a value of type `{}`", ty),
                        location,
                    )
                })
            }
            UnaryOp::AddressOf => {
                if !operand.is_lvalue() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        "cannot take the address of a temporary".to_string(),
                        location,
                    ));
                }
                let ty = self.typecheck_expr(operand, false, None)?;
                Ok(ty.pointer_to())
            }
        }
    }

    fn typecheck_binary_expr(
        &mut self,
        expr: &mut Expr,
        expected: Option<&Type>,
    ) -> CompileResult<Type> {
        let location = expr.location.clone();
        let (op, lhs, rhs) = match &mut expr.kind {
            ExprKind::Binary { op, lhs, rhs } => (*op, lhs.as_mut(), rhs.as_mut()),
            _ => unreachable!("typecheck_binary_expr on a non-binary expression"),
        };

        if op.is_logical() {
            self.typecheck_condition(lhs)?;
            self.typecheck_condition(rhs)?;
            return Ok(Type::bool_(location));
        }

        // Null comparisons adopt the other operand's type.
        if op.is_comparison() && rhs.is_null_literal() {
            let lhs_ty = self.typecheck_expr(lhs, false, None)?;
            self.typecheck_expr(rhs, false, Some(&lhs_ty))?;
            return Ok(Type::bool_(location));
        }

        let lhs_ty = self.typecheck_expr(lhs, false, expected.filter(|_| !op.is_comparison()))?;
        let rhs_ty = self.typecheck_expr(rhs, false, Some(&lhs_ty))?;
        let unified = self.unify_operands(lhs, &lhs_ty, rhs, &rhs_ty)?;

        if op.is_comparison() {
            return Ok(Type::bool_(location));
        }

        match op {
            BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::Mod
                if !unified.is_integer() =>
            {
                Err(CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    format!("operator `{}` requires integers, found `{}`", op.symbol(), unified),
                    location,
                ))
            }
            _ if unified.is_integer() || unified.is_floating_point() || unified.is_char() => {
                Ok(unified)
            }
            _ => Err(CompileError::error(
                error_codes::TYPE_MISMATCH,
                format!("operator `{}` cannot be applied to `{}`", op.symbol(), unified),
                location,
            )),
        }
    }

    fn unify_operands(
        &mut self,
        lhs: &mut Expr,
        lhs_ty: &Type,
        rhs: &mut Expr,
        rhs_ty: &Type,
    ) -> CompileResult<Type> {
        if types_match(lhs_ty, rhs_ty) {
            return Ok(lhs_ty.clone());
        }
        if self.conversion_kind(rhs_ty, lhs_ty).is_some() {
            return self.convert_or_error(rhs, rhs_ty, lhs_ty);
        }
        if self.conversion_kind(lhs_ty, rhs_ty).is_some() {
            return self.convert_or_error(lhs, lhs_ty, rhs_ty);
        }
        Err(CompileError::error(
            error_codes::TYPE_MISMATCH,
            format!("mismatched operand types `{}` and `{}`", lhs_ty, rhs_ty),
            rhs.location.clone(),
        ))
    }

    fn typecheck_member_expr(&mut self, expr: &mut Expr, write_only: bool) -> CompileResult<Type> {
        let location = expr.location.clone();
        let (base, member) = match &mut expr.kind {
            ExprKind::Member { base, member, .. } => (base.as_mut(), member.clone()),
            _ => unreachable!("typecheck_member_expr on a non-member expression"),
        };

        // `Enum.case` references.
        if let ExprKind::Var { name, .. } = &base.kind {
            let name = name.clone();
            if let Some(enum_decl) = self.find_enum_decl(&name) {
                let (enum_ty, case) = {
                    let borrowed = enum_decl.borrow();
                    match &*borrowed {
                        Decl::Enum(e) => (e.ty(), e.find_case(&member)),
                        _ => unreachable!("find_enum_decl returned a non-enum"),
                    }
                };
                let case = case.ok_or_else(|| {
                    CompileError::error(
                        error_codes::UNDEFINED_IDENTIFIER,
                        format!("enum has no case named `{}`", member),
                        location.clone(),
                    )
                })?;
                base.ty = Some(enum_ty.clone());
                if let ExprKind::Member { decl, .. } = &mut expr.kind {
                    *decl = Some(case);
                }
                return Ok(enum_ty);
            }
        }

        let base_ty = self.typecheck_expr(base, false, None)?;
        if base_ty.is_optional() {
            return Err(CompileError::error(
                error_codes::TYPE_MISMATCH,
                format!("value of type `{}` may be null; unwrap it with `!`", base_ty),
                location,
            ));
        }

        let receiver_const = if let Some(pointee) = base_ty.pointee() {
            !pointee.is_mutable()
        } else {
            !base_ty.is_mutable()
        };
        let stripped = base_ty.remove_pointer();

        // Tuple elements are addressed by name.
        if let Some(elements) = stripped.tuple_elements() {
            if let Some(element) = elements
                .iter()
                .find(|element| element.name.as_deref() == Some(member.as_str()))
            {
                return Ok(element.ty.clone());
            }
        }

        let type_decl = self
            .resolve_type_decl(&stripped, &location)?
            .ok_or_else(|| {
                CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    format!("type `{}` has no members", stripped),
                    location.clone(),
                )
            })?;

        let field_ty = match &*type_decl.borrow() {
            Decl::Type(decl) => decl.find_field(&member).map(|field| field.ty.clone()),
            _ => None,
        };

        match field_ty {
            Some(ty) => {
                let _ = write_only;
                if let ExprKind::Member { decl, .. } = &mut expr.kind {
                    *decl = Some(type_decl);
                }
                if receiver_const {
                    Ok(ty.with_mutability(Mutability::Const))
                } else {
                    Ok(ty)
                }
            }
            None => Err(CompileError::error(
                error_codes::UNDEFINED_IDENTIFIER,
                format!("type `{:#}` has no field named `{}`", stripped, member),
                location,
            )),
        }
    }

    pub(crate) fn find_enum_decl(&self, name: &str) -> Option<DeclRef> {
        self.find_decls(name)
            .into_iter()
            .find(|decl| matches!(&*decl.borrow(), Decl::Enum(_)))
    }
}

fn integer_literal_fits(value: u64, target: &Type) -> bool {
    match target.name() {
        "int8" => value <= i8::MAX as u64,
        "int16" => value <= i16::MAX as u64,
        "int" | "int32" => value <= i32::MAX as u64,
        "int64" => value <= i64::MAX as u64,
        "uint8" => value <= u8::MAX as u64,
        "uint16" => value <= u16::MAX as u64,
        "uint" | "uint32" => value <= u32::MAX as u64,
        "uint64" => true,
        _ => false,
    }
}

fn is_valid_cast(source: &Type, target: &Type) -> bool {
    let source_scalar = source.is_integer() || source.is_floating_point() || source.is_char() || source.is_bool();
    let target_scalar = target.is_integer() || target.is_floating_point() || target.is_char() || target.is_bool();

    (source_scalar && target_scalar)
        || (source.is_pointer() && target.is_pointer())
        || (source.is_integer() && target.is_pointer())
        || (source.is_pointer() && target.is_integer())
        || (source.is_array() && target.is_pointer())
}
