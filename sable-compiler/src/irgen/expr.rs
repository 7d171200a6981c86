// Expression emission.

use super::{decl_key, IrGenerator, LocalSlot};
use crate::error::CompileResult;
use crate::ir::{Inst, IrType, Value, ValueId};
use sable_ast::*;

impl IrGenerator<'_> {
    /// Emits an expression as an rvalue.
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => {
                let ty = self.ir_type(&expr.assigned_type());
                Ok(self.constant_int(ty, *value as i128))
            }
            ExprKind::FloatLiteral(value) => {
                let ty = self.ir_type(&expr.assigned_type());
                Ok(self.module.push_value(Value::ConstantFp { ty, value: *value }))
            }
            ExprKind::BoolLiteral(value) => Ok(self.constant_bool(*value)),
            ExprKind::CharacterLiteral(value) => {
                Ok(self.constant_int(IrType::basic("char"), *value as i128))
            }
            ExprKind::StringLiteral(value) => {
                Ok(self.module.push_value(Value::ConstantString(value.clone())))
            }
            ExprKind::NullLiteral => {
                let ty = expr.assigned_type();
                if ty.is_optional() && !ty.remove_optional().is_pointer() {
                    // Non-pointer optional: { undef, false }.
                    self.emit_optional_wrap(None, &ty)
                } else {
                    let ir_ty = self.ir_type(&ty);
                    Ok(self.module.push_value(Value::ConstantNull { ty: ir_ty }))
                }
            }
            ExprKind::UndefinedLiteral => {
                let ty = self.ir_type(&expr.assigned_type());
                Ok(self.undefined(ty))
            }
            ExprKind::This => self.this_value.ok_or_else(|| {
                self.internal_error("`this` outside a method body", &expr.location)
            }),
            ExprKind::Var { .. } => {
                let ty = expr.assigned_type();
                if ty.is_array() {
                    // Arrays have no first-class loads; their storage is
                    // the value.
                    return self.emit_lvalue(expr);
                }
                let pointer_or_value = self.emit_var_slot(expr)?;
                match pointer_or_value {
                    LocalSlot::Direct(value) => Ok(value),
                    LocalSlot::Pointer(pointer) => Ok(self.insert(Inst::Load {
                        pointer,
                        name: var_name(expr),
                    })),
                }
            }
            ExprKind::ArrayLiteral(_) => Err(self.internal_error(
                "array literals are only supported as variable initializers",
                &expr.location,
            )),
            ExprKind::TupleLiteral(elements) => {
                let ty = self.ir_type(&expr.assigned_type());
                let mut aggregate = self.undefined(ty);
                for (index, element) in elements.iter().enumerate() {
                    let value = self.emit_expr(&element.value)?;
                    aggregate = self.insert(Inst::Insert {
                        aggregate,
                        value,
                        index: index as u32,
                        name: "tuple".to_string(),
                    });
                }
                Ok(aggregate)
            }
            ExprKind::Unary { op, operand } => self.emit_unary_expr(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.emit_binary_expr(*op, lhs, rhs),
            ExprKind::Call(call) => self.emit_call_expr(call, expr),
            ExprKind::Member { .. } => self.emit_member_expr(expr),
            ExprKind::Subscript { .. } => {
                let pointer = self.emit_lvalue(expr)?;
                Ok(self.insert(Inst::Load {
                    pointer,
                    name: "subscript".to_string(),
                }))
            }
            ExprKind::Unwrap { operand } => {
                let ty = operand.assigned_type();
                let value = self.emit_expr(operand)?;
                if ty.is_optional() && !ty.remove_optional().is_pointer() {
                    Ok(self.insert(Inst::Extract {
                        aggregate: value,
                        index: super::OPTIONAL_VALUE_FIELD_INDEX,
                        name: "unwrap".to_string(),
                    }))
                } else {
                    Ok(value)
                }
            }
            ExprKind::Cast { operand, target } => {
                let value = self.emit_expr(operand)?;
                let target = self.ir_type(target);
                Ok(self.insert(Inst::Cast {
                    value,
                    target,
                    name: "cast".to_string(),
                }))
            }
            ExprKind::Sizeof { ty } => {
                let ty = self.ir_type(ty);
                Ok(self.insert(Inst::Sizeof {
                    ty,
                    name: "sizeof".to_string(),
                }))
            }
            ExprKind::ImplicitCast {
                operand,
                conversion,
            } => self.emit_implicit_cast(operand, *conversion, expr),
        }
    }

    /// Emits an expression as a pointer to storage.
    pub(crate) fn emit_lvalue(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        match &expr.kind {
            ExprKind::Var { .. } => {
                let slot = self.emit_var_slot(expr)?;
                match slot {
                    LocalSlot::Pointer(pointer) => Ok(pointer),
                    LocalSlot::Direct(value) => Ok(value),
                }
            }
            ExprKind::This => self.this_value.ok_or_else(|| {
                self.internal_error("`this` outside a method body", &expr.location)
            }),
            ExprKind::Member { base, member, .. } => {
                let base_ty = base.assigned_type();
                let pointer = if base_ty.is_pointer() {
                    self.emit_expr(base)?
                } else {
                    self.emit_lvalue(base)?
                };
                let stripped = base_ty.remove_pointer();
                let index = self.field_index(&stripped, member, expr)?;
                Ok(self.insert(Inst::ConstGep {
                    pointer,
                    index,
                    name: member.clone(),
                }))
            }
            ExprKind::Subscript { base, index } => {
                let base_ty = base.assigned_type();
                let index_value = self.emit_expr(index)?;
                if base_ty.remove_pointer().is_array() {
                    let pointer = if base_ty.is_pointer() {
                        self.emit_expr(base)?
                    } else {
                        self.emit_lvalue(base)?
                    };
                    let zero = self.constant_int(IrType::basic("int32"), 0);
                    Ok(self.insert(Inst::Gep {
                        pointer,
                        indexes: vec![zero, index_value],
                        name: "subscript.ptr".to_string(),
                    }))
                } else {
                    // Pointer arithmetic.
                    let pointer = self.emit_expr(base)?;
                    Ok(self.insert(Inst::Gep {
                        pointer,
                        indexes: vec![index_value],
                        name: "subscript.ptr".to_string(),
                    }))
                }
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => self.emit_expr(operand),
            _ => Err(self.internal_error(
                "expression does not denote storage",
                &expr.location,
            )),
        }
    }

    /// An addressable view of an expression: lvalues yield their storage,
    /// rvalues are spilled into a temporary.
    pub(crate) fn emit_addressable(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        if expr.is_lvalue() {
            let ty = expr.assigned_type();
            if ty.is_pointer() {
                // A pointer value already addresses the object.
                return self.emit_expr(expr);
            }
            return self.emit_lvalue(expr);
        }

        let value = self.emit_expr(expr)?;
        let allocated = self.module.type_of(value);
        let slot = self.insert(Inst::Alloca {
            allocated,
            name: "tmp".to_string(),
        });
        self.insert(Inst::Store {
            value,
            pointer: slot,
        });
        Ok(slot)
    }

    fn emit_var_slot(&mut self, expr: &Expr) -> CompileResult<LocalSlot> {
        let decl = match &expr.kind {
            ExprKind::Var { decl: Some(decl), .. } => decl.clone(),
            _ => {
                return Err(self.internal_error(
                    "unresolved identifier survived typechecking",
                    &expr.location,
                ))
            }
        };

        if let Some(slot) = self.locals.get(&decl_key(&decl)) {
            return Ok(*slot);
        }

        // Globals and functions resolve lazily.
        let kind = {
            let borrowed = decl.borrow();
            match &*borrowed {
                Decl::Var(var) if var.is_global => 0,
                Decl::Function(_) => 1,
                _ => 2,
            }
        };
        match kind {
            0 => {
                let global = self.emit_global_var(&decl)?;
                Ok(LocalSlot::Pointer(global))
            }
            1 => {
                let function = self.get_function_proto(&decl)?;
                Ok(LocalSlot::Direct(function))
            }
            _ => Err(self.internal_error(
                "identifier has no storage",
                &expr.location,
            )),
        }
    }

    fn field_index(&mut self, ty: &Type, member: &str, expr: &Expr) -> CompileResult<u32> {
        let decl = self.find_type_decl(&ty.qualified_name()).ok_or_else(|| {
            self.internal_error(
                format!("unknown type `{:#}` in member access", ty),
                &expr.location,
            )
        })?;
        let index = match &*decl.borrow() {
            Decl::Type(type_decl) => type_decl.field_index(member),
            _ => None,
        };
        index.map(|index| index as u32).ok_or_else(|| {
            self.internal_error(
                format!("unknown field `{}` on `{:#}`", member, ty),
                &expr.location,
            )
        })
    }

    fn emit_member_expr(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        // Enum case references produce their tag (or a tagged struct for
        // sum-typed enums).
        if let ExprKind::Member { decl: Some(decl), .. } = &expr.kind {
            let tag = match &*decl.borrow() {
                Decl::EnumCase(case) => Some(case.tag_value),
                _ => None,
            };
            if let Some(tag) = tag {
                return self.emit_enum_value(&expr.assigned_type(), tag, None);
            }
        }

        let pointer = self.emit_lvalue(expr)?;
        Ok(self.insert(Inst::Load {
            pointer,
            name: "member".to_string(),
        }))
    }

    fn emit_unary_expr(&mut self, op: UnaryOp, operand: &Expr) -> CompileResult<ValueId> {
        match op {
            UnaryOp::Deref => {
                let pointer = self.emit_expr(operand)?;
                Ok(self.insert(Inst::Load {
                    pointer,
                    name: "deref".to_string(),
                }))
            }
            UnaryOp::AddressOf => self.emit_lvalue(operand),
            UnaryOp::Not => {
                let value = self.emit_condition(operand)?;
                Ok(self.insert(Inst::Unary {
                    op: UnaryOp::Not,
                    operand: value,
                    name: "not".to_string(),
                }))
            }
            UnaryOp::Negate | UnaryOp::BitwiseNot => {
                let value = self.emit_expr(operand)?;
                Ok(self.insert(Inst::Unary {
                    op,
                    operand: value,
                    name: "unary".to_string(),
                }))
            }
        }
    }

    fn emit_binary_expr(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<ValueId> {
        if op.is_logical() {
            return self.emit_short_circuit(op, lhs, rhs);
        }

        let left = self.emit_expr(lhs)?;
        let right = self.emit_expr(rhs)?;
        Ok(self.insert(Inst::Binary {
            op,
            left,
            right,
            name: "binop".to_string(),
        }))
    }

    /// `&&` / `||` via a block parameter acting as the merge phi.
    fn emit_short_circuit(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<ValueId> {
        let lhs_value = self.emit_condition(lhs)?;

        let rhs_block = self.new_block("logical.rhs");
        let short_block = self.new_block("logical.short");
        let (end_block, parameter) =
            self.new_block_with_parameter("logical.end", IrType::bool_());

        match op {
            BinaryOp::LogicalAnd => {
                self.insert(Inst::CondBranch {
                    condition: lhs_value,
                    true_block: rhs_block,
                    false_block: short_block,
                });
            }
            _ => {
                self.insert(Inst::CondBranch {
                    condition: lhs_value,
                    true_block: short_block,
                    false_block: rhs_block,
                });
            }
        }

        self.set_insert_point(short_block);
        let short_value = self.constant_bool(op != BinaryOp::LogicalAnd);
        self.insert(Inst::Branch {
            destination: end_block,
            argument: Some(short_value),
        });

        self.set_insert_point(rhs_block);
        let rhs_value = self.emit_condition(rhs)?;
        self.insert(Inst::Branch {
            destination: end_block,
            argument: Some(rhs_value),
        });

        self.set_insert_point(end_block);
        Ok(parameter)
    }

    /// Conditions of pointer type become null comparisons; optional
    /// non-pointer conditions extract the discriminator field.
    pub(crate) fn emit_condition(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        let ty = expr.assigned_type();
        let value = self.emit_expr(expr)?;

        if ty.is_pointer() || (ty.is_optional() && ty.remove_optional().is_pointer()) {
            let ir_ty = self.module.type_of(value);
            let null = self.module.push_value(Value::ConstantNull { ty: ir_ty });
            return Ok(self.insert(Inst::Binary {
                op: BinaryOp::NotEqual,
                left: value,
                right: null,
                name: "nullcheck".to_string(),
            }));
        }
        if ty.is_optional() {
            return Ok(self.insert(Inst::Extract {
                aggregate: value,
                index: super::OPTIONAL_HAS_VALUE_FIELD_INDEX,
                name: "hasvalue".to_string(),
            }));
        }
        Ok(value)
    }

    fn emit_call_expr(&mut self, call: &CallExpr, expr: &Expr) -> CompileResult<ValueId> {
        let callee_decl = call.callee_decl.clone().ok_or_else(|| {
            self.internal_error("unresolved call survived typechecking", &expr.location)
        })?;

        // Enum-case construction.
        let case_tag = match &*callee_decl.borrow() {
            Decl::EnumCase(case) => Some(case.tag_value),
            _ => None,
        };
        if let Some(tag) = case_tag {
            let payload = call.args.first().map(|arg| &arg.value);
            return self.emit_enum_value(&expr.assigned_type(), tag, payload);
        }

        let kind = match &*callee_decl.borrow() {
            Decl::Function(f) => f.kind,
            _ => {
                return Err(self.internal_error(
                    "call target is not a function",
                    &expr.location,
                ))
            }
        };

        let function = self.get_function_proto(&callee_decl)?;

        let mut args = Vec::with_capacity(call.args.len() + 1);

        match kind {
            FunctionKind::Constructor => {
                // The caller allocates; the constructor initializes
                // through `this`.
                let ty = self.ir_type(&expr.assigned_type());
                let slot = self.insert(Inst::Alloca {
                    allocated: ty,
                    name: "construct".to_string(),
                });
                args.push(slot);
                for arg in &call.args {
                    args.push(self.emit_expr(&arg.value)?);
                }
                self.insert(Inst::Call {
                    function,
                    args,
                    name: "init".to_string(),
                });
                return Ok(self.insert(Inst::Load {
                    pointer: slot,
                    name: "construct.load".to_string(),
                }));
            }
            FunctionKind::Method | FunctionKind::Destructor => {
                let receiver = match &call.callee.kind {
                    ExprKind::Member { base, .. } => base,
                    _ => {
                        return Err(self.internal_error(
                            "method call without a receiver",
                            &expr.location,
                        ))
                    }
                };
                args.push(self.emit_addressable(receiver)?);
            }
            FunctionKind::Free => {}
        }

        for arg in &call.args {
            args.push(self.emit_expr(&arg.value)?);
        }

        Ok(self.insert(Inst::Call {
            function,
            args,
            name: "call".to_string(),
        }))
    }

    /// Builds an enum value: plain enums are their tag; sum-typed enums are
    /// `{ tag, payload }` built in a temporary.
    fn emit_enum_value(
        &mut self,
        enum_ty: &Type,
        tag: i64,
        payload: Option<&Expr>,
    ) -> CompileResult<ValueId> {
        let decl = self.find_type_decl(&enum_ty.qualified_name());
        let is_sum = decl
            .as_ref()
            .map(|decl| self.enum_is_sum_type(decl))
            .unwrap_or(false);

        if !is_sum {
            return Ok(self.constant_int(IrType::basic("int32"), tag as i128));
        }

        let ir_ty = self.ir_type(enum_ty);
        let slot = self.insert(Inst::Alloca {
            allocated: ir_ty,
            name: "enum".to_string(),
        });
        let tag_pointer = self.insert(Inst::ConstGep {
            pointer: slot,
            index: super::ENUM_TAG_FIELD_INDEX,
            name: "tag".to_string(),
        });
        let tag_value = self.constant_int(IrType::basic("int32"), tag as i128);
        self.insert(Inst::Store {
            value: tag_value,
            pointer: tag_pointer,
        });

        if let Some(payload) = payload {
            let value = self.emit_expr(payload)?;
            let payload_ty = self.module.type_of(value).pointer_to();
            let payload_pointer = self.insert(Inst::ConstGep {
                pointer: slot,
                index: super::ENUM_PAYLOAD_FIELD_INDEX,
                name: "payload".to_string(),
            });
            let typed_pointer = self.insert(Inst::Cast {
                value: payload_pointer,
                target: payload_ty,
                name: "payload.cast".to_string(),
            });
            self.insert(Inst::Store {
                value,
                pointer: typed_pointer,
            });
        }

        Ok(self.insert(Inst::Load {
            pointer: slot,
            name: "enum.load".to_string(),
        }))
    }

    /// `{ value, hasValue }` for non-pointer optionals. `None` builds the
    /// empty optional.
    fn emit_optional_wrap(
        &mut self,
        value: Option<ValueId>,
        optional_ty: &Type,
    ) -> CompileResult<ValueId> {
        let ir_ty = self.ir_type(optional_ty);
        let mut aggregate = self.undefined(ir_ty);
        if let Some(value) = value {
            aggregate = self.insert(Inst::Insert {
                aggregate,
                value,
                index: super::OPTIONAL_VALUE_FIELD_INDEX,
                name: "optional.value".to_string(),
            });
        }
        let has_value = self.constant_bool(value.is_some());
        Ok(self.insert(Inst::Insert {
            aggregate,
            value: has_value,
            index: super::OPTIONAL_HAS_VALUE_FIELD_INDEX,
            name: "optional.hasvalue".to_string(),
        }))
    }

    fn emit_implicit_cast(
        &mut self,
        operand: &Expr,
        conversion: ConversionKind,
        expr: &Expr,
    ) -> CompileResult<ValueId> {
        let target_ty = expr.assigned_type();
        match conversion {
            ConversionKind::OptionalWrap => {
                if target_ty.remove_optional().is_pointer() {
                    // Optional pointers are represented as the pointer.
                    return self.emit_expr(operand);
                }
                let value = self.emit_expr(operand)?;
                self.emit_optional_wrap(Some(value), &target_ty)
            }
            ConversionKind::PointerToOptional => {
                if target_ty.remove_optional().is_pointer() {
                    return self.emit_expr(operand);
                }
                // Null-checked wrap: branch on the pointer, merge the two
                // optional values through a block parameter.
                let pointer = self.emit_expr(operand)?;
                let ir_pointer_ty = self.module.type_of(pointer);
                let null = self
                    .module
                    .push_value(Value::ConstantNull { ty: ir_pointer_ty });
                let is_nonnull = self.insert(Inst::Binary {
                    op: BinaryOp::NotEqual,
                    left: pointer,
                    right: null,
                    name: "nullcheck".to_string(),
                });

                let some_block = self.new_block("optional.some");
                let none_block = self.new_block("optional.none");
                let optional_ir_ty = self.ir_type(&target_ty);
                let (end_block, parameter) =
                    self.new_block_with_parameter("optional.end", optional_ir_ty);

                self.insert(Inst::CondBranch {
                    condition: is_nonnull,
                    true_block: some_block,
                    false_block: none_block,
                });

                self.set_insert_point(some_block);
                let loaded = self.insert(Inst::Load {
                    pointer,
                    name: "optional.load".to_string(),
                });
                let some_value = self.emit_optional_wrap(Some(loaded), &target_ty)?;
                self.insert(Inst::Branch {
                    destination: end_block,
                    argument: Some(some_value),
                });

                self.set_insert_point(none_block);
                let none_value = self.emit_optional_wrap(None, &target_ty)?;
                self.insert(Inst::Branch {
                    destination: end_block,
                    argument: Some(none_value),
                });

                self.set_insert_point(end_block);
                Ok(parameter)
            }
            ConversionKind::IntegerWiden | ConversionKind::FloatWiden => {
                let value = self.emit_expr(operand)?;
                let target = self.ir_type(&target_ty);
                Ok(self.insert(Inst::Cast {
                    value,
                    target,
                    name: "widen".to_string(),
                }))
            }
            ConversionKind::ArrayToPointer => {
                let pointer = self.emit_lvalue(operand)?;
                let zero = self.constant_int(IrType::basic("int32"), 0);
                let zero2 = self.constant_int(IrType::basic("int32"), 0);
                Ok(self.insert(Inst::Gep {
                    pointer,
                    indexes: vec![zero, zero2],
                    name: "decay".to_string(),
                }))
            }
            ConversionKind::Copy => self.emit_expr(operand),
        }
    }

    /// Constant initializers for globals.
    pub(crate) fn emit_constant_expr(&mut self, expr: &Expr) -> CompileResult<ValueId> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => {
                let ty = self.ir_type(&expr.assigned_type());
                Ok(self.constant_int(ty, *value as i128))
            }
            ExprKind::FloatLiteral(value) => {
                let ty = self.ir_type(&expr.assigned_type());
                Ok(self.module.push_value(Value::ConstantFp { ty, value: *value }))
            }
            ExprKind::BoolLiteral(value) => Ok(self.constant_bool(*value)),
            ExprKind::CharacterLiteral(value) => {
                Ok(self.constant_int(IrType::basic("char"), *value as i128))
            }
            ExprKind::StringLiteral(value) => {
                Ok(self.module.push_value(Value::ConstantString(value.clone())))
            }
            ExprKind::NullLiteral => {
                let ty = self.ir_type(&expr.assigned_type());
                Ok(self.module.push_value(Value::ConstantNull { ty }))
            }
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => match &operand.kind {
                ExprKind::IntLiteral(value) => {
                    let ty = self.ir_type(&operand.assigned_type());
                    Ok(self.constant_int(ty, -(*value as i128)))
                }
                ExprKind::FloatLiteral(value) => {
                    let ty = self.ir_type(&operand.assigned_type());
                    Ok(self
                        .module
                        .push_value(Value::ConstantFp { ty, value: -*value }))
                }
                _ => Err(self.internal_error(
                    "global initializers must be constants",
                    &expr.location,
                )),
            },
            _ => Err(self.internal_error(
                "global initializers must be constants",
                &expr.location,
            )),
        }
    }
}

fn var_name(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Var { name, .. } => name.clone(),
        _ => "load".to_string(),
    }
}
