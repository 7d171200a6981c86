// Statement emission. `while` and `for-in` never reach this pass; the
// typechecker lowers both into the canonical `for` form.

use super::{decl_key, IrGenerator, LocalSlot};
use crate::error::CompileResult;
use crate::ir::{Inst, IrType, ValueId};
use sable_ast::*;

impl IrGenerator<'_> {
    pub(crate) fn emit_stmts(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.emit_stmt(stmt)?;
            // Nothing after a jump in the same list is reachable.
            if matches!(
                stmt.kind,
                StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue
            ) {
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Return(value) => self.emit_return_stmt(value.as_ref()),
            StmtKind::Var(decl) => self.emit_local_var(decl).map(|_| ()),
            StmtKind::Expr(expr) => self.emit_expr(expr).map(|_| ()),
            StmtKind::Increment(expr) => self.emit_increment(expr, BinaryOp::Add),
            StmtKind::Decrement(expr) => self.emit_increment(expr, BinaryOp::Sub),
            StmtKind::Defer(expr) => {
                self.defer_evaluation_of(expr.clone());
                Ok(())
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => self.emit_if_stmt(condition, then_body, else_body),
            StmtKind::Switch {
                condition,
                cases,
                default_body,
            } => self.emit_switch_stmt(condition, cases, default_body),
            StmtKind::For {
                variable,
                condition,
                increment,
                body,
            } => self.emit_for_stmt(
                variable.as_ref(),
                condition.as_ref(),
                increment.as_deref(),
                body,
            ),
            StmtKind::Break => {
                let (target, depth) = match self.break_targets.last() {
                    Some(entry) => *entry,
                    None => {
                        return Err(
                            self.internal_error("break outside a loop", &stmt.location)
                        )
                    }
                };
                self.emit_scope_exits_down_to(depth)?;
                self.insert(Inst::Branch {
                    destination: target,
                    argument: None,
                });
                Ok(())
            }
            StmtKind::Continue => {
                let (target, depth) = match self.continue_targets.last() {
                    Some(entry) => *entry,
                    None => {
                        return Err(
                            self.internal_error("continue outside a loop", &stmt.location)
                        )
                    }
                };
                self.emit_scope_exits_down_to(depth)?;
                self.insert(Inst::Branch {
                    destination: target,
                    argument: None,
                });
                Ok(())
            }
            StmtKind::Compound(body) => {
                self.begin_scope();
                self.emit_stmts(body)?;
                self.end_scope()
            }
            StmtKind::Assign { target, value } => {
                // Subexpressions run left to right: target storage first.
                let pointer = self.emit_lvalue(target)?;
                let value = self.emit_expr(value)?;
                self.insert(Inst::Store { value, pointer });
                Ok(())
            }
            StmtKind::While { .. } | StmtKind::ForEach { .. } => Err(self.internal_error(
                "loop should have been lowered into a for statement",
                &stmt.location,
            )),
        }
    }

    /// Deferred expressions and destructor calls run after the return
    /// value is computed but before the return instruction: the value may
    /// reference storage those runs reclaim.
    fn emit_return_stmt(&mut self, value: Option<&Expr>) -> CompileResult<()> {
        let return_value = match value {
            Some(value) => Some(self.emit_expr(value)?),
            None => {
                if self.current_is_main {
                    Some(self.constant_int(IrType::basic("int"), 0))
                } else {
                    None
                }
            }
        };

        self.emit_scope_exits_down_to(0)?;
        self.insert(Inst::Return {
            value: return_value,
        });
        Ok(())
    }

    pub(crate) fn emit_local_var(&mut self, decl: &DeclRef) -> CompileResult<ValueId> {
        let (name, ty, initializer, location) = {
            let borrowed = decl.borrow();
            let var = match &*borrowed {
                Decl::Var(var) => var,
                other => {
                    return Err(self.internal_error("not a variable", &other.location()))
                }
            };
            (
                var.name.clone(),
                var.ty.clone(),
                var.initializer.clone(),
                var.location.clone(),
            )
        };

        let ty = ty.ok_or_else(|| self.internal_error("untyped local variable", &location))?;
        let allocated = self.ir_type(&ty);
        let slot = self.insert(Inst::Alloca {
            allocated,
            name: name.clone(),
        });

        match &initializer {
            Some(Expr {
                kind: ExprKind::ArrayLiteral(elements),
                ..
            }) => {
                // Element-wise stores; arrays have no first-class loads.
                for (index, element) in elements.iter().enumerate() {
                    let value = self.emit_expr(element)?;
                    let zero = self.constant_int(IrType::basic("int32"), 0);
                    let offset = self.constant_int(IrType::basic("int32"), index as i128);
                    let pointer = self.insert(Inst::Gep {
                        pointer: slot,
                        indexes: vec![zero, offset],
                        name: format!("{}.{}", name, index),
                    });
                    self.insert(Inst::Store { value, pointer });
                }
            }
            Some(init) => {
                let value = self.emit_expr(init)?;
                self.insert(Inst::Store {
                    value,
                    pointer: slot,
                });
            }
            // `undefined` initializer: storage stays uninitialized.
            None => {}
        }

        self.locals.insert(decl_key(decl), LocalSlot::Pointer(slot));

        if let Some(dtor) = self.type_destructor(&ty) {
            self.defer_destructor_call(slot, dtor);
        }

        Ok(slot)
    }

    fn emit_increment(&mut self, expr: &Expr, op: BinaryOp) -> CompileResult<()> {
        let pointer = self.emit_lvalue(expr)?;
        let value = self.insert(Inst::Load {
            pointer,
            name: "inc.load".to_string(),
        });
        let ty = self.module.type_of(value);
        let one = self.constant_int(ty, 1);
        let result = self.insert(Inst::Binary {
            op,
            left: value,
            right: one,
            name: "inc".to_string(),
        });
        self.insert(Inst::Store {
            value: result,
            pointer,
        });
        Ok(())
    }

    /// Emits a body into the current block, closing with a branch to
    /// `continuation` unless the body already terminated.
    fn emit_block(&mut self, stmts: &[Stmt], continuation: ValueId) -> CompileResult<()> {
        self.begin_scope();
        self.emit_stmts(stmts)?;
        self.end_scope()?;

        if !self.current_block_is_terminated() {
            self.insert(Inst::Branch {
                destination: continuation,
                argument: None,
            });
        }
        Ok(())
    }

    fn emit_if_stmt(
        &mut self,
        condition: &Expr,
        then_body: &[Stmt],
        else_body: &[Stmt],
    ) -> CompileResult<()> {
        let condition = self.emit_condition(condition)?;

        let then_block = self.new_block("if.then");
        let else_block = self.new_block("if.else");
        let end_block = self.new_block("if.end");
        self.insert(Inst::CondBranch {
            condition,
            true_block: then_block,
            false_block: else_block,
        });

        self.set_insert_point(then_block);
        self.emit_block(then_body, end_block)?;

        self.set_insert_point(else_block);
        self.emit_block(else_body, end_block)?;

        self.set_insert_point(end_block);
        Ok(())
    }

    fn emit_for_stmt(
        &mut self,
        variable: Option<&DeclRef>,
        condition: Option<&Expr>,
        increment: Option<&Stmt>,
        body: &[Stmt],
    ) -> CompileResult<()> {
        // The loop variable lives in its own scope so its destructor runs
        // after the loop.
        self.begin_scope();
        if let Some(variable) = variable {
            self.emit_local_var(variable)?;
        }

        let condition_block = self.new_block("loop.condition");
        let body_block = self.new_block("loop.body");
        let after_body = if increment.is_some() {
            self.new_block("loop.increment")
        } else {
            condition_block
        };
        let end_block = self.new_block("loop.end");

        self.break_targets.push((end_block, self.scopes.len()));
        self.continue_targets.push((after_body, self.scopes.len()));

        self.insert(Inst::Branch {
            destination: condition_block,
            argument: None,
        });

        self.set_insert_point(condition_block);
        let condition_value = match condition {
            Some(condition) => self.emit_condition(condition)?,
            None => self.constant_bool(true),
        };
        self.insert(Inst::CondBranch {
            condition: condition_value,
            true_block: body_block,
            false_block: end_block,
        });

        self.set_insert_point(body_block);
        self.emit_block(body, after_body)?;

        if let Some(increment) = increment {
            self.set_insert_point(after_body);
            self.emit_stmt(increment)?;
            self.insert(Inst::Branch {
                destination: condition_block,
                argument: None,
            });
        }

        self.break_targets.pop();
        self.continue_targets.pop();

        self.set_insert_point(end_block);
        self.end_scope()
    }

    /// Switch dispatch. A sum-typed condition contributes its tag; cases
    /// bind associated values by casting the payload pointer.
    fn emit_switch_stmt(
        &mut self,
        condition: &Expr,
        cases: &[SwitchCase],
        default_body: &[Stmt],
    ) -> CompileResult<()> {
        let (condition_value, enum_payload) = self.emit_expr_or_enum_tag(condition)?;

        let mut case_blocks = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            let value = self.emit_case_value(&case.value)?;
            let block = self.new_block(&format!("switch.case.{}", index));
            case_blocks.push((value, block));
        }

        let default_block = self.new_block("switch.default");
        let end_block = self.new_block("switch.end");
        self.break_targets.push((end_block, self.scopes.len()));

        self.insert(Inst::Switch {
            condition: condition_value,
            default_block,
            cases: case_blocks.clone(),
        });

        for (case, (_, block)) in cases.iter().zip(case_blocks.iter()) {
            self.set_insert_point(*block);
            self.begin_scope();

            if let Some(binding) = &case.associated_value {
                let payload = enum_payload.ok_or_else(|| {
                    self.internal_error(
                        "associated-value binding without a sum-typed condition",
                        &case.value.location,
                    )
                })?;
                let binding_ty = match &*binding.borrow() {
                    Decl::Var(var) => var.ty.clone(),
                    _ => None,
                };
                let binding_ty = binding_ty.ok_or_else(|| {
                    self.internal_error("untyped case binding", &case.value.location)
                })?;
                let target = self.ir_type(&binding_ty).pointer_to();
                let payload_pointer = self.insert(Inst::ConstGep {
                    pointer: payload,
                    index: super::ENUM_PAYLOAD_FIELD_INDEX,
                    name: "payload".to_string(),
                });
                let typed_pointer = self.insert(Inst::Cast {
                    value: payload_pointer,
                    target,
                    name: binding.borrow().name(),
                });
                self.locals
                    .insert(decl_key(binding), LocalSlot::Pointer(typed_pointer));
            }

            self.emit_stmts(&case.body)?;
            self.end_scope()?;
            if !self.current_block_is_terminated() {
                self.insert(Inst::Branch {
                    destination: end_block,
                    argument: None,
                });
            }
        }

        self.set_insert_point(default_block);
        self.emit_block(default_body, end_block)?;

        self.break_targets.pop();
        self.set_insert_point(end_block);
        Ok(())
    }

    /// For sum-typed enum conditions, returns (tag value, pointer to the
    /// whole enum) so case bodies can reach the payload.
    fn emit_expr_or_enum_tag(&mut self, condition: &Expr) -> CompileResult<(ValueId, Option<ValueId>)> {
        let ty = condition.assigned_type();
        let Some(decl) = self.find_type_decl(&ty.qualified_name()) else {
            return Ok((self.emit_expr(condition)?, None));
        };
        if !matches!(&*decl.borrow(), Decl::Enum(_)) {
            return Ok((self.emit_expr(condition)?, None));
        }

        if self.enum_is_sum_type(&decl) {
            let pointer = self.emit_addressable(condition)?;
            let tag_pointer = self.insert(Inst::ConstGep {
                pointer,
                index: super::ENUM_TAG_FIELD_INDEX,
                name: "tag".to_string(),
            });
            let tag = self.insert(Inst::Load {
                pointer: tag_pointer,
                name: "tag.load".to_string(),
            });
            Ok((tag, Some(pointer)))
        } else {
            Ok((self.emit_expr(condition)?, None))
        }
    }

    /// Case labels are either enum cases (their tag constant) or plain
    /// constant expressions.
    fn emit_case_value(&mut self, value: &Expr) -> CompileResult<ValueId> {
        let case_decl = match &value.kind {
            ExprKind::Member { decl: Some(decl), .. } | ExprKind::Var { decl: Some(decl), .. } => {
                match &*decl.borrow() {
                    Decl::EnumCase(case) => Some(case.tag_value),
                    _ => None,
                }
            }
            _ => None,
        };

        match case_decl {
            Some(tag) => Ok(self.constant_int(IrType::basic("int32"), tag as i128)),
            None => self.emit_expr(value),
        }
    }
}
