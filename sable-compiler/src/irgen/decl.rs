// Per-declaration emission: prototypes first (memoized by mangled name),
// bodies after.

use super::mangle::mangle_function_decl;
use super::{decl_key, IrGenerator, LocalSlot};
use crate::error::CompileResult;
use crate::ir::{Inst, IrFunction, IrType, Value, ValueId};
use sable_ast::*;

impl IrGenerator<'_> {
    pub(crate) fn emit_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        enum Kind {
            Function,
            Var,
            Template(Vec<DeclRef>),
            Skip,
        }

        let kind = match &*decl.borrow() {
            Decl::Function(_) => Kind::Function,
            Decl::Var(_) => Kind::Var,
            // Instantiations produced during typechecking are emitted when
            // referenced; a template by itself produces no code.
            Decl::FunctionTemplate(template) => {
                Kind::Template(template.instantiations().cloned().collect())
            }
            Decl::Type(_) | Decl::TypeTemplate(_) | Decl::Enum(_) | Decl::Import(_) => Kind::Skip,
            _ => Kind::Skip,
        };

        match kind {
            Kind::Function => self.emit_function_decl(decl),
            Kind::Var => self.emit_global_var(decl).map(|_| ()),
            Kind::Template(instantiations) => {
                for instantiation in instantiations {
                    self.emit_function_decl(&instantiation)?;
                }
                Ok(())
            }
            Kind::Skip => Ok(()),
        }
    }

    fn emit_function_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        // The prototype getter queues the body; draining happens in
        // emit_module so bodies never nest.
        self.get_function_proto(decl).map(|_| ())
    }

    /// Returns the IR function for a declaration, creating the prototype on
    /// first sight. Repeated emission of the same instantiation returns the
    /// same function.
    pub(crate) fn get_function_proto(&mut self, decl: &DeclRef) -> CompileResult<ValueId> {
        let (mangled, params, return_type, receiver, is_extern, is_variadic, is_main, location, has_body) = {
            let borrowed = decl.borrow();
            let function = match &*borrowed {
                Decl::Function(function) => function,
                other => {
                    return Err(self.internal_error(
                        format!("cannot emit a prototype for `{}`", other.name()),
                        &other.location(),
                    ))
                }
            };
            (
                mangle_function_decl(function),
                function.proto.param_decls(),
                function.return_type().clone(),
                function.receiver_type(),
                function.is_extern(),
                function.proto.is_variadic,
                function.is_main(),
                function.location.clone(),
                function.body.is_some(),
            )
        };

        if let Some(existing) = self.module.find_function(&mangled) {
            return Ok(existing);
        }

        let mut ir_params = Vec::new();
        if let Some(receiver) = &receiver {
            let ty = self.ir_type(receiver).pointer_to();
            ir_params.push(self.module.push_value(Value::Parameter {
                ty,
                name: "this".to_string(),
            }));
        }
        for param in &params {
            let ty = self.ir_type(&param.ty);
            ir_params.push(self.module.push_value(Value::Parameter {
                ty,
                name: param.name.clone(),
            }));
        }

        let return_type = if is_main {
            IrType::basic("int")
        } else {
            self.ir_type(&return_type)
        };

        let function = self.module.push_value(Value::Function(IrFunction {
            mangled_name: mangled,
            return_type,
            params: ir_params,
            blocks: Vec::new(),
            is_extern,
            is_variadic,
            location,
        }));
        self.module.functions.push(function);

        if !is_extern && has_body {
            self.pending_bodies.push((decl.clone(), function));
        }
        Ok(function)
    }

    pub(crate) fn emit_function_body(
        &mut self,
        decl: &DeclRef,
        function: ValueId,
    ) -> CompileResult<()> {
        if !self.module.function(function).blocks.is_empty() {
            return Ok(());
        }

        let (params, body, kind, receiver_decl, is_main) = {
            let borrowed = decl.borrow();
            let f = match &*borrowed {
                Decl::Function(f) => f,
                _ => return Ok(()),
            };
            let body = match &f.body {
                Some(body) => body.clone(),
                None => return Ok(()),
            };
            (
                f.proto.params.clone(),
                body,
                f.kind,
                f.receiver_type_decl(),
                f.is_main(),
            )
        };

        self.locals.clear();
        self.this_value = None;
        self.current_function = Some(function);
        self.current_is_main = is_main;

        let entry = self.new_block("entry");
        self.set_insert_point(entry);
        self.begin_scope();

        let ir_params = self.module.function(function).params.clone();
        let mut ir_params_iter = ir_params.into_iter();

        if receiver_decl.is_some() {
            let this = ir_params_iter.next();
            self.this_value = this;
        }

        // Parameters get stack slots so they are uniformly assignable.
        for param in &params {
            let Some(ir_param) = ir_params_iter.next() else {
                break;
            };
            let (name, ty) = match &*param.borrow() {
                Decl::Param(p) => (p.name.clone(), p.ty.clone()),
                _ => continue,
            };
            let allocated = self.ir_type(&ty);
            let slot = self.insert(Inst::Alloca {
                allocated,
                name: name.clone(),
            });
            self.insert(Inst::Store {
                value: ir_param,
                pointer: slot,
            });
            self.locals.insert(decl_key(param), LocalSlot::Pointer(slot));
        }

        // A destructor tears down the receiver's fields after its own body;
        // registering them first makes them run last, in reverse field
        // order.
        if kind == FunctionKind::Destructor {
            if let Some(receiver) = &receiver_decl {
                let fields = match &*receiver.borrow() {
                    Decl::Type(type_decl) => type_decl.fields.clone(),
                    _ => Vec::new(),
                };
                for (index, field) in fields.iter().enumerate() {
                    let Some(dtor) = self.type_destructor(&field.ty) else {
                        continue;
                    };
                    let this = self.this_value.ok_or_else(|| {
                        self.internal_error("destructor without `this`", &field.location)
                    })?;
                    let pointer = self.insert(Inst::ConstGep {
                        pointer: this,
                        index: index as u32,
                        name: field.name.clone(),
                    });
                    self.defer_destructor_call(pointer, dtor);
                }
            }
        }

        self.emit_stmts(&body)?;

        self.end_scope()?;

        // Blocks without an explicit terminator receive a synthetic return.
        if !self.current_block_is_terminated() {
            if self.current_is_main {
                let zero = self.constant_int(IrType::basic("int"), 0);
                self.insert(Inst::Return { value: Some(zero) });
            } else {
                self.insert(Inst::Return { value: None });
            }
        }

        self.prune_unreachable_blocks(function);

        self.current_function = None;
        self.insert_block = None;
        Ok(())
    }

    /// Global variables become IR globals with constant initializers.
    pub(crate) fn emit_global_var(&mut self, decl: &DeclRef) -> CompileResult<ValueId> {
        if let Some(existing) = self.globals.get(&decl_key(decl)) {
            return Ok(*existing);
        }

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

        let ty = ty.ok_or_else(|| self.internal_error("untyped global", &location))?;
        let ir_ty = self.ir_type(&ty);

        let initializer = match initializer {
            Some(init) => Some(self.emit_constant_expr(&init)?),
            None => None,
        };

        let global = self.module.push_value(Value::Global {
            ty: ir_ty,
            initializer,
            name,
        });
        self.module.globals.push(global);
        self.globals.insert(decl_key(decl), global);
        Ok(global)
    }

    /// Drops blocks that became unreachable (dead continuations after
    /// early returns) so every remaining block is reachable from entry.
    fn prune_unreachable_blocks(&mut self, function: ValueId) {
        loop {
            let blocks = self.module.function(function).blocks.clone();
            let mut removed = false;

            for block in blocks.iter().skip(1) {
                if self.module.predecessors(function, *block).is_empty() {
                    let blocks = &mut self.module.function_mut(function).blocks;
                    blocks.retain(|b| b != block);
                    removed = true;
                    break;
                }
            }

            if !removed {
                break;
            }
        }
    }
}
