//! AST to IR lowering.
//!
//! Prototypes are memoized by mangled name; scoped resources (destructor
//! calls, deferred expressions) are released on every exit path through a
//! single scope-exit helper.

mod decl;
mod expr;
pub mod mangle;
mod stmt;
mod types;

pub use types::{
    ENUM_PAYLOAD_FIELD_INDEX, ENUM_TAG_FIELD_INDEX, OPTIONAL_HAS_VALUE_FIELD_INDEX,
    OPTIONAL_VALUE_FIELD_INDEX,
};

use crate::error::{CompileError, CompileResult};
use crate::ir::{Block, Inst, IrModule, IrType, Value, ValueId};
use sable_ast::*;
use sable_diagnostics::Span;
use std::collections::HashMap;
use std::rc::Rc;

/// Identity key for an `Rc`-shared declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DeclKey(usize);

pub(crate) fn decl_key(decl: &DeclRef) -> DeclKey {
    DeclKey(Rc::as_ptr(decl) as usize)
}

/// A resource registered in a lexical scope, released in reverse
/// acquisition order on scope exit.
#[derive(Debug, Clone)]
pub(crate) enum ScopeAction {
    /// `defer E`, evaluated on every exit path.
    Defer(Expr),
    /// Destructor call for a scoped value.
    Destructor { pointer: ValueId, dtor: DeclRef },
}

#[derive(Debug, Default)]
pub(crate) struct Scope {
    actions: Vec<ScopeAction>,
}

pub struct IrGenerator<'a> {
    pub module: IrModule,
    pub(crate) registry: &'a ModuleRegistry,
    pub(crate) ast_module: ModuleRef,
    /// Declaration -> local storage (or direct value for `this`).
    pub(crate) locals: HashMap<DeclKey, LocalSlot>,
    pub(crate) globals: HashMap<DeclKey, ValueId>,
    /// Memoized prototypes by mangled name live in `IrModule::functions`;
    /// bodies not yet emitted wait here.
    pub(crate) pending_bodies: Vec<(DeclRef, ValueId)>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) break_targets: Vec<(ValueId, usize)>,
    pub(crate) continue_targets: Vec<(ValueId, usize)>,
    pub(crate) current_function: Option<ValueId>,
    pub(crate) insert_block: Option<ValueId>,
    pub(crate) current_is_main: bool,
    pub(crate) this_value: Option<ValueId>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum LocalSlot {
    /// Pointer to storage; loads and stores go through it.
    Pointer(ValueId),
    /// Direct SSA value (`this`).
    Direct(ValueId),
}

impl<'a> IrGenerator<'a> {
    pub fn new(registry: &'a ModuleRegistry, ast_module: ModuleRef) -> Self {
        let name = ast_module.borrow().name.clone();
        Self {
            module: IrModule::new(name),
            registry,
            ast_module,
            locals: HashMap::new(),
            globals: HashMap::new(),
            pending_bodies: Vec::new(),
            scopes: Vec::new(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            current_function: None,
            insert_block: None,
            current_is_main: false,
            this_value: None,
        }
    }

    /// Emits the whole module: every typed top-level declaration, then the
    /// bodies of everything referenced along the way (method and template
    /// instantiations included).
    pub fn emit_module(mut self) -> CompileResult<IrModule> {
        log::debug!("lowering module `{}` to IR", self.module.name);
        let decls = self.ast_module.borrow().top_level_decls();
        for decl in &decls {
            self.emit_decl(decl)?;
        }

        while let Some((decl, function)) = self.pending_bodies.pop() {
            self.emit_function_body(&decl, function)?;
        }

        Ok(self.module)
    }

    // ==================== Lookup ====================

    pub(crate) fn find_type_decl(&self, qualified_name: &str) -> Option<DeclRef> {
        if let Some(found) = self.ast_module.borrow().find_type_decl(qualified_name) {
            return Some(found);
        }
        let mut imports = self.ast_module.borrow().imports.clone();
        if !self.ast_module.borrow().is_stdlib() {
            imports.push(STDLIB_MODULE_NAME.to_string());
        }
        for import in imports {
            if let Some(imported) = self.registry.get(&import) {
                if let Some(found) = imported.borrow().find_type_decl(qualified_name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// The destructor of a type, if its declaration has one.
    pub(crate) fn type_destructor(&self, ty: &Type) -> Option<DeclRef> {
        if !ty.is_basic() {
            return None;
        }
        let decl = self.find_type_decl(&ty.qualified_name())?;
        let result = match &*decl.borrow() {
            Decl::Type(type_decl) => type_decl.destructor(),
            _ => None,
        };
        result
    }

    // ==================== Blocks & insertion ====================

    pub(crate) fn new_block(&mut self, name: &str) -> ValueId {
        let function = self
            .current_function
            .unwrap_or_else(|| unreachable!("block created outside a function"));
        let block = self.module.push_value(Value::Block(Block {
            name: name.to_string(),
            parent: function,
            insts: Vec::new(),
            parameter: None,
        }));
        self.module.function_mut(function).blocks.push(block);
        block
    }

    /// A block with a parameter acting as a phi node.
    pub(crate) fn new_block_with_parameter(&mut self, name: &str, ty: IrType) -> (ValueId, ValueId) {
        let block = self.new_block(name);
        let parameter = self.module.push_value(Value::Parameter {
            ty,
            name: format!("{}.phi", name),
        });
        self.module.block_mut(block).parameter = Some(parameter);
        (block, parameter)
    }

    pub(crate) fn set_insert_point(&mut self, block: ValueId) {
        self.insert_block = Some(block);
    }

    pub(crate) fn insert(&mut self, inst: Inst) -> ValueId {
        let block = self
            .insert_block
            .unwrap_or_else(|| unreachable!("instruction emitted outside a block"));
        let id = self.module.push_value(Value::Instruction(inst));
        self.module.block_mut(block).insts.push(id);
        id
    }

    pub(crate) fn current_block_is_terminated(&self) -> bool {
        let Some(block) = self.insert_block else {
            return true;
        };
        self.module
            .block(block)
            .insts
            .last()
            .map(|inst| match self.module.value(*inst) {
                Value::Instruction(inst) => inst.is_terminator(),
                _ => false,
            })
            .unwrap_or(false)
    }

    // ==================== Constants ====================

    pub(crate) fn constant_int(&mut self, ty: IrType, value: i128) -> ValueId {
        self.module.push_value(Value::ConstantInt { ty, value })
    }

    pub(crate) fn constant_bool(&mut self, value: bool) -> ValueId {
        self.module.push_value(Value::ConstantBool(value))
    }

    pub(crate) fn undefined(&mut self, ty: IrType) -> ValueId {
        self.module.push_value(Value::Undefined { ty })
    }

    // ==================== Scopes ====================

    pub(crate) fn begin_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Registers a destructor call for a value acquired in the current
    /// scope.
    pub(crate) fn defer_destructor_call(&mut self, pointer: ValueId, dtor: DeclRef) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.actions.push(ScopeAction::Destructor { pointer, dtor });
        }
    }

    pub(crate) fn defer_evaluation_of(&mut self, expr: Expr) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.actions.push(ScopeAction::Defer(expr));
        }
    }

    /// Emits one scope's release actions (deferred expressions and
    /// destructor calls) in reverse acquisition order.
    fn emit_scope_actions(&mut self, index: usize) -> CompileResult<()> {
        let actions = self.scopes[index].actions.clone();
        for action in actions.into_iter().rev() {
            match action {
                ScopeAction::Defer(expr) => {
                    self.emit_expr(&expr)?;
                }
                ScopeAction::Destructor { pointer, dtor } => {
                    let function = self.get_function_proto(&dtor)?;
                    self.insert(Inst::Call {
                        function,
                        args: vec![pointer],
                        name: "deinit".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Leaves the innermost scope: if the current block is still open, its
    /// release actions run here; either way the scope is gone.
    pub(crate) fn end_scope(&mut self) -> CompileResult<()> {
        if !self.current_block_is_terminated() {
            let index = self.scopes.len() - 1;
            self.emit_scope_actions(index)?;
        }
        self.scopes.pop();
        Ok(())
    }

    /// Early exits (`return`, `break`, `continue`) run the release actions
    /// of every scope down to (and excluding) `depth`, without popping:
    /// the scopes stay live for the other paths.
    pub(crate) fn emit_scope_exits_down_to(&mut self, depth: usize) -> CompileResult<()> {
        for index in (depth..self.scopes.len()).rev() {
            self.emit_scope_actions(index)?;
        }
        Ok(())
    }

    pub(crate) fn internal_error(&self, message: impl Into<String>, location: &Span) -> CompileError {
        CompileError::internal(message, location.clone())
    }
}
