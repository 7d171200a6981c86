//! Semantic analysis: name resolution, type inference, overload resolution,
//! conformance checking, move tracking, and deferred typechecking of
//! forward-referenced and instantiated declarations.

mod call;
mod conformance;
mod convert;
mod expr;
mod stmt;

use crate::error::{CompileError, CompileResult};
use sable_ast::*;
use sable_diagnostics::{error_codes, DiagnosticEngine, Span};

/// Nesting bound for generic instantiation; past this we assume runaway
/// recursion (e.g. `Box<Box<Box<...>>>` generated by the program itself).
pub(crate) const MAX_GENERIC_DEPTH: usize = 64;

pub struct Typechecker<'a> {
    pub(crate) registry: &'a ModuleRegistry,
    pub(crate) module: ModuleRef,
    pub(crate) diagnostics: &'a mut DiagnosticEngine,
    /// Return type of the function currently being checked.
    pub(crate) function_return_type: Option<Type>,
    /// Receiver type of the method currently being checked.
    pub(crate) receiver_type: Option<Type>,
    pub(crate) current_function_is_main: bool,
    pub(crate) breakable_blocks: usize,
    pub(crate) continuable_blocks: usize,
    pub(crate) foreach_nest_level: usize,
    pub(crate) instantiation_depth: usize,
    /// Forward-referenced declarations found mid-body, drained to a fixed
    /// point by [`Typechecker::post_process`].
    pub(crate) decls_to_typecheck: Vec<DeclRef>,
}

impl<'a> Typechecker<'a> {
    pub fn new(
        registry: &'a ModuleRegistry,
        module: ModuleRef,
        diagnostics: &'a mut DiagnosticEngine,
    ) -> Self {
        Self {
            registry,
            module,
            diagnostics,
            function_return_type: None,
            receiver_type: None,
            current_function_is_main: false,
            breakable_blocks: 0,
            continuable_blocks: 0,
            foreach_nest_level: 0,
            instantiation_depth: 0,
            decls_to_typecheck: Vec::new(),
        }
    }

    /// Typechecks every top-level declaration of the module. An error in
    /// one declaration is reported and does not stop the others.
    pub fn typecheck_module(&mut self) {
        log::debug!("typechecking module `{}`", self.module.borrow().name);
        self.bind_top_level_names();

        let decls = self.module.borrow().top_level_decls();
        for decl in decls {
            if let Err(error) = self.typecheck_decl(&decl) {
                self.report(error);
            }
        }

        self.post_process();
    }

    /// Declared -> NameBound: populate the module's global scope and
    /// resolve imports.
    fn bind_top_level_names(&mut self) {
        let decls = self.module.borrow().top_level_decls();

        for decl in decls {
            let import = match &*decl.borrow() {
                Decl::Import(import) => Some(import.clone()),
                _ => None,
            };

            if let Some(import) = import {
                self.bind_import(&import);
                continue;
            }

            let result = self.module.borrow_mut().add_to_symbol_table(decl.clone());
            if let Err(redefinition) = result {
                let mut error = CompileError::error(
                    error_codes::REDEFINITION,
                    format!("redefinition of `{}`", redefinition.name),
                    decl.borrow().location(),
                );
                for previous in &redefinition.previous {
                    error = error.with_note(
                        "previous definition is here".to_string(),
                        previous.borrow().location(),
                    );
                }
                self.report(error);
            }

            set_state(&decl, CheckState::NameBound);
        }
    }

    fn bind_import(&mut self, import: &ImportDecl) {
        match &import.target {
            ImportTarget::Module(name) => {
                if self.registry.get(name).is_some() {
                    // Idempotent: importing twice binds the same entries.
                    self.module.borrow_mut().add_import(name);
                } else {
                    self.report(CompileError::error(
                        error_codes::UNDEFINED_IDENTIFIER,
                        format!("module `{}` not found", name),
                        import.location.clone(),
                    ));
                }
            }
            ImportTarget::Header(path) => {
                self.report(CompileError::error(
                    error_codes::UNSUPPORTED_IMPORT,
                    format!("C header import `{}` is not supported by this compiler", path),
                    import.location.clone(),
                ));
            }
        }
    }

    /// Drains the deferred-typechecking queue to a fixed point. Cycles of
    /// mutual reference are fine because declarations are lazy-typed and
    /// `Typed` is idempotent.
    pub fn post_process(&mut self) {
        while let Some(decl) = self.decls_to_typecheck.pop() {
            if let Err(error) = self.typecheck_decl(&decl) {
                self.report(error);
            }
        }
    }

    pub(crate) fn report(&mut self, error: CompileError) {
        self.diagnostics.emit(error.into_diagnostic());
    }

    // ==================== Declarations ====================

    pub fn typecheck_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        enum Kind {
            Function,
            Type,
            Enum,
            Var,
            FunctionTemplate,
            TypeTemplate,
            Other,
        }

        let kind = match &*decl.borrow() {
            Decl::Function(_) => Kind::Function,
            Decl::Type(_) => Kind::Type,
            Decl::Enum(_) => Kind::Enum,
            Decl::Var(_) => Kind::Var,
            Decl::FunctionTemplate(_) => Kind::FunctionTemplate,
            Decl::TypeTemplate(_) => Kind::TypeTemplate,
            _ => Kind::Other,
        };

        match kind {
            Kind::Function => self.typecheck_function_decl(decl),
            Kind::Type => self.typecheck_type_decl(decl),
            Kind::Enum => self.typecheck_enum_decl(decl),
            Kind::Var => self.typecheck_var_decl(decl),
            Kind::FunctionTemplate => self.typecheck_function_template(decl),
            Kind::TypeTemplate => self.typecheck_type_template(decl),
            Kind::Other => Ok(()),
        }
    }

    fn typecheck_function_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        let (state, params, return_type, receiver, is_extern, is_main, location) = {
            let borrowed = decl.borrow();
            let function = match &*borrowed {
                Decl::Function(function) => function,
                _ => return Ok(()),
            };
            (
                function.state,
                function.proto.params.clone(),
                function.proto.return_type.clone(),
                function.receiver_type(),
                function.is_extern(),
                function.is_main(),
                function.location.clone(),
            )
        };

        if state == CheckState::Typed {
            return Ok(());
        }
        // Mark before descending so recursive references see a resolved
        // signature instead of re-entering.
        set_state(decl, CheckState::Typed);

        self.typecheck_type(&return_type, &location)?;
        for param in &params {
            let ty = match &*param.borrow() {
                Decl::Param(p) => p.ty.clone(),
                _ => continue,
            };
            self.typecheck_type(&ty, &location)?;
        }

        if is_extern {
            return Ok(());
        }

        let mut body = match &mut *decl.borrow_mut() {
            Decl::Function(function) => match function.body.take() {
                Some(body) => body,
                None => return Ok(()), // interface requirement / prototype
            },
            _ => return Ok(()),
        };

        let previous_return = self.function_return_type.replace(return_type.clone());
        let previous_receiver = std::mem::replace(&mut self.receiver_type, receiver);
        let previous_is_main = std::mem::replace(&mut self.current_function_is_main, is_main);

        self.module.borrow_mut().symbol_table.push_scope();
        for param in &params {
            let name = param.borrow().name();
            self.module.borrow_mut().symbol_table.add(name, param.clone());
        }

        let mut result = Ok(());
        for stmt in &mut body {
            if let Err(error) = self.typecheck_stmt(stmt) {
                result = Err(error);
                break;
            }
        }

        self.module.borrow_mut().symbol_table.pop_scope();
        self.function_return_type = previous_return;
        self.receiver_type = previous_receiver;
        self.current_function_is_main = previous_is_main;

        // Missing return on a non-void path. `main` gets an implicit
        // `return 0`.
        if result.is_ok()
            && !return_type.is_void()
            && !is_main
            && !stmts_always_return(&body)
        {
            result = Err(CompileError::error(
                error_codes::MISSING_RETURN,
                "missing return statement on a non-void path".to_string(),
                location,
            ));
        }

        match &mut *decl.borrow_mut() {
            Decl::Function(function) => function.body = Some(body),
            _ => {}
        }

        result
    }

    fn typecheck_function_template(&mut self, decl: &DeclRef) -> CompileResult<()> {
        let generic_params = match &*decl.borrow() {
            Decl::FunctionTemplate(template) => template.generic_params.clone(),
            _ => return Ok(()),
        };
        self.typecheck_generic_params(&generic_params)
        // The wrapped declaration's body is typechecked per instantiation.
    }

    fn typecheck_type_template(&mut self, decl: &DeclRef) -> CompileResult<()> {
        let generic_params = match &*decl.borrow() {
            Decl::TypeTemplate(template) => template.generic_params.clone(),
            _ => return Ok(()),
        };
        self.typecheck_generic_params(&generic_params)
    }

    fn typecheck_generic_params(
        &mut self,
        generic_params: &[GenericParamDecl],
    ) -> CompileResult<()> {
        for (i, param) in generic_params.iter().enumerate() {
            if generic_params[..i].iter().any(|other| other.name == param.name) {
                return Err(CompileError::error(
                    error_codes::REDEFINITION,
                    format!("redefinition of generic parameter `{}`", param.name),
                    param.location.clone(),
                ));
            }
            for constraint in &param.constraints {
                if self.find_interface_decl(constraint).is_none() {
                    return Err(CompileError::error(
                        error_codes::UNDEFINED_IDENTIFIER,
                        format!("undefined interface `{}` in constraint", constraint),
                        param.location.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn typecheck_type_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        let (state, fields, methods, interfaces, location) = {
            let borrowed = decl.borrow();
            let type_decl = match &*borrowed {
                Decl::Type(type_decl) => type_decl,
                _ => return Ok(()),
            };
            (
                type_decl.state,
                type_decl.fields.clone(),
                type_decl.methods.clone(),
                type_decl.interfaces.clone(),
                type_decl.location.clone(),
            )
        };

        if state == CheckState::Typed {
            return Ok(());
        }
        set_state(decl, CheckState::Typed);

        for field in &fields {
            self.typecheck_type(&field.ty, &field.location)?;
        }

        for interface in &interfaces {
            self.check_conformance(decl, interface, &location)?;
        }

        for method in &methods {
            self.typecheck_decl(method)?;
        }

        Ok(())
    }

    fn typecheck_enum_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        let (state, cases) = match &*decl.borrow() {
            Decl::Enum(enum_decl) => (enum_decl.state, enum_decl.cases.clone()),
            _ => return Ok(()),
        };
        if state == CheckState::Typed {
            return Ok(());
        }
        set_state(decl, CheckState::Typed);

        let mut seen: Vec<String> = Vec::new();
        for case in &cases {
            let (name, associated_type, location) = match &*case.borrow() {
                Decl::EnumCase(case) => (
                    case.name.clone(),
                    case.associated_type.clone(),
                    case.location.clone(),
                ),
                _ => continue,
            };
            if seen.contains(&name) {
                return Err(CompileError::error(
                    error_codes::REDEFINITION,
                    format!("redefinition of enum case `{}`", name),
                    location,
                ));
            }
            if let Some(ty) = associated_type {
                self.typecheck_type(&ty, &location)?;
            }
            seen.push(name);
        }
        Ok(())
    }

    pub(crate) fn typecheck_var_decl(&mut self, decl: &DeclRef) -> CompileResult<()> {
        let (declared_ty, is_const, mut initializer, location, name) = {
            let mut borrowed = decl.borrow_mut();
            let var = match &mut *borrowed {
                Decl::Var(var) => var,
                _ => return Ok(()),
            };
            if var.state == CheckState::Typed {
                return Ok(());
            }
            var.state = CheckState::Typed;
            (
                var.ty.clone(),
                var.is_const,
                var.initializer.take(),
                var.location.clone(),
                var.name.clone(),
            )
        };

        let result = (|| -> CompileResult<Type> {
            if let Some(declared) = &declared_ty {
                self.typecheck_type(declared, &location)?;
                if let Some(init) = initializer.as_mut() {
                    let init_ty = self.typecheck_expr(init, false, Some(declared))?;
                    self.convert_or_error(init, &init_ty, declared)?;
                }
                Ok(declared.clone())
            } else {
                let init = initializer.as_mut().ok_or_else(|| {
                    CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot infer type of `{}` without an initializer", name),
                        location.clone(),
                    )
                })?;
                let inferred = self.typecheck_expr(init, false, None)?;
                if inferred.is_void() {
                    return Err(CompileError::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot bind `{}` to a void value", name),
                        location.clone(),
                    ));
                }
                Ok(inferred)
            }
        })();

        let final_ty = match &result {
            Ok(ty) => {
                let ty = if is_const {
                    ty.with_mutability(Mutability::Const)
                } else {
                    ty.clone()
                };
                Some(ty)
            }
            Err(_) => declared_ty,
        };

        if let Decl::Var(var) = &mut *decl.borrow_mut() {
            var.initializer = initializer;
            var.ty = final_ty;
        }

        result.map(|_| ())
    }

    // ==================== Types ====================

    /// Validates a type annotation: basic-type names must resolve to a
    /// declaration, a builtin, or a bound generic placeholder; generic
    /// references instantiate their template.
    pub(crate) fn typecheck_type(&mut self, ty: &Type, location: &Span) -> CompileResult<()> {
        match ty.base() {
            TypeBase::Basic { name, generic_args } => {
                for arg in generic_args {
                    self.typecheck_type(arg, location)?;
                }
                if ty.is_builtin_scalar()
                    || ty.is_void()
                    || ty.is_null()
                    || ty.is_undefined()
                {
                    return Ok(());
                }
                if self.resolve_type_decl(ty, location)?.is_none() {
                    return Err(CompileError::error(
                        error_codes::UNDEFINED_IDENTIFIER,
                        format!("undefined type `{}`", name),
                        location.clone(),
                    ));
                }
                Ok(())
            }
            TypeBase::Pointer { pointee } => self.typecheck_type(pointee, location),
            TypeBase::Optional { wrapped } => self.typecheck_type(wrapped, location),
            TypeBase::Array { element, .. } => self.typecheck_type(element, location),
            TypeBase::Tuple { elements } => {
                for element in elements {
                    self.typecheck_type(&element.ty, location)?;
                }
                Ok(())
            }
            TypeBase::Function {
                return_type,
                param_types,
                ..
            } => {
                self.typecheck_type(return_type, location)?;
                for param in param_types {
                    self.typecheck_type(param, location)?;
                }
                Ok(())
            }
        }
    }

    /// Resolves a basic type to its (possibly freshly instantiated)
    /// declaration.
    pub(crate) fn resolve_type_decl(
        &mut self,
        ty: &Type,
        location: &Span,
    ) -> CompileResult<Option<DeclRef>> {
        if !ty.is_basic() {
            return Ok(None);
        }
        let name = ty.name().to_string();
        let generic_args = ty.generic_args().to_vec();

        // Already-instantiated types are registered under their qualified
        // name.
        if let Some(found) = self.find_type_decl_by_name(&ty.qualified_name()) {
            return Ok(Some(found));
        }

        let candidates = self.find_decls(&name);
        for candidate in candidates {
            let is_template = matches!(&*candidate.borrow(), Decl::TypeTemplate(_));
            match &*candidate.borrow() {
                Decl::Type(_) | Decl::Enum(_) if generic_args.is_empty() => {
                    return Ok(Some(candidate.clone()));
                }
                Decl::Type(type_decl) if !generic_args.is_empty() => {
                    return Err(CompileError::error(
                        error_codes::GENERIC_ARG_COUNT,
                        format!("type `{}` takes no generic arguments", type_decl.name),
                        location.clone(),
                    ));
                }
                _ => {}
            }
            if is_template {
                let instantiation =
                    self.instantiate_type_template(&candidate, &generic_args, location)?;
                return Ok(Some(instantiation));
            }
        }
        Ok(None)
    }

    /// Memoized template instantiation plus the bookkeeping that makes the
    /// instantiation visible: registered under its qualified name and
    /// queued for deferred typechecking.
    pub(crate) fn instantiate_type_template(
        &mut self,
        template: &DeclRef,
        generic_args: &[Type],
        location: &Span,
    ) -> CompileResult<DeclRef> {
        self.check_instantiation_depth(generic_args, location)?;
        self.enter_instantiation(location)?;

        let (expected, generic_params) = match &*template.borrow() {
            Decl::TypeTemplate(t) => (t.generic_params.len(), t.generic_params.clone()),
            _ => {
                self.instantiation_depth -= 1;
                return Err(CompileError::internal(
                    "instantiating a non-template".to_string(),
                    location.clone(),
                ));
            }
        };

        if generic_args.len() != expected {
            self.instantiation_depth -= 1;
            return Err(CompileError::error(
                error_codes::GENERIC_ARG_COUNT,
                format!(
                    "wrong number of generic arguments: expected {}, got {}",
                    expected,
                    generic_args.len()
                ),
                location.clone(),
            ));
        }

        if let Err(error) = self.check_constraints(&generic_params, generic_args, location) {
            self.instantiation_depth -= 1;
            return Err(error);
        }

        let instantiation = match &mut *template.borrow_mut() {
            Decl::TypeTemplate(t) => t.instantiate(generic_args),
            _ => unreachable!("checked above"),
        };

        // First sight of this instantiation: register and queue it.
        let qualified = match &*instantiation.borrow() {
            Decl::Type(type_decl) => type_decl.qualified_name(),
            _ => String::new(),
        };
        if self.find_type_decl_by_name(&qualified).is_none() {
            let _ = self
                .module
                .borrow_mut()
                .add_to_symbol_table_with_name(instantiation.clone(), &qualified);
            self.decls_to_typecheck.push(instantiation.clone());
        }

        self.instantiation_depth -= 1;
        Ok(instantiation)
    }

    pub(crate) fn enter_instantiation(&mut self, location: &Span) -> CompileResult<()> {
        self.instantiation_depth += 1;
        if self.instantiation_depth > MAX_GENERIC_DEPTH {
            self.instantiation_depth -= 1;
            return Err(CompileError::error(
                error_codes::RECURSIVE_INSTANTIATION,
                "recursive generic instantiation exceeds the depth limit".to_string(),
                location.clone(),
            ));
        }
        Ok(())
    }

    /// Bounds the type nesting an instantiation chain can build up; a
    /// program whose instantiations keep wrapping their own argument
    /// (`f(Box(x))` inside `f<T>`) would otherwise grow the deferred
    /// queue forever.
    pub(crate) fn check_instantiation_depth(
        &self,
        generic_args: &[Type],
        location: &Span,
    ) -> CompileResult<()> {
        for arg in generic_args {
            if type_nesting_depth(arg) > MAX_GENERIC_DEPTH {
                return Err(CompileError::error(
                    error_codes::RECURSIVE_INSTANTIATION,
                    format!("recursively nested generic argument `{:#}`", arg),
                    location.clone(),
                ));
            }
        }
        Ok(())
    }

    // ==================== Lookup ====================

    /// Inner-to-outer lookup in the current module, then in imported
    /// modules (the standard library is always implicitly imported).
    pub(crate) fn find_decls(&self, name: &str) -> Vec<DeclRef> {
        let found = self.module.borrow().symbol_table.find(name);
        if !found.is_empty() {
            return found;
        }

        let mut imports = self.module.borrow().imports.clone();
        if !self.module.borrow().is_stdlib()
            && !imports.iter().any(|import| import == STDLIB_MODULE_NAME)
        {
            imports.push(STDLIB_MODULE_NAME.to_string());
        }

        for import in imports {
            if let Some(imported) = self.registry.get(&import) {
                let found: Vec<DeclRef> = imported
                    .borrow()
                    .symbol_table
                    .find_global(name)
                    .into_iter()
                    .filter(|decl| !is_private(decl))
                    .collect();
                if !found.is_empty() {
                    return found;
                }
            }
        }
        Vec::new()
    }

    pub(crate) fn find_type_decl_by_name(&self, qualified_name: &str) -> Option<DeclRef> {
        if let Some(found) = self.module.borrow().find_type_decl(qualified_name) {
            return Some(found);
        }
        let mut imports = self.module.borrow().imports.clone();
        if !self.module.borrow().is_stdlib() {
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

    pub(crate) fn find_interface_decl(&self, name: &str) -> Option<DeclRef> {
        self.find_decls(name).into_iter().find(|decl| {
            matches!(&*decl.borrow(), Decl::Type(t) if t.is_interface())
                || t_inner_is_interface(decl)
        })
    }

    /// Names visible at global scope, for "did you mean" suggestions.
    pub(crate) fn visible_names(&self) -> Vec<String> {
        let mut names = self.module.borrow().symbol_table.global_names();
        if let Some(stdlib) = self.registry.get(STDLIB_MODULE_NAME) {
            names.extend(stdlib.borrow().symbol_table.global_names());
        }
        names
    }
}

fn t_inner_is_interface(decl: &DeclRef) -> bool {
    match &*decl.borrow() {
        Decl::TypeTemplate(template) => {
            matches!(&*template.type_decl.borrow(), Decl::Type(t) if t.is_interface())
        }
        _ => false,
    }
}

fn is_private(decl: &DeclRef) -> bool {
    match &*decl.borrow() {
        Decl::Function(f) => f.access == AccessLevel::Private,
        Decl::Type(t) => t.access == AccessLevel::Private,
        Decl::Enum(e) => e.access == AccessLevel::Private,
        Decl::Var(v) => v.access == AccessLevel::Private,
        _ => false,
    }
}

pub(crate) fn set_state(decl: &DeclRef, state: CheckState) {
    match &mut *decl.borrow_mut() {
        Decl::Function(f) => f.state = state,
        Decl::Type(t) => t.state = state,
        Decl::Enum(e) => e.state = state,
        Decl::Var(v) => v.state = state,
        _ => {}
    }
}

fn type_nesting_depth(ty: &Type) -> usize {
    match ty.base() {
        TypeBase::Basic { generic_args, .. } => {
            1 + generic_args.iter().map(type_nesting_depth).max().unwrap_or(0)
        }
        TypeBase::Pointer { pointee } => 1 + type_nesting_depth(pointee),
        TypeBase::Optional { wrapped } => 1 + type_nesting_depth(wrapped),
        TypeBase::Array { element, .. } => 1 + type_nesting_depth(element),
        TypeBase::Tuple { elements } => {
            1 + elements
                .iter()
                .map(|element| type_nesting_depth(&element.ty))
                .max()
                .unwrap_or(0)
        }
        TypeBase::Function {
            return_type,
            param_types,
            ..
        } => {
            1 + param_types
                .iter()
                .chain(std::iter::once(return_type))
                .map(type_nesting_depth)
                .max()
                .unwrap_or(0)
        }
    }
}

/// Conservative all-paths-return analysis for the missing-return check.
pub(crate) fn stmts_always_return(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => {
            !else_body.is_empty()
                && stmts_always_return(then_body)
                && stmts_always_return(else_body)
        }
        StmtKind::Switch {
            cases,
            default_body,
            ..
        } => {
            !default_body.is_empty()
                && stmts_always_return(default_body)
                && cases.iter().all(|case| stmts_always_return(&case.body))
        }
        StmtKind::Compound(body) => stmts_always_return(body),
        _ => false,
    }
}
