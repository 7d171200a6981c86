// Call checking: candidate collection, overload resolution, generic
// argument inference, constructors, and enum-case construction.

use super::Typechecker;
use crate::error::{CompileError, CompileResult};
use sable_ast::*;
use sable_diagnostics::{error_codes, Span};
use std::collections::HashMap;

/// A viable candidate with its lexicographic ranking key: arity and named
/// arguments already matched, so only the implicit-conversion count
/// discriminates.
struct Candidate {
    decl: DeclRef,
    conversions: usize,
}

impl Typechecker<'_> {
    pub(crate) fn typecheck_call_expr(
        &mut self,
        expr: &mut Expr,
        expected: Option<&Type>,
    ) -> CompileResult<Type> {
        let location = expr.location.clone();

        // Pull the call apart; the callee is reinstalled at the end.
        let mut call = match std::mem::replace(&mut expr.kind, ExprKind::NullLiteral) {
            ExprKind::Call(call) => call,
            _ => unreachable!("typecheck_call_expr on a non-call expression"),
        };

        let result = self.typecheck_call(&mut call, expected, &location);
        expr.kind = ExprKind::Call(call);
        result
    }

    fn typecheck_call(
        &mut self,
        call: &mut CallExpr,
        expected: Option<&Type>,
        location: &Span,
    ) -> CompileResult<Type> {
        // Enum-case construction: `Shape.circle(radius)`.
        if let ExprKind::Member { base, member, .. } = &mut call.callee.kind {
            if let ExprKind::Var { name, .. } = &base.kind {
                let name = name.clone();
                let member = member.clone();
                if let Some(enum_decl) = self.find_enum_decl(&name) {
                    return self.typecheck_enum_case_call(call, &enum_decl, &member, location);
                }
            }
        }

        // Preliminary argument types steer candidate selection; null
        // literals stay unresolved until a parameter type is known.
        let mut arg_types = Vec::with_capacity(call.args.len());
        for arg in &mut call.args {
            if arg.value.is_null_literal() {
                arg_types.push(Type::null(arg.value.location.clone()));
            } else {
                arg_types.push(self.typecheck_expr(&mut arg.value, false, None)?);
            }
        }

        let (candidates, callee_name, receiver_ty) =
            self.find_callee_candidates(call, location)?;

        let chosen = self.resolve_overload(
            &candidates,
            call,
            &arg_types,
            expected,
            &callee_name,
            location,
        )?;

        // Bind arguments to the chosen parameter list.
        let (params, return_type, kind, receiver_decl) = {
            let borrowed = chosen.borrow();
            match &*borrowed {
                Decl::Function(function) => (
                    function.proto.param_decls(),
                    function.return_type().clone(),
                    function.kind,
                    function.receiver_type_decl(),
                ),
                Decl::EnumCase(_) => unreachable!("enum case handled earlier"),
                _ => {
                    return Err(CompileError::internal(
                        "overload resolution chose a non-function".to_string(),
                        location.clone(),
                    ))
                }
            }
        };

        for (i, arg) in call.args.iter_mut().enumerate() {
            let Some(param) = params.get(i) else {
                // Variadic tail: C promotion rules are the backend's
                // concern; any value goes through unchanged.
                if arg.value.is_null_literal() {
                    let expected = Type::char_(arg.value.location.clone()).pointer_to();
                    self.typecheck_expr(&mut arg.value, false, Some(&expected))?;
                }
                continue;
            };
            let arg_ty = self.typecheck_expr(&mut arg.value, false, Some(&param.ty))?;
            let converted = self.convert_or_error(&mut arg.value, &arg_ty, &param.ty)?;
            self.track_argument_move(arg, &converted, &param.ty)?;
        }

        // A method call needs its receiver recorded for IR generation.
        if kind != FunctionKind::Free {
            let receiver = receiver_ty.or_else(|| {
                receiver_decl.as_ref().and_then(|decl| match &*decl.borrow() {
                    Decl::Type(type_decl) => Some(type_decl.ty()),
                    _ => None,
                })
            });
            call.receiver_type = receiver;
        }

        call.callee_decl = Some(chosen.clone());

        // Instantiations and forward references are typechecked later.
        if matches!(
            &*chosen.borrow(),
            Decl::Function(f) if f.state == CheckState::Declared
        ) {
            self.decls_to_typecheck.push(chosen.clone());
        }

        if kind == FunctionKind::Constructor {
            let constructed = receiver_decl.as_ref().and_then(|decl| match &*decl.borrow() {
                Decl::Type(type_decl) => Some(type_decl.ty()),
                _ => None,
            });
            return constructed.ok_or_else(|| {
                CompileError::internal("constructor without a type".to_string(), location.clone())
            });
        }

        Ok(return_type)
    }

    fn typecheck_enum_case_call(
        &mut self,
        call: &mut CallExpr,
        enum_decl: &DeclRef,
        case_name: &str,
        location: &Span,
    ) -> CompileResult<Type> {
        let (enum_ty, case) = match &*enum_decl.borrow() {
            Decl::Enum(e) => (e.ty(), e.find_case(case_name)),
            _ => unreachable!("not an enum"),
        };
        let case = case.ok_or_else(|| {
            CompileError::error(
                error_codes::UNDEFINED_IDENTIFIER,
                format!("enum has no case named `{}`", case_name),
                location.clone(),
            )
        })?;

        let associated_type = match &*case.borrow() {
            Decl::EnumCase(case) => case.associated_type.clone(),
            _ => None,
        };
        let associated_type = associated_type.ok_or_else(|| {
            CompileError::error(
                error_codes::NO_MATCHING_CALL,
                format!("enum case `{}` carries no associated value", case_name),
                location.clone(),
            )
        })?;

        if call.args.len() != 1 {
            return Err(CompileError::error(
                error_codes::NO_MATCHING_CALL,
                format!(
                    "enum case `{}` takes 1 associated value, got {}",
                    case_name,
                    call.args.len()
                ),
                location.clone(),
            ));
        }

        let arg = &mut call.args[0];
        let arg_ty = self.typecheck_expr(&mut arg.value, false, Some(&associated_type))?;
        self.convert_or_error(&mut arg.value, &arg_ty, &associated_type)?;

        call.callee_decl = Some(case);
        call.callee.ty = Some(enum_ty.clone());
        Ok(enum_ty)
    }

    /// Candidates for the callee: methods of the receiver for member
    /// callees, otherwise functions, function templates, and constructors
    /// found by name.
    fn find_callee_candidates(
        &mut self,
        call: &mut CallExpr,
        location: &Span,
    ) -> CompileResult<(Vec<DeclRef>, String, Option<Type>)> {
        if let ExprKind::Member { base, member, .. } = &mut call.callee.kind {
            let member = member.clone();
            let base_ty = self.typecheck_expr(base, false, None)?;
            if base_ty.is_optional() {
                return Err(CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    format!("value of type `{}` may be null; unwrap it with `!`", base_ty),
                    location.clone(),
                ));
            }
            let stripped = base_ty.remove_pointer();
            let type_decl = self.resolve_type_decl(&stripped, location)?.ok_or_else(|| {
                CompileError::error(
                    error_codes::TYPE_MISMATCH,
                    format!("type `{}` has no methods", stripped),
                    location.clone(),
                )
            })?;

            let methods = match &*type_decl.borrow() {
                Decl::Type(decl) => decl.find_methods(&member),
                _ => Vec::new(),
            };
            if methods.is_empty() {
                return Err(CompileError::error(
                    error_codes::NO_MATCHING_CALL,
                    format!("type `{:#}` has no method named `{}`", stripped, member),
                    location.clone(),
                ));
            }
            return Ok((methods, member, Some(stripped)));
        }

        let name = match call.callee_name() {
            Some(name) => name.to_string(),
            None => {
                return Err(CompileError::error(
                    error_codes::NO_MATCHING_CALL,
                    "called expression is not callable".to_string(),
                    location.clone(),
                ))
            }
        };

        let found = self.find_decls(&name);
        if found.is_empty() {
            let visible = self.visible_names();
            let mut error = CompileError::error(
                error_codes::UNDEFINED_IDENTIFIER,
                format!("undefined identifier `{}`", name),
                location.clone(),
            );
            if let Some(suggestion) = suggest(&name, &visible) {
                error = error.with_note(format!("did you mean `{}`?", suggestion), Span::unknown());
            }
            return Err(error);
        }

        let mut candidates = Vec::new();
        for decl in found {
            let class = {
                let borrowed = decl.borrow();
                match &*borrowed {
                    Decl::Function(_) | Decl::FunctionTemplate(_) => 0,
                    Decl::Type(_) => 1,
                    Decl::TypeTemplate(_) => 2,
                    _ => 3,
                }
            };
            match class {
                0 => candidates.push(decl),
                1 => {
                    let ctors = match &*decl.borrow() {
                        Decl::Type(type_decl) => type_decl.constructors(),
                        _ => Vec::new(),
                    };
                    candidates.extend(ctors);
                }
                2 => {
                    // Generic type constructor: instantiate the type first,
                    // from explicit arguments or by inference against the
                    // constructor parameters.
                    let instantiation =
                        self.instantiate_type_for_call(&decl, call, location)?;
                    let ctors = match &*instantiation.borrow() {
                        Decl::Type(type_decl) => type_decl.constructors(),
                        _ => Vec::new(),
                    };
                    candidates.extend(ctors);
                }
                _ => {}
            }
        }

        Ok((candidates, name, None))
    }

    fn instantiate_type_for_call(
        &mut self,
        template: &DeclRef,
        call: &mut CallExpr,
        location: &Span,
    ) -> CompileResult<DeclRef> {
        if !call.generic_args.is_empty() {
            let generic_args = call.generic_args.clone();
            for arg in &generic_args {
                self.typecheck_type(arg, location)?;
            }
            // The generic arguments belong to the type; the constructor
            // itself is not generic.
            call.generic_args.clear();
            return self.instantiate_type_template(template, &generic_args, location);
        }

        // Infer from constructor parameters.
        let (generic_params, ctors) = match &*template.borrow() {
            Decl::TypeTemplate(t) => {
                let ctors = match &*t.type_decl.borrow() {
                    Decl::Type(type_decl) => type_decl.constructors(),
                    _ => Vec::new(),
                };
                (t.generic_params.clone(), ctors)
            }
            _ => {
                return Err(CompileError::internal(
                    "expected a type template".to_string(),
                    location.clone(),
                ))
            }
        };

        let mut arg_types = Vec::new();
        for arg in &mut call.args {
            if arg.value.is_null_literal() {
                arg_types.push(Type::null(arg.value.location.clone()));
            } else {
                arg_types.push(self.typecheck_expr(&mut arg.value, false, None)?);
            }
        }

        for ctor in ctors {
            let params = match &*ctor.borrow() {
                Decl::Function(f) => f.proto.param_types(),
                _ => continue,
            };
            if params.len() != arg_types.len() {
                continue;
            }
            if let Ok(inferred) =
                self.infer_generic_args(&generic_params, &params, &arg_types, None, None, location)
            {
                return self.instantiate_type_template(template, &inferred, location);
            }
        }

        Err(CompileError::error(
            error_codes::INFERENCE_FAILED,
            "could not infer generic arguments for constructor call".to_string(),
            location.clone(),
        ))
    }

    /// Ranks candidates by (arity match, named-argument match, implicit
    /// conversions), lexicographically; the winner must be strictly better
    /// than every other viable candidate.
    fn resolve_overload(
        &mut self,
        candidates: &[DeclRef],
        call: &mut CallExpr,
        arg_types: &[Type],
        expected: Option<&Type>,
        callee_name: &str,
        location: &Span,
    ) -> CompileResult<DeclRef> {
        let mut viable: Vec<Candidate> = Vec::new();
        let mut last_failure: Option<CompileError> = None;

        for candidate in candidates {
            match self.evaluate_candidate(candidate, call, arg_types, expected, location) {
                Ok(Some(candidate)) => viable.push(candidate),
                Ok(None) => {}
                Err(error) => last_failure = Some(error),
            }
        }

        if viable.is_empty() {
            if let Some(error) = last_failure {
                return Err(error);
            }
            let arg_list: Vec<String> = arg_types.iter().map(|t| format!("{:#}", t)).collect();
            return Err(CompileError::error(
                error_codes::NO_MATCHING_CALL,
                format!(
                    "no matching call to `{}` with arguments ({})",
                    callee_name,
                    arg_list.join(", ")
                ),
                location.clone(),
            ));
        }

        let best = viable
            .iter()
            .map(|candidate| candidate.conversions)
            .min()
            .unwrap_or(0);
        let mut winners = viable
            .into_iter()
            .filter(|candidate| candidate.conversions == best);

        let winner = match winners.next() {
            Some(winner) => winner,
            None => unreachable!("viable set was non-empty"),
        };

        if let Some(tie) = winners.next() {
            let mut error = CompileError::error(
                error_codes::AMBIGUOUS_CALL,
                format!("ambiguous call to `{}`", callee_name),
                location.clone(),
            );
            error = error.with_note(
                "candidate is here".to_string(),
                winner.decl.borrow().location(),
            );
            error = error.with_note("candidate is here".to_string(), tie.decl.borrow().location());
            return Err(error);
        }

        Ok(winner.decl)
    }

    /// Checks one candidate for viability and counts the conversions its
    /// parameter list requires. Templates are instantiated (explicit
    /// generic arguments first, inference otherwise).
    fn evaluate_candidate(
        &mut self,
        candidate: &DeclRef,
        call: &mut CallExpr,
        arg_types: &[Type],
        expected: Option<&Type>,
        location: &Span,
    ) -> CompileResult<Option<Candidate>> {
        let resolved = {
            let is_template = matches!(&*candidate.borrow(), Decl::FunctionTemplate(_));
            if is_template {
                match self.instantiate_function_for_call(
                    candidate, call, arg_types, expected, location,
                )? {
                    Some(instantiation) => instantiation,
                    None => return Ok(None),
                }
            } else {
                if !call.generic_args.is_empty() {
                    // Explicit generic arguments never match a
                    // non-generic function.
                    return Ok(None);
                }
                candidate.clone()
            }
        };

        let (params, is_variadic) = match &*resolved.borrow() {
            Decl::Function(function) => {
                (function.proto.param_decls(), function.proto.is_variadic)
            }
            _ => return Ok(None),
        };

        // (1) arity
        let arity_matches = if is_variadic {
            arg_types.len() >= params.len()
        } else {
            arg_types.len() == params.len()
        };
        if !arity_matches {
            return Ok(None);
        }

        // (2) named arguments are positional, with checked names
        for (arg, param) in call.args.iter().zip(params.iter()) {
            if let Some(name) = &arg.name {
                if name != &param.name {
                    return Ok(None);
                }
            }
        }

        // (3) conversion count
        let mut conversions = 0;
        for (arg_ty, param) in arg_types.iter().zip(params.iter()) {
            if arg_ty.is_null() {
                if param.ty.is_optional() || param.ty.is_pointer() {
                    conversions += 1;
                    continue;
                }
                return Ok(None);
            }
            match self.conversion_kind(arg_ty, &param.ty) {
                Some(None) => {}
                Some(Some(_)) => conversions += 1,
                None => return Ok(None),
            }
        }

        Ok(Some(Candidate {
            decl: resolved,
            conversions,
        }))
    }

    fn instantiate_function_for_call(
        &mut self,
        template: &DeclRef,
        call: &mut CallExpr,
        arg_types: &[Type],
        expected: Option<&Type>,
        location: &Span,
    ) -> CompileResult<Option<DeclRef>> {
        let (generic_params, param_skeletons, return_skeleton) = match &*template.borrow() {
            Decl::FunctionTemplate(t) => match &*t.function_decl.borrow() {
                Decl::Function(f) => (
                    t.generic_params.clone(),
                    f.proto.param_types(),
                    f.return_type().clone(),
                ),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        let generic_args = if !call.generic_args.is_empty() {
            if call.generic_args.len() != generic_params.len() {
                return Err(CompileError::error(
                    error_codes::GENERIC_ARG_COUNT,
                    format!(
                        "wrong number of generic arguments: expected {}, got {}",
                        generic_params.len(),
                        call.generic_args.len()
                    ),
                    location.clone(),
                ));
            }
            for arg in &call.generic_args {
                self.typecheck_type(arg, location)?;
            }
            call.generic_args.clone()
        } else {
            match self.infer_generic_args(
                &generic_params,
                &param_skeletons,
                arg_types,
                Some(&return_skeleton),
                expected,
                location,
            ) {
                Ok(inferred) => inferred,
                Err(_) => return Ok(None),
            }
        };

        self.check_instantiation_depth(&generic_args, location)?;
        self.check_constraints(&generic_params, &generic_args, location)?;
        self.enter_instantiation(location)?;

        let instantiation = match &mut *template.borrow_mut() {
            Decl::FunctionTemplate(t) => t.instantiate(&generic_args),
            _ => unreachable!("checked above"),
        };
        self.instantiation_depth -= 1;

        Ok(Some(instantiation))
    }

    /// Walks parameter-type skeletons alongside argument types collecting
    /// bindings; contradictions fail inference, and a parameter with no
    /// binding falls back to the expected return type.
    pub(crate) fn infer_generic_args(
        &mut self,
        generic_params: &[GenericParamDecl],
        param_skeletons: &[Type],
        arg_types: &[Type],
        return_skeleton: Option<&Type>,
        expected: Option<&Type>,
        location: &Span,
    ) -> CompileResult<Vec<Type>> {
        let names: Vec<&str> = generic_params.iter().map(|p| p.name.as_str()).collect();
        let mut bindings: HashMap<String, Type> = HashMap::new();

        for (skeleton, arg) in param_skeletons.iter().zip(arg_types.iter()) {
            collect_bindings(skeleton, arg, &names, &mut bindings).map_err(|_| {
                CompileError::error(
                    error_codes::INFERENCE_FAILED,
                    "conflicting generic argument deduction".to_string(),
                    location.clone(),
                )
            })?;
        }

        if bindings.len() < names.len() {
            if let (Some(skeleton), Some(expected)) = (return_skeleton, expected) {
                let _ = collect_bindings(skeleton, expected, &names, &mut bindings);
            }
        }

        let mut result = Vec::with_capacity(names.len());
        for param in generic_params {
            match bindings.get(&param.name) {
                Some(ty) => result.push(ty.clone()),
                None => {
                    return Err(CompileError::error(
                        error_codes::INFERENCE_FAILED,
                        format!("could not infer generic argument `{}`", param.name),
                        location.clone(),
                    ))
                }
            }
        }
        Ok(result)
    }

    fn track_argument_move(
        &mut self,
        arg: &mut NamedArg,
        arg_ty: &Type,
        param_ty: &Type,
    ) -> CompileResult<()> {
        if param_ty.is_pointer() {
            return Ok(());
        }

        if self.is_implicitly_copyable(arg_ty) {
            // Copyable aggregates get an explicit copy; scalars are copied
            // by the load itself.
            if arg_ty.is_basic() && !arg_ty.is_builtin_scalar() && !arg_ty.is_null() {
                let ty = arg.value.assigned_type();
                arg.value.wrap_in_implicit_cast(ConversionKind::Copy, ty);
            }
            return Ok(());
        }

        // Consuming call of a non-copyable value: the source binding is
        // dead until reassigned.
        if let ExprKind::Var {
            decl: Some(decl), ..
        } = &arg.value.kind
        {
            decl.borrow_mut().set_moved(true);
        }
        Ok(())
    }
}

fn suggest(name: &str, visible: &[String]) -> Option<String> {
    sable_diagnostics::suggest_name(name, visible.iter().map(String::as_str))
}

enum BindError {
    Conflict,
}

fn collect_bindings(
    skeleton: &Type,
    actual: &Type,
    names: &[&str],
    bindings: &mut HashMap<String, Type>,
) -> Result<(), BindError> {
    match (skeleton.base(), actual.base()) {
        (TypeBase::Basic { name, generic_args }, _)
            if generic_args.is_empty() && names.contains(&name.as_str()) =>
        {
            let bound = actual.with_mutability(Mutability::Mutable);
            if let Some(existing) = bindings.get(name) {
                if !existing.equals_ignore_top_level_mutable(&bound) {
                    return Err(BindError::Conflict);
                }
            } else {
                bindings.insert(name.clone(), bound);
            }
            Ok(())
        }
        (
            TypeBase::Basic {
                name: skeleton_name,
                generic_args: skeleton_args,
            },
            TypeBase::Basic {
                name: actual_name,
                generic_args: actual_args,
            },
        ) if skeleton_name == actual_name && skeleton_args.len() == actual_args.len() => {
            for (s, a) in skeleton_args.iter().zip(actual_args.iter()) {
                collect_bindings(s, a, names, bindings)?;
            }
            Ok(())
        }
        (TypeBase::Pointer { pointee: s }, TypeBase::Pointer { pointee: a }) => {
            collect_bindings(s, a, names, bindings)
        }
        (TypeBase::Optional { wrapped: s }, TypeBase::Optional { wrapped: a }) => {
            collect_bindings(s, a, names, bindings)
        }
        // `T?` parameter matched against a non-optional argument: deduce
        // through the wrap the implicit conversion will insert.
        (TypeBase::Optional { wrapped: s }, _) => collect_bindings(s, actual, names, bindings),
        (TypeBase::Array { element: s, .. }, TypeBase::Array { element: a, .. }) => {
            collect_bindings(s, a, names, bindings)
        }
        (TypeBase::Tuple { elements: s }, TypeBase::Tuple { elements: a })
            if s.len() == a.len() =>
        {
            for (s, a) in s.iter().zip(a.iter()) {
                collect_bindings(&s.ty, &a.ty, names, bindings)?;
            }
            Ok(())
        }
        (
            TypeBase::Function {
                return_type: s_ret,
                param_types: s_params,
                ..
            },
            TypeBase::Function {
                return_type: a_ret,
                param_types: a_params,
                ..
            },
        ) if s_params.len() == a_params.len() => {
            collect_bindings(s_ret, a_ret, names, bindings)?;
            for (s, a) in s_params.iter().zip(a_params.iter()) {
                collect_bindings(s, a, names, bindings)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

impl Typechecker<'_> {
    pub(crate) fn check_constraints(
        &mut self,
        generic_params: &[GenericParamDecl],
        generic_args: &[Type],
        location: &Span,
    ) -> CompileResult<()> {
        for (param, arg) in generic_params.iter().zip(generic_args.iter()) {
            for constraint in &param.constraints {
                if !self.type_satisfies_interface(arg, constraint) {
                    return Err(CompileError::error(
                        error_codes::CONSTRAINT_NOT_SATISFIED,
                        format!(
                            "type `{:#}` does not satisfy the `{}` constraint on `{}`",
                            arg, constraint, param.name
                        ),
                        location.clone(),
                    ));
                }
            }
        }
        Ok(())
    }
}
