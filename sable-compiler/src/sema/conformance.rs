// Interface conformance checking.

use super::Typechecker;
use crate::error::{CompileError, CompileResult};
use sable_ast::*;
use sable_diagnostics::{error_codes, Span};

impl Typechecker<'_> {
    /// Checks a declared conformance (`struct S: I`), naming the first
    /// missing requirement on failure.
    pub(crate) fn check_conformance(
        &mut self,
        type_decl: &DeclRef,
        interface: &Type,
        location: &Span,
    ) -> CompileResult<()> {
        // `Copyable` is a marker; conformance is the declaration itself.
        let interface_decl = self.resolve_type_decl(interface, location)?.ok_or_else(|| {
            CompileError::error(
                error_codes::UNDEFINED_IDENTIFIER,
                format!("undefined interface `{:#}`", interface),
                location.clone(),
            )
        })?;

        let is_interface = matches!(
            &*interface_decl.borrow(),
            Decl::Type(decl) if decl.is_interface()
        );
        if !is_interface {
            return Err(CompileError::error(
                error_codes::TYPE_MISMATCH,
                format!("`{:#}` is not an interface", interface),
                location.clone(),
            ));
        }

        let (type_name, missing) = {
            let type_borrowed = type_decl.borrow();
            let interface_borrowed = interface_decl.borrow();
            match (&*type_borrowed, &*interface_borrowed) {
                (Decl::Type(ty), Decl::Type(iface)) => {
                    (ty.name.clone(), first_missing_requirement(ty, iface))
                }
                _ => return Ok(()),
            }
        };

        if let Some(requirement) = missing {
            return Err(CompileError::error(
                error_codes::MISSING_INTERFACE_REQUIREMENT,
                format!(
                    "type `{}` does not conform to `{:#}`: missing requirement `{}`",
                    type_name, interface, requirement
                ),
                location.clone(),
            ));
        }
        Ok(())
    }

    /// Constraint checking: builtin scalars satisfy only `Copyable`;
    /// declared types satisfy the interfaces they declare.
    pub(crate) fn type_satisfies_interface(&mut self, ty: &Type, interface_name: &str) -> bool {
        if ty.is_builtin_scalar() {
            return interface_name == "Copyable";
        }
        if ty.is_pointer() {
            return interface_name == "Copyable";
        }
        let decl = match self.resolve_type_decl(ty, &ty.location) {
            Ok(Some(decl)) => decl,
            _ => return false,
        };
        let result = match &*decl.borrow() {
            Decl::Type(type_decl) => type_decl.conforms_to(interface_name),
            Decl::Enum(_) => interface_name == "Copyable",
            _ => false,
        };
        result
    }
}

/// A type provides an interface when every method requirement has a
/// matching method (invariant parameters, matching return type, same
/// mutability). Returns the first missing requirement's name.
fn first_missing_requirement(type_decl: &TypeDecl, interface: &TypeDecl) -> Option<String> {
    for requirement in &interface.methods {
        let requirement = requirement.borrow();
        let required = match &*requirement {
            Decl::Function(function) => function,
            _ => continue,
        };

        let satisfied = type_decl.methods.iter().any(|method| {
            let method = method.borrow();
            match &*method {
                Decl::Function(function) => {
                    function.proto.name == required.proto.name
                        && function.mutating == required.mutating
                        && signature_satisfies(function, required)
                }
                _ => false,
            }
        });

        if !satisfied {
            return Some(required.proto.name.clone());
        }
    }
    None
}

fn signature_satisfies(method: &FunctionDecl, required: &FunctionDecl) -> bool {
    let method_params = method.proto.param_types();
    let required_params = required.proto.param_types();
    if method_params.len() != required_params.len() {
        return false;
    }
    // Parameters are invariant; returns must agree as well (covariance
    // collapses to equality in a language without subtyping).
    method_params
        .iter()
        .zip(required_params.iter())
        .all(|(a, b)| a.equals_ignore_top_level_mutable(b))
        && method
            .return_type()
            .equals_ignore_top_level_mutable(required.return_type())
}
