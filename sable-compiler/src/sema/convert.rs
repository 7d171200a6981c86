// Implicit conversions and copyability.

use super::Typechecker;
use crate::error::{CompileError, CompileResult};
use sable_ast::*;
use sable_diagnostics::error_codes;

/// Type agreement up to top-level mutability, with the usual pointer rule:
/// `T*` converts to `const T*`, never the reverse.
pub(crate) fn types_match(source: &Type, target: &Type) -> bool {
    if source.equals_ignore_top_level_mutable(target) {
        return true;
    }
    if let (Some(source_pointee), Some(target_pointee)) = (source.pointee(), target.pointee()) {
        return source_pointee.equals_ignore_top_level_mutable(target_pointee)
            && source_pointee.is_mutable()
            && !target_pointee.is_mutable();
    }
    false
}

impl Typechecker<'_> {
    /// `Some(None)`: already matches. `Some(Some(kind))`: convertible with
    /// an inserted implicit cast. `None`: requires an explicit cast.
    pub(crate) fn conversion_kind(
        &mut self,
        source: &Type,
        target: &Type,
    ) -> Option<Option<ConversionKind>> {
        if types_match(source, target) {
            return Some(None);
        }

        if let Some(wrapped) = target.wrapped_type() {
            if types_match(source, wrapped) {
                return Some(Some(ConversionKind::OptionalWrap));
            }
            if let Some(pointee) = source.pointee() {
                if types_match(pointee, wrapped) {
                    return Some(Some(ConversionKind::PointerToOptional));
                }
            }
        }

        // Lossless numeric widenings.
        if source.is_integer() && target.is_integer() {
            let source_width = source.integer_bit_width()?;
            let target_width = target.integer_bit_width()?;
            let same_signedness = source.is_signed_integer() == target.is_signed_integer();
            let unsigned_into_wider_signed =
                source.is_unsigned_integer() && target.is_signed_integer();
            if target_width > source_width && (same_signedness || unsigned_into_wider_signed) {
                return Some(Some(ConversionKind::IntegerWiden));
            }
        }
        if (source.is_float32() || source.is_float()) && target.is_float64() {
            return Some(Some(ConversionKind::FloatWiden));
        }

        // Array-to-pointer decay.
        if let (Some(element), Some(pointee)) = (source.element_type(), target.pointee()) {
            if types_match(element, pointee) {
                return Some(Some(ConversionKind::ArrayToPointer));
            }
        }

        None
    }

    /// Converts `expr` (of type `source`) to `target`, wrapping it in an
    /// implicit cast in place, or reports a type mismatch.
    pub(crate) fn convert_or_error(
        &mut self,
        expr: &mut Expr,
        source: &Type,
        target: &Type,
    ) -> CompileResult<Type> {
        match self.conversion_kind(source, target) {
            Some(None) => Ok(target.clone()),
            Some(Some(kind)) => {
                expr.wrap_in_implicit_cast(kind, target.clone());
                Ok(target.clone())
            }
            None => Err(CompileError::error(
                error_codes::TYPE_MISMATCH,
                format!("mismatched types: expected `{}`, found `{}`", target, source),
                expr.location.clone(),
            )),
        }
    }

    /// Structure plus declared `Copyable` conformance of basic-type
    /// declarations.
    pub(crate) fn is_implicitly_copyable(&mut self, ty: &Type) -> bool {
        match ty.base() {
            TypeBase::Pointer { .. } | TypeBase::Function { .. } => true,
            TypeBase::Optional { wrapped } => self.is_implicitly_copyable(wrapped),
            TypeBase::Array { .. } => false,
            TypeBase::Tuple { elements } => {
                let elements = elements.clone();
                elements
                    .iter()
                    .all(|element| self.is_implicitly_copyable(&element.ty))
            }
            TypeBase::Basic { .. } => {
                if ty.is_builtin_scalar() || ty.is_null() || ty.is_undefined() || ty.is_void() {
                    return true;
                }
                let decl = match self.resolve_type_decl(ty, &ty.location) {
                    Ok(Some(decl)) => decl,
                    _ => return false,
                };
                let result = match &*decl.borrow() {
                    Decl::Enum(_) => true,
                    Decl::Type(type_decl) => {
                        type_decl.is_union() || type_decl.conforms_to("Copyable")
                    }
                    _ => false,
                };
                result
            }
        }
    }

    /// Conditions may be booleans, pointers (lowered to null comparisons),
    /// or optionals (lowered to a discriminant check).
    pub(crate) fn typecheck_condition(&mut self, expr: &mut Expr) -> CompileResult<()> {
        let ty = self.typecheck_expr(expr, false, None)?;
        if ty.is_bool() || ty.is_pointer() || ty.is_optional() {
            Ok(())
        } else {
            Err(CompileError::error(
                error_codes::TYPE_MISMATCH,
                format!("expected a boolean condition, found `{}`", ty),
                expr.location.clone(),
            ))
        }
    }
}
