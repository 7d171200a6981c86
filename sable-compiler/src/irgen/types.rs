// AST types to IR types. Named struct and union bodies are registered on
// the IR module so recursive types stay finite.

use super::IrGenerator;
use crate::ir::IrType;
use sable_ast::*;

/// Field index of the payload value in a non-pointer optional.
pub const OPTIONAL_VALUE_FIELD_INDEX: u32 = 0;
/// Field index of the discriminator in a non-pointer optional.
pub const OPTIONAL_HAS_VALUE_FIELD_INDEX: u32 = 1;

/// Field index of the tag in a lowered sum-typed enum.
pub const ENUM_TAG_FIELD_INDEX: u32 = 0;
/// Field index of the payload union in a lowered sum-typed enum.
pub const ENUM_PAYLOAD_FIELD_INDEX: u32 = 1;

impl IrGenerator<'_> {
    pub(crate) fn ir_type(&mut self, ty: &Type) -> IrType {
        match ty.base() {
            TypeBase::Basic { name, .. } => {
                if ty.is_builtin_scalar() || ty.is_void() {
                    return IrType::Basic(name.clone());
                }
                if ty.is_null() || ty.is_undefined() {
                    return IrType::basic("void").pointer_to();
                }
                self.ir_type_for_named(ty)
            }
            TypeBase::Pointer { pointee } => self.ir_type(pointee).pointer_to(),
            TypeBase::Optional { wrapped } => {
                if wrapped.is_pointer() {
                    // Optional pointers are plain pointers; null is none.
                    self.ir_type(wrapped)
                } else {
                    let value = self.ir_type(wrapped);
                    IrType::Struct {
                        fields: vec![value, IrType::bool_()],
                    }
                }
            }
            TypeBase::Array { element, size } => match size {
                ArraySize::Constant(size) => IrType::Array {
                    element: Box::new(self.ir_type(element)),
                    size: *size as u32,
                },
                _ => self.ir_type(element).pointer_to(),
            },
            TypeBase::Tuple { elements } => IrType::Struct {
                fields: elements.iter().map(|e| self.ir_type(&e.ty)).collect(),
            },
            TypeBase::Function {
                return_type,
                param_types,
                is_variadic,
            } => IrType::Function {
                return_type: Box::new(self.ir_type(return_type)),
                param_types: param_types.iter().map(|p| self.ir_type(p)).collect(),
                is_variadic: *is_variadic,
            },
        }
    }

    fn ir_type_for_named(&mut self, ty: &Type) -> IrType {
        let qualified = ty.qualified_name();
        let Some(decl) = self.find_type_decl(&qualified) else {
            // Unresolved named type slipping past the typechecker is a
            // compiler bug; poison the output rather than crash here.
            return IrType::basic("void").pointer_to();
        };

        enum Named {
            Struct(Vec<FieldDecl>, String),
            PlainEnum,
            SumEnum(Vec<(String, Option<Type>)>, String),
        }

        let named = {
            let borrowed = decl.borrow();
            match &*borrowed {
                Decl::Type(type_decl) => {
                    Named::Struct(type_decl.fields.clone(), mangled_type_name(&qualified))
                }
                Decl::Enum(enum_decl) => {
                    if enum_decl.has_associated_values() {
                        let cases = enum_decl
                            .cases
                            .iter()
                            .filter_map(|case| match &*case.borrow() {
                                Decl::EnumCase(c) => {
                                    Some((c.name.clone(), c.associated_type.clone()))
                                }
                                _ => None,
                            })
                            .collect();
                        Named::SumEnum(cases, mangled_type_name(&qualified))
                    } else {
                        Named::PlainEnum
                    }
                }
                _ => Named::PlainEnum,
            }
        };

        match named {
            Named::PlainEnum => IrType::basic("int32"),
            Named::Struct(fields, name) => {
                let result = IrType::NamedStruct { name: name.clone() };
                if self.module.struct_body(&name).is_none() {
                    // Reserve the name first so recursive fields terminate.
                    self.module.register_struct_body(&name, false, Vec::new());
                    let lowered: Vec<IrType> =
                        fields.iter().map(|field| self.ir_type(&field.ty)).collect();
                    self.module.overwrite_struct_body(&name, false, lowered);
                }
                result
            }
            Named::SumEnum(cases, name) => {
                let payload_name = format!("{}.payload", name);
                let result = IrType::NamedStruct { name: name.clone() };
                if self.module.struct_body(&name).is_none() {
                    self.module.register_struct_body(&name, false, Vec::new());
                    let payload_fields: Vec<IrType> = cases
                        .iter()
                        .filter_map(|(_, ty)| ty.as_ref())
                        .map(|ty| self.ir_type(ty))
                        .collect();
                    self.module
                        .register_struct_body(&payload_name, true, payload_fields);
                    self.module.overwrite_struct_body(
                        &name,
                        false,
                        vec![
                            IrType::basic("int32"),
                            IrType::Union { name: payload_name },
                        ],
                    );
                }
                result
            }
        }
    }

    /// A sum-typed enum lowers to `{ tag, payload-union }`; a plain enum is
    /// just its tag.
    pub(crate) fn enum_is_sum_type(&self, decl: &DeclRef) -> bool {
        matches!(&*decl.borrow(), Decl::Enum(e) if e.has_associated_values())
    }
}

pub(crate) fn mangled_type_name(qualified: &str) -> String {
    qualified
        .chars()
        .map(|c| match c {
            '<' | '>' | ',' | ' ' => '.',
            other => other,
        })
        .collect()
}
