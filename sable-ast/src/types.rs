//! The interned structural type representation.
//!
//! Two types compare equal up to mutability iff they share the same interned
//! base, so base identity (`Arc` pointer identity) is a safe hash key for
//! generic-instantiation memoization.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use sable_diagnostics::Span;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    Const,
    Mutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySize {
    /// `T[N]`
    Constant(u64),
    /// `T[?]`, size known only at runtime
    Runtime,
    /// `T[]`, size unknown to the callee
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleElement {
    pub name: Option<String>,
    pub ty: Type,
}

/// Interned payload of a [`Type`] handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeBase {
    Basic {
        name: String,
        generic_args: Vec<Type>,
    },
    Pointer {
        pointee: Type,
    },
    Optional {
        wrapped: Type,
    },
    Array {
        element: Type,
        size: ArraySize,
    },
    Tuple {
        elements: Vec<TupleElement>,
    },
    Function {
        return_type: Type,
        param_types: Vec<Type>,
        is_variadic: bool,
    },
}

struct TypeInterner {
    cache: DashMap<TypeBase, Arc<TypeBase>>,
}

impl TypeInterner {
    fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    fn intern(&self, base: TypeBase) -> Arc<TypeBase> {
        self.cache
            .entry(base.clone())
            .or_insert_with(|| Arc::new(base))
            .clone()
    }
}

static INTERNER: Lazy<TypeInterner> = Lazy::new(TypeInterner::new);

/// A type handle: interned base + top-level mutability + source location.
///
/// Equality and hashing ignore the location; the base is compared by
/// pointer identity, which interning makes equivalent to structural
/// equality.
#[derive(Debug, Clone)]
pub struct Type {
    base: Arc<TypeBase>,
    pub mutability: Mutability,
    pub location: Span,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.base, &other.base) && self.mutability == other.mutability
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.base) as usize).hash(state);
        self.mutability.hash(state);
    }
}

/// Hash/equality key wrapping an interned base by pointer identity.
/// Ordered vectors of these key template instantiations.
#[derive(Debug, Clone)]
pub struct TypeBaseKey(Arc<TypeBase>);

impl PartialEq for TypeBaseKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeBaseKey {}

impl Hash for TypeBaseKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl Type {
    fn get(base: TypeBase, mutability: Mutability, location: Span) -> Type {
        Type {
            base: INTERNER.intern(base),
            mutability,
            location,
        }
    }

    pub fn basic(
        name: impl Into<String>,
        generic_args: Vec<Type>,
        mutability: Mutability,
        location: Span,
    ) -> Type {
        Type::get(
            TypeBase::Basic {
                name: name.into(),
                generic_args,
            },
            mutability,
            location,
        )
    }

    pub fn pointer(pointee: Type, mutability: Mutability, location: Span) -> Type {
        Type::get(TypeBase::Pointer { pointee }, mutability, location)
    }

    pub fn optional(wrapped: Type, mutability: Mutability, location: Span) -> Type {
        Type::get(TypeBase::Optional { wrapped }, mutability, location)
    }

    pub fn array(element: Type, size: ArraySize, mutability: Mutability, location: Span) -> Type {
        Type::get(TypeBase::Array { element, size }, mutability, location)
    }

    pub fn tuple(elements: Vec<TupleElement>, mutability: Mutability, location: Span) -> Type {
        Type::get(TypeBase::Tuple { elements }, mutability, location)
    }

    pub fn function(
        return_type: Type,
        param_types: Vec<Type>,
        is_variadic: bool,
        location: Span,
    ) -> Type {
        Type::get(
            TypeBase::Function {
                return_type,
                param_types,
                is_variadic,
            },
            Mutability::Mutable,
            location,
        )
    }

    pub fn base(&self) -> &TypeBase {
        &self.base
    }

    pub fn base_key(&self) -> TypeBaseKey {
        TypeBaseKey(self.base.clone())
    }

    pub fn equals_ignore_top_level_mutable(&self, other: &Type) -> bool {
        Arc::ptr_eq(&self.base, &other.base)
    }

    pub fn with_mutability(&self, mutability: Mutability) -> Type {
        Type {
            base: self.base.clone(),
            mutability,
            location: self.location.clone(),
        }
    }

    pub fn with_location(&self, location: Span) -> Type {
        Type {
            base: self.base.clone(),
            mutability: self.mutability,
            location,
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    pub fn pointer_to(&self) -> Type {
        Type::pointer(self.clone(), Mutability::Mutable, self.location.clone())
    }

    pub fn optional_of(&self) -> Type {
        Type::optional(self.clone(), Mutability::Mutable, self.location.clone())
    }

    pub fn is_basic(&self) -> bool {
        matches!(*self.base, TypeBase::Basic { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(*self.base, TypeBase::Pointer { .. })
    }

    pub fn is_optional(&self) -> bool {
        matches!(*self.base, TypeBase::Optional { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.base, TypeBase::Array { .. })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(*self.base, TypeBase::Tuple { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(*self.base, TypeBase::Function { .. })
    }

    /// Name of a basic type; empty for other shapes.
    pub fn name(&self) -> &str {
        match &*self.base {
            TypeBase::Basic { name, .. } => name,
            _ => "",
        }
    }

    pub fn generic_args(&self) -> &[Type] {
        match &*self.base {
            TypeBase::Basic { generic_args, .. } => generic_args,
            _ => &[],
        }
    }

    /// `Name<arg, ...>` for basic types; used for symbol-table keying.
    pub fn qualified_name(&self) -> String {
        qualified_type_name(self.name(), self.generic_args())
    }

    pub fn pointee(&self) -> Option<&Type> {
        match &*self.base {
            TypeBase::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    pub fn wrapped_type(&self) -> Option<&Type> {
        match &*self.base {
            TypeBase::Optional { wrapped } => Some(wrapped),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match &*self.base {
            TypeBase::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn array_size(&self) -> Option<ArraySize> {
        match &*self.base {
            TypeBase::Array { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn tuple_elements(&self) -> Option<&[TupleElement]> {
        match &*self.base {
            TypeBase::Tuple { elements } => Some(elements),
            _ => None,
        }
    }

    pub fn return_type(&self) -> Option<&Type> {
        match &*self.base {
            TypeBase::Function { return_type, .. } => Some(return_type),
            _ => None,
        }
    }

    pub fn param_types(&self) -> Option<&[Type]> {
        match &*self.base {
            TypeBase::Function { param_types, .. } => Some(param_types),
            _ => None,
        }
    }

    /// Strips one level of pointer, if present.
    pub fn remove_pointer(&self) -> Type {
        match &*self.base {
            TypeBase::Pointer { pointee } => pointee.clone(),
            _ => self.clone(),
        }
    }

    /// Strips one level of optional, if present.
    pub fn remove_optional(&self) -> Type {
        match &*self.base {
            TypeBase::Optional { wrapped } => wrapped.clone(),
            _ => self.clone(),
        }
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self.name(), "int" | "int8" | "int16" | "int32" | "int64")
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self.name(), "uint" | "uint8" | "uint16" | "uint32" | "uint64")
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self.name(), "float" | "float32" | "float64")
    }

    pub fn is_builtin_scalar(&self) -> bool {
        self.is_integer() || self.is_floating_point() || matches!(self.name(), "bool" | "char")
    }

    /// Bit width of a builtin integer type. `int`/`uint` are 32-bit.
    pub fn integer_bit_width(&self) -> Option<u32> {
        match self.name() {
            "int" | "uint" | "int32" | "uint32" => Some(32),
            "int8" | "uint8" => Some(8),
            "int16" | "uint16" => Some(16),
            "int64" | "uint64" => Some(64),
            _ => None,
        }
    }

    /// Deep-substitutes generic-parameter placeholders. The result is
    /// re-interned; substituted placeholders inherit the placeholder's
    /// mutability.
    pub fn resolve(&self, replacements: &HashMap<String, Type>) -> Type {
        match &*self.base {
            TypeBase::Basic { name, generic_args } => {
                if let Some(replacement) = replacements.get(name) {
                    return replacement
                        .with_mutability(self.mutability)
                        .with_location(self.location.clone());
                }

                let generic_args = generic_args
                    .iter()
                    .map(|arg| arg.resolve(replacements))
                    .collect();
                Type::basic(
                    name.clone(),
                    generic_args,
                    self.mutability,
                    self.location.clone(),
                )
            }
            TypeBase::Pointer { pointee } => Type::pointer(
                pointee.resolve(replacements),
                self.mutability,
                self.location.clone(),
            ),
            TypeBase::Optional { wrapped } => Type::optional(
                wrapped.resolve(replacements),
                self.mutability,
                self.location.clone(),
            ),
            TypeBase::Array { element, size } => Type::array(
                element.resolve(replacements),
                *size,
                self.mutability,
                self.location.clone(),
            ),
            TypeBase::Tuple { elements } => {
                let elements = elements
                    .iter()
                    .map(|element| TupleElement {
                        name: element.name.clone(),
                        ty: element.ty.resolve(replacements),
                    })
                    .collect();
                Type::tuple(elements, self.mutability, self.location.clone())
            }
            TypeBase::Function {
                return_type,
                param_types,
                is_variadic,
            } => Type::function(
                return_type.resolve(replacements),
                param_types.iter().map(|p| p.resolve(replacements)).collect(),
                *is_variadic,
                self.location.clone(),
            ),
        }
    }

    /// Structural part of implicit copyability. Basic types need their
    /// declaration consulted; the typechecker layers that on top.
    pub fn is_structurally_copyable(&self) -> bool {
        match &*self.base {
            TypeBase::Basic { .. } => self.is_builtin_scalar() || self.is_null() || self.is_undefined(),
            TypeBase::Pointer { .. } | TypeBase::Function { .. } => true,
            TypeBase::Optional { wrapped } => wrapped.is_structurally_copyable(),
            TypeBase::Array { .. } => false,
            TypeBase::Tuple { elements } => elements
                .iter()
                .all(|element| element.ty.is_structurally_copyable()),
        }
    }

    fn format(&self, f: &mut fmt::Formatter, omit_top_level_mutable: bool) -> fmt::Result {
        if !omit_top_level_mutable && self.mutability == Mutability::Const {
            write!(f, "const ")?;
        }

        match &*self.base {
            TypeBase::Basic { name, generic_args } => {
                write!(f, "{}", name)?;
                if !generic_args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in generic_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeBase::Pointer { pointee } => write!(f, "{}*", pointee),
            TypeBase::Optional { wrapped } => write!(f, "{}?", wrapped),
            TypeBase::Array { element, size } => {
                write!(f, "{}", element)?;
                match size {
                    ArraySize::Constant(n) => write!(f, "[{}]", n),
                    ArraySize::Runtime => write!(f, "[?]"),
                    ArraySize::Unknown => write!(f, "[]"),
                }
            }
            TypeBase::Tuple { elements } => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element.ty)?;
                    if let Some(name) = &element.name {
                        write!(f, " {}", name)?;
                    }
                }
                write!(f, ")")
            }
            TypeBase::Function {
                return_type,
                param_types,
                is_variadic,
            } => {
                write!(f, "(")?;
                for (i, param) in param_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if *is_variadic {
                    if !param_types.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ") -> {}", return_type)
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The alternate form `{:#}` elides top-level mutability.
        self.format(f, f.alternate())
    }
}

pub fn qualified_type_name(name: &str, generic_args: &[Type]) -> String {
    let mut result = name.to_string();
    append_generic_args(&mut result, generic_args);
    result
}

pub fn append_generic_args(type_name: &mut String, generic_args: &[Type]) {
    if generic_args.is_empty() {
        return;
    }

    type_name.push('<');
    for (i, arg) in generic_args.iter().enumerate() {
        if i > 0 {
            type_name.push_str(", ");
        }
        type_name.push_str(&format!("{:#}", arg));
    }
    type_name.push('>');
}

macro_rules! builtin_types {
    ($(($ctor:ident, $is:ident, $name:literal)),* $(,)?) => {
        impl Type {
            $(
                pub fn $ctor(location: Span) -> Type {
                    Type::basic($name, Vec::new(), Mutability::Mutable, location)
                }

                pub fn $is(&self) -> bool {
                    self.is_basic() && self.name() == $name
                }
            )*
        }
    };
}

builtin_types! {
    (void, is_void, "void"),
    (bool_, is_bool, "bool"),
    (char_, is_char, "char"),
    (int, is_int, "int"),
    (int8, is_int8, "int8"),
    (int16, is_int16, "int16"),
    (int32, is_int32, "int32"),
    (int64, is_int64, "int64"),
    (uint, is_uint, "uint"),
    (uint8, is_uint8, "uint8"),
    (uint16, is_uint16, "uint16"),
    (uint32, is_uint32, "uint32"),
    (uint64, is_uint64, "uint64"),
    (float, is_float, "float"),
    (float32, is_float32, "float32"),
    (float64, is_float64, "float64"),
    (null, is_null, "null"),
    (undefined, is_undefined, "undefined"),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::unknown()
    }

    #[test]
    fn interning_preserves_structural_equality() {
        let a = Type::pointer(Type::int(span()), Mutability::Mutable, span());
        let b = Type::pointer(Type::int(span()), Mutability::Mutable, span());
        assert!(a.equals_ignore_top_level_mutable(&b));
        assert_eq!(a, b);

        let c = Type::pointer(Type::bool_(span()), Mutability::Mutable, span());
        assert!(!a.equals_ignore_top_level_mutable(&c));
    }

    #[test]
    fn top_level_mutability_shares_the_base() {
        let a = Type::int(span());
        let b = a.with_mutability(Mutability::Const);
        assert!(a.equals_ignore_top_level_mutable(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn nested_mutability_separates_bases() {
        let const_int = Type::int(span()).with_mutability(Mutability::Const);
        let a = Type::pointer(const_int, Mutability::Mutable, span());
        let b = Type::pointer(Type::int(span()), Mutability::Mutable, span());
        assert!(!a.equals_ignore_top_level_mutable(&b));
    }

    #[test]
    fn resolve_substitutes_placeholders() {
        let placeholder = Type::basic("T", Vec::new(), Mutability::Mutable, span());
        let ptr = Type::pointer(placeholder, Mutability::Mutable, span());

        let mut replacements = HashMap::new();
        replacements.insert("T".to_string(), Type::int(span()));

        let resolved = ptr.resolve(&replacements);
        let expected = Type::pointer(Type::int(span()), Mutability::Mutable, span());
        assert_eq!(resolved, expected);
    }

    #[test]
    fn resolve_keeps_placeholder_mutability() {
        let placeholder =
            Type::basic("T", Vec::new(), Mutability::Const, span());

        let mut replacements = HashMap::new();
        replacements.insert("T".to_string(), Type::int(span()));

        let resolved = placeholder.resolve(&replacements);
        assert_eq!(resolved.mutability, Mutability::Const);
        assert!(resolved.is_int());
    }

    #[test]
    fn printing_is_deterministic() {
        let optional_ptr = Type::optional(
            Type::pointer(Type::int(span()), Mutability::Mutable, span()),
            Mutability::Mutable,
            span(),
        );
        assert_eq!(optional_ptr.to_string(), "int*?");

        let arr = Type::array(Type::bool_(span()), ArraySize::Constant(4), Mutability::Mutable, span());
        assert_eq!(arr.to_string(), "bool[4]");

        let unknown = Type::array(Type::bool_(span()), ArraySize::Unknown, Mutability::Mutable, span());
        assert_eq!(unknown.to_string(), "bool[]");

        let generic = Type::basic(
            "Box",
            vec![Type::int(span())],
            Mutability::Const,
            span(),
        );
        assert_eq!(generic.to_string(), "const Box<int>");
        assert_eq!(format!("{:#}", generic), "Box<int>");
    }

    #[test]
    fn base_keys_hash_by_identity() {
        use std::collections::HashMap as Map;

        let mut memo: Map<Vec<TypeBaseKey>, i32> = Map::new();
        let args_a = vec![Type::int(span()).base_key()];
        let args_b = vec![Type::int(span()).base_key()];
        memo.insert(args_a, 1);
        assert_eq!(memo.get(&args_b), Some(&1));
    }
}
