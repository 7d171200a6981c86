//! Declarations.
//!
//! Declarations are shared through `Rc<RefCell<_>>` handles: the owning
//! module, the symbol table, resolved expressions, and template memoization
//! maps all refer to the same cell. Template instantiation relies on this:
//! instantiating a template twice with the same interned argument tuple
//! returns the same handle (`Rc::ptr_eq`).

use crate::expr::Expr;
use crate::stmt::Stmt;
use crate::types::{append_generic_args, Mutability, Type, TypeBaseKey};
use sable_diagnostics::Span;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub type DeclRef = Rc<RefCell<Decl>>;
pub type DeclWeak = Weak<RefCell<Decl>>;

pub fn decl_ref(decl: Decl) -> DeclRef {
    Rc::new(RefCell::new(decl))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Default,
    Private,
    Public,
}

/// Typechecking progress of a declaration. `Typed` is idempotent:
/// revisiting a typed declaration is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Declared,
    NameBound,
    Typed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Struct,
    Class,
    Interface,
    Union,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Method,
    Constructor,
    Destructor,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Param(ParamDecl),
    GenericParam(GenericParamDecl),
    Function(FunctionDecl),
    FunctionTemplate(FunctionTemplate),
    Type(TypeDecl),
    TypeTemplate(TypeTemplate),
    Enum(EnumDecl),
    EnumCase(EnumCaseDecl),
    Var(VarDecl),
    Field(FieldDecl),
    Import(ImportDecl),
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub ty: Type,
    pub name: String,
    pub moved: bool,
    pub location: Span,
}

impl ParamDecl {
    pub fn new(ty: Type, name: impl Into<String>, location: Span) -> Self {
        Self {
            ty,
            name: name.into(),
            moved: false,
            location,
        }
    }

    pub fn matches(&self, other: &ParamDecl) -> bool {
        self.name == other.name && self.ty == other.ty
    }
}

#[derive(Debug, Clone)]
pub struct GenericParamDecl {
    pub name: String,
    /// Interface names the argument must conform to.
    pub constraints: Vec<String>,
    pub location: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionProto {
    pub name: String,
    pub params: Vec<DeclRef>,
    pub return_type: Type,
    pub is_variadic: bool,
    pub is_extern: bool,
}

impl FunctionProto {
    pub fn param_decls(&self) -> Vec<ParamDecl> {
        self.params
            .iter()
            .map(|p| match &*p.borrow() {
                Decl::Param(param) => param.clone(),
                _ => unreachable!("function parameter is not a ParamDecl"),
            })
            .collect()
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.param_decls().into_iter().map(|p| p.ty).collect()
    }

    fn instantiate(&self, replacements: &HashMap<String, Type>) -> FunctionProto {
        let params = self
            .param_decls()
            .into_iter()
            .map(|param| {
                decl_ref(Decl::Param(ParamDecl {
                    ty: param.ty.resolve(replacements),
                    name: param.name,
                    moved: false,
                    location: param.location,
                }))
            })
            .collect();

        FunctionProto {
            name: self.name.clone(),
            params,
            return_type: self.return_type.resolve(replacements),
            is_variadic: self.is_variadic,
            is_extern: self.is_extern,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub kind: FunctionKind,
    pub proto: FunctionProto,
    /// Ordered generic arguments for instantiations of a template.
    pub generic_args: Vec<Type>,
    pub body: Option<Vec<Stmt>>,
    /// Back-reference to the receiver type declaration; a relation, not
    /// ownership.
    pub receiver: Option<DeclWeak>,
    pub mutating: bool,
    pub access: AccessLevel,
    pub module: String,
    pub location: Span,
    pub state: CheckState,
}

impl FunctionDecl {
    pub fn name(&self) -> &str {
        &self.proto.name
    }

    pub fn return_type(&self) -> &Type {
        &self.proto.return_type
    }

    pub fn is_extern(&self) -> bool {
        self.proto.is_extern
    }

    pub fn is_method(&self) -> bool {
        !matches!(self.kind, FunctionKind::Free)
    }

    pub fn is_main(&self) -> bool {
        matches!(self.kind, FunctionKind::Free) && self.proto.name == "main"
    }

    pub fn receiver_type_decl(&self) -> Option<DeclRef> {
        self.receiver.as_ref().and_then(Weak::upgrade)
    }

    /// The receiver's type, if this is a method.
    pub fn receiver_type(&self) -> Option<Type> {
        let receiver = self.receiver_type_decl()?;
        let receiver = receiver.borrow();
        match &*receiver {
            Decl::Type(type_decl) => Some(type_decl.ty()),
            _ => None,
        }
    }

    /// Receiver-qualified name plus generic arguments; uniquely identifies
    /// a function within a module.
    pub fn qualified_name(&self) -> String {
        let mut result = String::new();
        if let Some(receiver) = self.receiver_type() {
            result.push_str(&format!("{:#}", receiver));
            result.push('.');
        }
        result.push_str(&self.proto.name);
        append_generic_args(&mut result, &self.generic_args);
        result
    }

    pub fn function_type(&self) -> Type {
        Type::function(
            self.proto.return_type.clone(),
            self.proto.param_types(),
            self.proto.is_variadic,
            self.location.clone(),
        )
    }

    /// Signature comparison used by redefinition detection.
    pub fn signature_matches(&self, other: &FunctionDecl, match_receiver: bool) -> bool {
        if self.proto.name != other.proto.name {
            return false;
        }
        if match_receiver {
            let mine = self.receiver_type_decl();
            let theirs = other.receiver_type_decl();
            match (mine, theirs) {
                (None, None) => {}
                (Some(a), Some(b)) if Rc::ptr_eq(&a, &b) => {}
                _ => return false,
            }
        }
        if self.proto.return_type != other.proto.return_type {
            return false;
        }
        let my_params = self.proto.param_decls();
        let other_params = other.proto.param_decls();
        my_params.len() == other_params.len()
            && my_params
                .iter()
                .zip(other_params.iter())
                .all(|(a, b)| a.matches(b))
    }

    pub fn instantiate(
        &self,
        replacements: &HashMap<String, Type>,
        generic_args: Vec<Type>,
    ) -> FunctionDecl {
        FunctionDecl {
            kind: self.kind,
            proto: self.proto.instantiate(replacements),
            generic_args,
            body: self
                .body
                .as_ref()
                .map(|body| body.iter().map(|stmt| stmt.instantiate(replacements)).collect()),
            receiver: self.receiver.clone(),
            mutating: self.mutating,
            access: self.access,
            module: self.module.clone(),
            location: self.location.clone(),
            state: CheckState::Declared,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionTemplate {
    pub generic_params: Vec<GenericParamDecl>,
    pub function_decl: DeclRef,
    instantiations: HashMap<Vec<TypeBaseKey>, DeclRef>,
}

impl FunctionTemplate {
    pub fn new(generic_params: Vec<GenericParamDecl>, function_decl: DeclRef) -> Self {
        Self {
            generic_params,
            function_decl,
            instantiations: HashMap::new(),
        }
    }

    pub fn name(&self) -> String {
        match &*self.function_decl.borrow() {
            Decl::Function(function) => function.proto.name.clone(),
            _ => unreachable!("function template does not wrap a function"),
        }
    }

    pub fn instantiations(&self) -> impl Iterator<Item = &DeclRef> {
        self.instantiations.values()
    }

    /// Memoized instantiation: repeated calls with an equal ordered argument
    /// tuple return the same declaration handle.
    pub fn instantiate(&mut self, generic_args: &[Type]) -> DeclRef {
        debug_assert_eq!(generic_args.len(), self.generic_params.len());

        let key: Vec<TypeBaseKey> = generic_args.iter().map(Type::base_key).collect();
        if let Some(existing) = self.instantiations.get(&key) {
            return existing.clone();
        }

        let replacements = replacement_map(&self.generic_params, generic_args);
        let instantiation = match &*self.function_decl.borrow() {
            Decl::Function(function) => {
                decl_ref(Decl::Function(function.instantiate(&replacements, generic_args.to_vec())))
            }
            _ => unreachable!("function template does not wrap a function"),
        };

        self.instantiations.insert(key, instantiation.clone());
        instantiation
    }
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub tag: TypeTag,
    pub name: String,
    pub generic_args: Vec<Type>,
    /// Interfaces this type declares conformance to.
    pub interfaces: Vec<Type>,
    /// Field order defines memory layout.
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<DeclRef>,
    pub access: AccessLevel,
    pub module: String,
    pub location: Span,
    pub state: CheckState,
}

impl TypeDecl {
    pub fn is_struct(&self) -> bool {
        self.tag == TypeTag::Struct
    }

    pub fn is_interface(&self) -> bool {
        self.tag == TypeTag::Interface
    }

    pub fn is_union(&self) -> bool {
        self.tag == TypeTag::Union
    }

    pub fn pass_by_value(&self) -> bool {
        matches!(self.tag, TypeTag::Struct | TypeTag::Union)
    }

    pub fn ty(&self) -> Type {
        Type::basic(
            self.name.clone(),
            self.generic_args.clone(),
            Mutability::Mutable,
            self.location.clone(),
        )
    }

    pub fn qualified_name(&self) -> String {
        let mut result = self.name.clone();
        append_generic_args(&mut result, &self.generic_args);
        result
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn destructor(&self) -> Option<DeclRef> {
        self.find_method_by_kind(FunctionKind::Destructor)
    }

    pub fn constructors(&self) -> Vec<DeclRef> {
        self.methods
            .iter()
            .filter(|method| {
                matches!(
                    &*method.borrow(),
                    Decl::Function(f) if f.kind == FunctionKind::Constructor
                )
            })
            .cloned()
            .collect()
    }

    fn find_method_by_kind(&self, kind: FunctionKind) -> Option<DeclRef> {
        self.methods
            .iter()
            .find(|method| matches!(&*method.borrow(), Decl::Function(f) if f.kind == kind))
            .cloned()
    }

    pub fn find_methods(&self, name: &str) -> Vec<DeclRef> {
        self.methods
            .iter()
            .filter(|method| {
                matches!(&*method.borrow(), Decl::Function(f) if f.proto.name == name)
            })
            .cloned()
            .collect()
    }

    pub fn conforms_to(&self, interface_name: &str) -> bool {
        self.interfaces
            .iter()
            .any(|interface| interface.name() == interface_name)
    }
}

/// Clones a method against an already-instantiated receiver so its
/// receiver back-reference points at the new type declaration.
pub fn instantiate_method(
    method: &DeclRef,
    replacements: &HashMap<String, Type>,
    receiver: &DeclRef,
) -> DeclRef {
    let instantiation = match &*method.borrow() {
        Decl::Function(function) => {
            let mut instantiation = function.instantiate(replacements, Vec::new());
            instantiation.receiver = Some(Rc::downgrade(receiver));
            instantiation
        }
        _ => unreachable!("type member is not a function declaration"),
    };
    decl_ref(Decl::Function(instantiation))
}

#[derive(Debug, Clone)]
pub struct TypeTemplate {
    pub generic_params: Vec<GenericParamDecl>,
    pub type_decl: DeclRef,
    instantiations: HashMap<Vec<TypeBaseKey>, DeclRef>,
}

impl TypeTemplate {
    pub fn new(generic_params: Vec<GenericParamDecl>, type_decl: DeclRef) -> Self {
        Self {
            generic_params,
            type_decl,
            instantiations: HashMap::new(),
        }
    }

    pub fn name(&self) -> String {
        match &*self.type_decl.borrow() {
            Decl::Type(type_decl) => type_decl.name.clone(),
            _ => unreachable!("type template does not wrap a type declaration"),
        }
    }

    pub fn instantiations(&self) -> impl Iterator<Item = &DeclRef> {
        self.instantiations.values()
    }

    /// Memoized instantiation; preserves type-declaration identity across
    /// references, which method dispatch and named-struct caching rely on.
    pub fn instantiate(&mut self, generic_args: &[Type]) -> DeclRef {
        debug_assert_eq!(generic_args.len(), self.generic_params.len());

        let key: Vec<TypeBaseKey> = generic_args.iter().map(Type::base_key).collect();
        if let Some(existing) = self.instantiations.get(&key) {
            return existing.clone();
        }

        let replacements = replacement_map(&self.generic_params, generic_args);

        let (shell, methods) = match &*self.type_decl.borrow() {
            Decl::Type(type_decl) => {
                let shell = TypeDecl {
                    tag: type_decl.tag,
                    name: type_decl.name.clone(),
                    generic_args: generic_args.to_vec(),
                    interfaces: type_decl
                        .interfaces
                        .iter()
                        .map(|interface| interface.resolve(&replacements))
                        .collect(),
                    fields: type_decl
                        .fields
                        .iter()
                        .map(|field| field.instantiate(&replacements))
                        .collect(),
                    methods: Vec::new(),
                    access: type_decl.access,
                    module: type_decl.module.clone(),
                    location: type_decl.location.clone(),
                    state: CheckState::Declared,
                };
                (shell, type_decl.methods.clone())
            }
            _ => unreachable!("type template does not wrap a type declaration"),
        };

        let instantiation = decl_ref(Decl::Type(shell));
        let instantiated_methods: Vec<DeclRef> = methods
            .iter()
            .map(|method| instantiate_method(method, &replacements, &instantiation))
            .collect();

        if let Decl::Type(type_decl) = &mut *instantiation.borrow_mut() {
            type_decl.methods = instantiated_methods;
        }

        self.instantiations.insert(key, instantiation.clone());
        instantiation
    }
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub cases: Vec<DeclRef>,
    pub access: AccessLevel,
    pub module: String,
    pub location: Span,
    pub state: CheckState,
}

impl EnumDecl {
    pub fn ty(&self) -> Type {
        Type::basic(
            self.name.clone(),
            Vec::new(),
            Mutability::Mutable,
            self.location.clone(),
        )
    }

    pub fn find_case(&self, name: &str) -> Option<DeclRef> {
        self.cases
            .iter()
            .find(|case| matches!(&*case.borrow(), Decl::EnumCase(c) if c.name == name))
            .cloned()
    }

    /// True when any case carries an associated value.
    pub fn has_associated_values(&self) -> bool {
        self.cases.iter().any(|case| {
            matches!(&*case.borrow(), Decl::EnumCase(c) if c.associated_type.is_some())
        })
    }
}

#[derive(Debug, Clone)]
pub struct EnumCaseDecl {
    pub name: String,
    pub associated_type: Option<Type>,
    pub tag_value: i64,
    pub parent_enum: Option<DeclWeak>,
    pub location: Span,
}

impl EnumCaseDecl {
    pub fn parent(&self) -> Option<DeclRef> {
        self.parent_enum.as_ref().and_then(Weak::upgrade)
    }
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    /// None until inferred from the initializer.
    pub ty: Option<Type>,
    /// `const x = ...` bindings; inferred types adopt Const mutability.
    pub is_const: bool,
    pub name: String,
    /// None when the initializer is `undefined`.
    pub initializer: Option<Expr>,
    pub moved: bool,
    pub is_global: bool,
    pub access: AccessLevel,
    pub module: String,
    pub location: Span,
    pub state: CheckState,
}

impl VarDecl {
    pub fn instantiate(&self, replacements: &HashMap<String, Type>) -> VarDecl {
        VarDecl {
            ty: self.ty.as_ref().map(|ty| ty.resolve(replacements)),
            is_const: self.is_const,
            name: self.name.clone(),
            initializer: self
                .initializer
                .as_ref()
                .map(|init| init.instantiate(replacements)),
            moved: false,
            is_global: self.is_global,
            access: self.access,
            module: self.module.clone(),
            location: self.location.clone(),
            state: CheckState::Declared,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub ty: Type,
    pub name: String,
    pub location: Span,
}

impl FieldDecl {
    fn instantiate(&self, replacements: &HashMap<String, Type>) -> FieldDecl {
        FieldDecl {
            ty: self.ty.resolve(replacements),
            name: self.name.clone(),
            location: self.location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// `import std;`
    Module(String),
    /// `import "header.h";` — handled by an external importer, not here.
    Header(String),
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub target: ImportTarget,
    pub location: Span,
}

pub fn replacement_map(
    generic_params: &[GenericParamDecl],
    generic_args: &[Type],
) -> HashMap<String, Type> {
    generic_params
        .iter()
        .zip(generic_args.iter())
        .map(|(param, arg)| (param.name.clone(), arg.clone()))
        .collect()
}

impl Decl {
    pub fn name(&self) -> String {
        match self {
            Decl::Param(d) => d.name.clone(),
            Decl::GenericParam(d) => d.name.clone(),
            Decl::Function(d) => d.proto.name.clone(),
            Decl::FunctionTemplate(d) => d.name(),
            Decl::Type(d) => d.name.clone(),
            Decl::TypeTemplate(d) => d.name(),
            Decl::Enum(d) => d.name.clone(),
            Decl::EnumCase(d) => d.name.clone(),
            Decl::Var(d) => d.name.clone(),
            Decl::Field(d) => d.name.clone(),
            Decl::Import(d) => match &d.target {
                ImportTarget::Module(name) => name.clone(),
                ImportTarget::Header(name) => name.clone(),
            },
        }
    }

    pub fn location(&self) -> Span {
        match self {
            Decl::Param(d) => d.location.clone(),
            Decl::GenericParam(d) => d.location.clone(),
            Decl::Function(d) => d.location.clone(),
            Decl::FunctionTemplate(d) => match &*d.function_decl.borrow() {
                Decl::Function(f) => f.location.clone(),
                _ => Span::unknown(),
            },
            Decl::Type(d) => d.location.clone(),
            Decl::TypeTemplate(d) => match &*d.type_decl.borrow() {
                Decl::Type(t) => t.location.clone(),
                _ => Span::unknown(),
            },
            Decl::Enum(d) => d.location.clone(),
            Decl::EnumCase(d) => d.location.clone(),
            Decl::Var(d) => d.location.clone(),
            Decl::Field(d) => d.location.clone(),
            Decl::Import(d) => d.location.clone(),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Decl::Function(_))
    }

    pub fn is_movable(&self) -> bool {
        matches!(self, Decl::Var(_) | Decl::Param(_))
    }

    pub fn has_been_moved(&self) -> bool {
        match self {
            Decl::Var(d) => d.moved,
            Decl::Param(d) => d.moved,
            _ => false,
        }
    }

    pub fn set_moved(&mut self, moved: bool) {
        match self {
            Decl::Var(d) => d.moved = moved,
            Decl::Param(d) => d.moved = moved,
            _ => {}
        }
    }
}
