//! Typed AST of the Sable language: interned types, declarations,
//! statements, expressions, modules, and generic instantiation.

pub mod decl;
pub mod expr;
pub mod module;
pub mod stmt;
pub mod types;

pub use decl::{
    decl_ref, instantiate_method, replacement_map, AccessLevel, CheckState, Decl, DeclRef,
    DeclWeak, EnumCaseDecl, EnumDecl, FieldDecl, FunctionDecl, FunctionKind, FunctionProto,
    FunctionTemplate, GenericParamDecl, ImportDecl, ImportTarget, ParamDecl, TypeDecl, TypeTag,
    TypeTemplate, VarDecl,
};
pub use expr::{BinaryOp, CallExpr, ConversionKind, Expr, ExprKind, NamedArg, UnaryOp};
pub use module::{
    Module, ModuleRef, ModuleRegistry, RedefinitionError, SourceFile, SymbolTable,
    STDLIB_MODULE_NAME,
};
pub use stmt::{lower_for_each, lower_while, Stmt, StmtKind, SwitchCase};
pub use types::{
    append_generic_args, qualified_type_name, ArraySize, Mutability, TupleElement, Type, TypeBase,
    TypeBaseKey,
};
