//! Expressions. Each node caches its resolved type after typechecking; the
//! typechecker may also replace a node in place with an implicit-cast
//! wrapper.

use crate::decl::DeclRef;
use crate::types::Type;
use sable_diagnostics::Span;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    BitwiseNot,
    Deref,
    AddressOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessOrEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterOrEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }
}

/// Implicit conversions the typechecker can insert (§ implicit conversion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// `T` -> `T?`
    OptionalWrap,
    /// `T*` -> `T?` (null-checked wrap)
    PointerToOptional,
    /// Lossless integer widening
    IntegerWiden,
    /// float32 -> float64
    FloatWiden,
    /// `T[N]` -> `T*`
    ArrayToPointer,
    /// Copy of an implicitly copyable value
    Copy,
}

#[derive(Debug, Clone)]
pub struct NamedArg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub args: Vec<NamedArg>,
    pub generic_args: Vec<Type>,
    /// Resolved by overload resolution.
    pub callee_decl: Option<DeclRef>,
    /// Receiver type for method calls, after typechecking.
    pub receiver_type: Option<Type>,
}

impl CallExpr {
    /// Unqualified callee name, for candidate collection.
    pub fn callee_name(&self) -> Option<&str> {
        match &self.callee.kind {
            ExprKind::Var { name, .. } => Some(name),
            ExprKind::Member { member, .. } => Some(member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Var {
        name: String,
        decl: Option<DeclRef>,
    },
    This,
    IntLiteral(u64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    NullLiteral,
    UndefinedLiteral,
    StringLiteral(String),
    CharacterLiteral(char),
    ArrayLiteral(Vec<Expr>),
    TupleLiteral(Vec<NamedArg>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call(CallExpr),
    Member {
        base: Box<Expr>,
        member: String,
        decl: Option<DeclRef>,
    },
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Unwrap {
        operand: Box<Expr>,
    },
    Cast {
        operand: Box<Expr>,
        target: Type,
    },
    Sizeof {
        ty: Type,
    },
    /// Inserted by the typechecker; never produced by the parser.
    ImplicitCast {
        operand: Box<Expr>,
        conversion: ConversionKind,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Resolved type, set by the typechecker.
    pub ty: Option<Type>,
    pub location: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Span) -> Expr {
        Expr {
            kind,
            ty: None,
            location,
        }
    }

    /// The resolved type. Only valid after typechecking.
    pub fn assigned_type(&self) -> Type {
        self.ty
            .clone()
            .unwrap_or_else(|| unreachable!("expression queried before typechecking"))
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self.kind, ExprKind::NullLiteral)
    }

    pub fn is_undefined_literal(&self) -> bool {
        matches!(self.kind, ExprKind::UndefinedLiteral)
    }

    /// True for expressions that denote storage (can be assigned through).
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Var { .. } | ExprKind::This | ExprKind::Member { .. } | ExprKind::Subscript { .. } => true,
            ExprKind::Unary { op, .. } => *op == UnaryOp::Deref,
            _ => false,
        }
    }

    /// Wraps this expression in an implicit conversion, in place.
    pub fn wrap_in_implicit_cast(&mut self, conversion: ConversionKind, ty: Type) {
        let location = self.location.clone();
        let operand = std::mem::replace(
            self,
            Expr::new(ExprKind::NullLiteral, location.clone()),
        );
        *self = Expr {
            kind: ExprKind::ImplicitCast {
                operand: Box::new(operand),
                conversion,
            },
            ty: Some(ty),
            location,
        };
    }

    /// Structural deep clone with type substitution. Resolution state (the
    /// cached type, resolved declarations) is reset; the instantiation is
    /// typechecked on its own.
    pub fn instantiate(&self, replacements: &HashMap<String, Type>) -> Expr {
        let kind = match &self.kind {
            ExprKind::Var { name, .. } => ExprKind::Var {
                name: name.clone(),
                decl: None,
            },
            ExprKind::This => ExprKind::This,
            ExprKind::IntLiteral(value) => ExprKind::IntLiteral(*value),
            ExprKind::FloatLiteral(value) => ExprKind::FloatLiteral(*value),
            ExprKind::BoolLiteral(value) => ExprKind::BoolLiteral(*value),
            ExprKind::NullLiteral => ExprKind::NullLiteral,
            ExprKind::UndefinedLiteral => ExprKind::UndefinedLiteral,
            ExprKind::StringLiteral(value) => ExprKind::StringLiteral(value.clone()),
            ExprKind::CharacterLiteral(value) => ExprKind::CharacterLiteral(*value),
            ExprKind::ArrayLiteral(elements) => ExprKind::ArrayLiteral(
                elements.iter().map(|e| e.instantiate(replacements)).collect(),
            ),
            ExprKind::TupleLiteral(elements) => ExprKind::TupleLiteral(
                elements
                    .iter()
                    .map(|element| NamedArg {
                        name: element.name.clone(),
                        value: element.value.instantiate(replacements),
                    })
                    .collect(),
            ),
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Box::new(operand.instantiate(replacements)),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: *op,
                lhs: Box::new(lhs.instantiate(replacements)),
                rhs: Box::new(rhs.instantiate(replacements)),
            },
            ExprKind::Call(call) => ExprKind::Call(CallExpr {
                callee: Box::new(call.callee.instantiate(replacements)),
                args: call
                    .args
                    .iter()
                    .map(|arg| NamedArg {
                        name: arg.name.clone(),
                        value: arg.value.instantiate(replacements),
                    })
                    .collect(),
                generic_args: call
                    .generic_args
                    .iter()
                    .map(|arg| arg.resolve(replacements))
                    .collect(),
                callee_decl: None,
                receiver_type: None,
            }),
            ExprKind::Member { base, member, .. } => ExprKind::Member {
                base: Box::new(base.instantiate(replacements)),
                member: member.clone(),
                decl: None,
            },
            ExprKind::Subscript { base, index } => ExprKind::Subscript {
                base: Box::new(base.instantiate(replacements)),
                index: Box::new(index.instantiate(replacements)),
            },
            ExprKind::Unwrap { operand } => ExprKind::Unwrap {
                operand: Box::new(operand.instantiate(replacements)),
            },
            ExprKind::Cast { operand, target } => ExprKind::Cast {
                operand: Box::new(operand.instantiate(replacements)),
                target: target.resolve(replacements),
            },
            ExprKind::Sizeof { ty } => ExprKind::Sizeof {
                ty: ty.resolve(replacements),
            },
            ExprKind::ImplicitCast { operand, conversion } => ExprKind::ImplicitCast {
                operand: Box::new(operand.instantiate(replacements)),
                conversion: *conversion,
            },
        };

        Expr {
            kind,
            ty: None,
            location: self.location.clone(),
        }
    }
}
