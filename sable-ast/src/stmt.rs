//! Statements, including the canonicalizing loop lowerings.

use crate::decl::{decl_ref, AccessLevel, CheckState, Decl, DeclRef, VarDecl};
use crate::expr::{CallExpr, Expr, ExprKind};
use crate::types::Type;
use sable_diagnostics::Span;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub value: Expr,
    /// Binding for the matched case's associated value, if any.
    pub associated_value: Option<DeclRef>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Return(Option<Expr>),
    Var(DeclRef),
    Expr(Expr),
    Increment(Expr),
    Decrement(Expr),
    Defer(Expr),
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Switch {
        condition: Expr,
        cases: Vec<SwitchCase>,
        default_body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        variable: Option<DeclRef>,
        condition: Option<Expr>,
        increment: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    ForEach {
        variable: DeclRef,
        range: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Compound(Vec<Stmt>),
    Assign {
        target: Expr,
        value: Expr,
    },
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: Span) -> Stmt {
        Stmt { kind, location }
    }

    pub fn is_breakable(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::While { .. } | StmtKind::For { .. } | StmtKind::ForEach { .. } | StmtKind::Switch { .. }
        )
    }

    pub fn is_continuable(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::While { .. } | StmtKind::For { .. } | StmtKind::ForEach { .. }
        )
    }

    /// Structural deep clone with type substitution.
    pub fn instantiate(&self, replacements: &HashMap<String, Type>) -> Stmt {
        let kind = match &self.kind {
            StmtKind::Return(value) => {
                StmtKind::Return(value.as_ref().map(|v| v.instantiate(replacements)))
            }
            StmtKind::Var(decl) => StmtKind::Var(instantiate_var_decl(decl, replacements)),
            StmtKind::Expr(expr) => StmtKind::Expr(expr.instantiate(replacements)),
            StmtKind::Increment(expr) => StmtKind::Increment(expr.instantiate(replacements)),
            StmtKind::Decrement(expr) => StmtKind::Decrement(expr.instantiate(replacements)),
            StmtKind::Defer(expr) => StmtKind::Defer(expr.instantiate(replacements)),
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => StmtKind::If {
                condition: condition.instantiate(replacements),
                then_body: instantiate_stmts(then_body, replacements),
                else_body: instantiate_stmts(else_body, replacements),
            },
            StmtKind::Switch {
                condition,
                cases,
                default_body,
            } => StmtKind::Switch {
                condition: condition.instantiate(replacements),
                cases: cases
                    .iter()
                    .map(|case| SwitchCase {
                        value: case.value.instantiate(replacements),
                        associated_value: case
                            .associated_value
                            .as_ref()
                            .map(|decl| instantiate_var_decl(decl, replacements)),
                        body: instantiate_stmts(&case.body, replacements),
                    })
                    .collect(),
                default_body: instantiate_stmts(default_body, replacements),
            },
            StmtKind::While { condition, body } => StmtKind::While {
                condition: condition.instantiate(replacements),
                body: instantiate_stmts(body, replacements),
            },
            StmtKind::For {
                variable,
                condition,
                increment,
                body,
            } => StmtKind::For {
                variable: variable
                    .as_ref()
                    .map(|decl| instantiate_var_decl(decl, replacements)),
                condition: condition.as_ref().map(|c| c.instantiate(replacements)),
                increment: increment
                    .as_ref()
                    .map(|i| Box::new(i.instantiate(replacements))),
                body: instantiate_stmts(body, replacements),
            },
            StmtKind::ForEach {
                variable,
                range,
                body,
            } => StmtKind::ForEach {
                variable: instantiate_var_decl(variable, replacements),
                range: range.instantiate(replacements),
                body: instantiate_stmts(body, replacements),
            },
            StmtKind::Break => StmtKind::Break,
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::Compound(body) => StmtKind::Compound(instantiate_stmts(body, replacements)),
            StmtKind::Assign { target, value } => StmtKind::Assign {
                target: target.instantiate(replacements),
                value: value.instantiate(replacements),
            },
        };

        Stmt {
            kind,
            location: self.location.clone(),
        }
    }
}

pub fn instantiate_stmts(stmts: &[Stmt], replacements: &HashMap<String, Type>) -> Vec<Stmt> {
    stmts.iter().map(|stmt| stmt.instantiate(replacements)).collect()
}

fn instantiate_var_decl(decl: &DeclRef, replacements: &HashMap<String, Type>) -> DeclRef {
    match &*decl.borrow() {
        Decl::Var(var) => decl_ref(Decl::Var(var.instantiate(replacements))),
        _ => unreachable!("variable statement does not hold a VarDecl"),
    }
}

/// Lowers `while (cond) body` into `for (; cond; ) body`.
pub fn lower_while(condition: Expr, body: Vec<Stmt>, location: Span) -> Stmt {
    Stmt::new(
        StmtKind::For {
            variable: None,
            condition: Some(condition),
            increment: None,
            body,
        },
        location,
    )
}

/// Lowers `for (x in range) body` into
///
/// ```text
/// for (var __iterator = <range or range.iterator()>;
///      __iterator.hasValue();
///      __iterator.increment()) {
///     var x = __iterator.value();
///     body
/// }
/// ```
///
/// `nest_level` disambiguates the synthetic iterator name across nested
/// loops. `range_is_iterator` is true when the range's type (pointers
/// stripped) already conforms to `Iterator`, in which case the
/// `.iterator()` call is omitted.
pub fn lower_for_each(
    variable: DeclRef,
    range: Expr,
    body: Vec<Stmt>,
    location: Span,
    nest_level: usize,
    range_is_iterator: bool,
) -> Stmt {
    let iterator_name = if nest_level > 0 {
        format!("__iterator{}", nest_level)
    } else {
        "__iterator".to_string()
    };

    let iterator_value = if range_is_iterator {
        range
    } else {
        method_call(range, "iterator", location.clone())
    };

    let (variable_name, variable_ty, variable_location, module) = match &*variable.borrow() {
        Decl::Var(var) => (
            var.name.clone(),
            var.ty.clone(),
            var.location.clone(),
            var.module.clone(),
        ),
        _ => unreachable!("for-each variable does not hold a VarDecl"),
    };

    let iterator_decl = decl_ref(Decl::Var(VarDecl {
        ty: None,
        is_const: false,
        name: iterator_name.clone(),
        initializer: Some(iterator_value),
        moved: false,
        is_global: false,
        access: AccessLevel::Default,
        module: module.clone(),
        location: location.clone(),
        state: CheckState::Declared,
    }));

    let condition = method_call(
        var_expr(&iterator_name, location.clone()),
        "hasValue",
        location.clone(),
    );
    let increment = Stmt::new(
        StmtKind::Expr(method_call(
            var_expr(&iterator_name, location.clone()),
            "increment",
            location.clone(),
        )),
        location.clone(),
    );

    let loop_variable = decl_ref(Decl::Var(VarDecl {
        ty: variable_ty,
        is_const: false,
        name: variable_name,
        initializer: Some(method_call(
            var_expr(&iterator_name, location.clone()),
            "value",
            variable_location.clone(),
        )),
        moved: false,
        is_global: false,
        access: AccessLevel::Default,
        module,
        location: variable_location.clone(),
        state: CheckState::Declared,
    }));

    let mut for_body = Vec::with_capacity(body.len() + 1);
    for_body.push(Stmt::new(StmtKind::Var(loop_variable), variable_location));
    for_body.extend(body);

    Stmt::new(
        StmtKind::For {
            variable: Some(iterator_decl),
            condition: Some(condition),
            increment: Some(Box::new(increment)),
            body: for_body,
        },
        location,
    )
}

fn var_expr(name: &str, location: Span) -> Expr {
    Expr::new(
        ExprKind::Var {
            name: name.to_string(),
            decl: None,
        },
        location,
    )
}

fn method_call(receiver: Expr, method: &str, location: Span) -> Expr {
    let member = Expr::new(
        ExprKind::Member {
            base: Box::new(receiver),
            member: method.to_string(),
            decl: None,
        },
        location.clone(),
    );
    Expr::new(
        ExprKind::Call(CallExpr {
            callee: Box::new(member),
            args: Vec::new(),
            generic_args: Vec::new(),
            callee_decl: None,
            receiver_type: None,
        }),
        location,
    )
}
