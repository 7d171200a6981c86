//! Name mangling: module, receiver-type qualified name, unqualified name,
//! and ordered generic arguments. Externs and `main` are unmangled.

use sable_ast::{FunctionDecl, Type};

pub fn mangle_function_decl(decl: &FunctionDecl) -> String {
    if decl.is_extern() {
        return decl.name().to_string();
    }
    if decl.is_main() {
        return "main".to_string();
    }

    let mut result = sanitize(&decl.module);
    if let Some(receiver) = decl.receiver_type() {
        result.push('$');
        result.push_str(&sanitize(&format!("{:#}", receiver)));
    }
    result.push('$');
    result.push_str(&sanitize(decl.name()));
    for arg in &decl.generic_args {
        result.push('$');
        result.push_str(&mangle_type(arg));
    }
    result
}

pub fn mangle_type(ty: &Type) -> String {
    sanitize(&format!("{:#}", ty))
}

/// Keeps mangled names within `[A-Za-z0-9_$.]`, deterministically.
fn sanitize(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' => result.push(c),
            '<' => result.push('$'),
            '>' => {}
            ',' => result.push('_'),
            ' ' => {}
            '*' => result.push_str("P"),
            '?' => result.push_str("O"),
            '[' => result.push_str("A"),
            ']' => {}
            '(' => result.push_str("T"),
            ')' => {}
            _ => result.push('_'),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_diagnostics::Span;

    #[test]
    fn sanitized_names_are_symbol_safe() {
        let ty = sable_ast::Type::basic(
            "Box",
            vec![sable_ast::Type::int(Span::unknown()).pointer_to()],
            sable_ast::Mutability::Mutable,
            Span::unknown(),
        );
        assert_eq!(mangle_type(&ty), "Box$intP");
    }
}
