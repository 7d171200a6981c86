use sable_ast::*;
use sable_parser::Parser;

fn parse(source: &str) -> Vec<DeclRef> {
    Parser::new(source, "test.sb", "main")
        .expect("lexing failed")
        .parse_file()
        .expect("parsing failed")
}

fn parse_type(source: &str) -> Type {
    Parser::new(source, "test.sb", "main")
        .expect("lexing failed")
        .parse_standalone_type()
        .expect("type parsing failed")
}

#[test]
fn parses_c_style_function() {
    let decls = parse("int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }");
    assert_eq!(decls.len(), 1);

    match &*decls[0].borrow() {
        Decl::Function(function) => {
            assert_eq!(function.name(), "fact");
            assert!(function.return_type().is_int());
            assert_eq!(function.proto.param_decls().len(), 1);
            assert_eq!(function.body.as_ref().map(Vec::len), Some(2));
        }
        other => panic!("expected a function, got {:?}", other.name()),
    };
}

#[test]
fn parses_generic_function_into_template() {
    let decls = parse("T identity<T>(T x) { return x; }");
    match &*decls[0].borrow() {
        Decl::FunctionTemplate(template) => {
            assert_eq!(template.generic_params.len(), 1);
            assert_eq!(template.generic_params[0].name, "T");
        }
        _ => panic!("expected a function template"),
    };
}

#[test]
fn parses_struct_with_ctor_dtor_and_methods() {
    let decls = parse(
        "struct Range: Iterator<int> {
             int start;
             int end;
             Range(int start, int end) { this.start = start; this.end = end; }
             ~Range() { }
             bool hasValue() { return this.start < this.end; }
         }",
    );

    match &*decls[0].borrow() {
        Decl::Type(type_decl) => {
            assert_eq!(type_decl.name, "Range");
            assert_eq!(type_decl.fields.len(), 2);
            assert_eq!(type_decl.methods.len(), 3);
            assert!(type_decl.conforms_to("Iterator"));
            assert!(type_decl.destructor().is_some());
            assert_eq!(type_decl.constructors().len(), 1);
        }
        _ => panic!("expected a type declaration"),
    };
}

#[test]
fn parses_enum_with_associated_values() {
    let decls = parse("enum Shape { circle(float), square }");
    match &*decls[0].borrow() {
        Decl::Enum(enum_decl) => {
            assert_eq!(enum_decl.cases.len(), 2);
            assert!(enum_decl.has_associated_values());
            let circle = enum_decl.find_case("circle").expect("case not found");
            match &*circle.borrow() {
                Decl::EnumCase(case) => {
                    assert_eq!(case.tag_value, 0);
                    assert!(case.associated_type.is_some());
                }
                _ => panic!("expected an enum case"),
            };
        }
        _ => panic!("expected an enum"),
    };
}

#[test]
fn parses_extern_variadic() {
    let decls = parse("extern int printf(char* format, ...);");
    match &*decls[0].borrow() {
        Decl::Function(function) => {
            assert!(function.is_extern());
            assert!(function.proto.is_variadic);
            assert!(function.body.is_none());
        }
        _ => panic!("expected a function"),
    };
}

#[test]
fn for_in_parses_to_for_each() {
    let decls = parse("int main() { var sum = 0; for x in 0..3 { sum += x; } return sum; }");
    match &*decls[0].borrow() {
        Decl::Function(function) => {
            let body = function.body.as_ref().expect("missing body");
            assert!(matches!(body[1].kind, StmtKind::ForEach { .. }));
        }
        _ => panic!("expected a function"),
    };
}

#[test]
fn generic_call_disambiguates_from_comparison() {
    let decls = parse("int main() { return identity<int>(7); }");
    match &*decls[0].borrow() {
        Decl::Function(function) => {
            let body = function.body.as_ref().expect("missing body");
            match &body[0].kind {
                StmtKind::Return(Some(expr)) => match &expr.kind {
                    ExprKind::Call(call) => {
                        assert_eq!(call.generic_args.len(), 1);
                        assert!(call.generic_args[0].is_int());
                    }
                    _ => panic!("expected a call"),
                },
                _ => panic!("expected a return"),
            }
        }
        _ => panic!("expected a function"),
    };
}

#[test]
fn comparisons_still_parse_as_binary() {
    let decls = parse("int main() { return (a < b) as int; }");
    match &*decls[0].borrow() {
        Decl::Function(function) => {
            let body = function.body.as_ref().expect("missing body");
            match &body[0].kind {
                StmtKind::Return(Some(expr)) => {
                    assert!(matches!(expr.kind, ExprKind::Cast { .. }));
                }
                _ => panic!("expected a return"),
            }
        }
        _ => panic!("expected a function"),
    };
}

#[test]
fn type_printing_round_trips_to_the_same_base() {
    for source in ["int*?", "bool[4]", "Box<int>", "const char*", "(int, bool)", "(int) -> void"] {
        let parsed = parse_type(source);
        let printed = parsed.to_string();
        let reparsed = parse_type(&printed);
        assert!(
            parsed.equals_ignore_top_level_mutable(&reparsed),
            "{} printed as {} but re-parsed differently",
            source,
            printed
        );
    }
}

#[test]
fn parsing_preserves_declared_types_and_names() {
    let decls = parse("int64 scale(int64 base, float64 factor) { return base; }");
    match &*decls[0].borrow() {
        Decl::Function(function) => {
            assert_eq!(function.qualified_name(), "scale");
            assert_eq!(function.function_type().to_string(), "(int64, float64) -> int64");
            let params = function.proto.param_decls();
            assert_eq!(params[0].name, "base");
            assert_eq!(params[1].name, "factor");
        }
        _ => panic!("expected a function"),
    };
}

#[test]
fn conditional_compilation_filters_tokens() {
    let decls = parse("#if false\nint dropped() { return 1; }\n#endif\nint kept() { return 2; }");
    assert_eq!(decls.len(), 1);
    assert_eq!(decls[0].borrow().name(), "kept");
}

#[test]
fn switch_with_enum_binding() {
    let decls = parse(
        "int area(Shape s) {
             switch (s) {
                 case Shape.circle(var r): return r;
                 default: return 0;
             }
         }",
    );
    match &*decls[0].borrow() {
        Decl::Function(function) => {
            let body = function.body.as_ref().expect("missing body");
            match &body[0].kind {
                StmtKind::Switch { cases, default_body, .. } => {
                    assert_eq!(cases.len(), 1);
                    assert!(cases[0].associated_value.is_some());
                    assert_eq!(default_body.len(), 1);
                }
                _ => panic!("expected a switch"),
            }
        }
        _ => panic!("expected a function"),
    };
}
