use sable_compiler::Compiler;
use sable_diagnostics::error_codes;

fn check(source: &str) -> Compiler {
    let mut compiler = Compiler::new().expect("prelude failed to load");
    compiler
        .compile_source(source, "test.sb")
        .expect("parse failed");
    compiler
}

fn error_codes_of(compiler: &Compiler) -> Vec<String> {
    compiler
        .diagnostics
        .diagnostics()
        .iter()
        .map(|d| d.code.clone())
        .collect()
}

#[test]
fn factorial_typechecks() {
    let compiler = check(
        "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
         int main() { return fact(5); }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn typechecking_is_idempotent() {
    let mut compiler = check(
        "int add(int a, int b) { return a + b; }
         int main() { return add(2, 3); }",
    );
    assert!(!compiler.has_errors());

    // A second pass over the already-typed module is a no-op.
    let module = compiler.registry.get("main").expect("module missing");
    compiler.typecheck(&module);
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn missing_interface_requirement_names_the_method() {
    let compiler = check(
        "interface Speaker { int speak(); }
         struct Dog: Speaker { int legs; }",
    );
    assert!(compiler.has_errors());
    let diagnostic = &compiler.diagnostics.diagnostics()[0];
    assert_eq!(diagnostic.code, error_codes::MISSING_INTERFACE_REQUIREMENT);
    assert!(
        diagnostic.message.contains("speak"),
        "missing requirement not named: {}",
        diagnostic.message
    );
}

#[test]
fn satisfied_interface_conformance_passes() {
    let compiler = check(
        "interface Speaker { int speak(); }
         struct Dog: Speaker {
             int legs;
             int speak() { return 1; }
         }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn ambiguous_overload_is_rejected() {
    let compiler = check(
        "int f(int? a) { return 1; }
         int f(int64 a) { return 2; }
         int main() { return f(5); }",
    );
    assert!(error_codes_of(&compiler).contains(&error_codes::AMBIGUOUS_CALL.to_string()));
}

#[test]
fn overload_prefers_exact_match() {
    let compiler = check(
        "int f(int a) { return 1; }
         int f(int64 a) { return 2; }
         int main() { return f(5); }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn no_viable_candidate_is_reported() {
    let compiler = check(
        "int f(bool a) { return 1; }
         int main() { return f(3.5); }",
    );
    assert!(error_codes_of(&compiler).contains(&error_codes::NO_MATCHING_CALL.to_string()));
}

#[test]
fn null_requires_an_optional_context() {
    let compiler = check("int main() { int x = null; return x; }");
    assert!(error_codes_of(&compiler).contains(&error_codes::NON_OPTIONAL_NULL.to_string()));
}

#[test]
fn null_adopts_the_optional_type() {
    let compiler = check("int main() { var x: int? = null; if (x) return 1; return 0; }");
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn use_after_move_is_rejected() {
    let compiler = check(
        "struct Resource {
             int handle;
             Resource(int handle) { this.handle = handle; }
         }
         void consume(Resource r) { }
         int main() {
             var r = Resource(1);
             consume(r);
             consume(r);
             return 0;
         }",
    );
    assert!(error_codes_of(&compiler).contains(&error_codes::USE_AFTER_MOVE.to_string()));
}

#[test]
fn reassignment_revives_a_moved_binding() {
    let compiler = check(
        "struct Resource {
             int handle;
             Resource(int handle) { this.handle = handle; }
         }
         void consume(Resource r) { }
         int main() {
             var r = Resource(1);
             consume(r);
             r = Resource(2);
             consume(r);
             return 0;
         }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn copyable_values_are_not_moved() {
    let compiler = check(
        "void consume(Range r) { }
         int main() {
             var r = 0..3;
             consume(r);
             consume(r);
             return 0;
         }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn generic_inference_binds_from_arguments() {
    let compiler = check(
        "T pick<T>(T a, T b) { return a; }
         int main() { return pick(1, 2); }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn conflicting_inference_fails() {
    let compiler = check(
        "T pick<T>(T a, T b) { return a; }
         int main() { return pick(1, true); }",
    );
    assert!(
        error_codes_of(&compiler).contains(&error_codes::NO_MATCHING_CALL.to_string())
            || error_codes_of(&compiler).contains(&error_codes::INFERENCE_FAILED.to_string()),
        "{:?}",
        error_codes_of(&compiler)
    );
}

#[test]
fn generic_constraints_are_enforced() {
    let compiler = check(
        "struct Opaque { int x; Opaque(int x) { this.x = x; } }
         T dup<T: Copyable>(T x) { return x; }
         int main() {
             var o = Opaque(1);
             dup(o);
             return 0;
         }",
    );
    assert!(
        error_codes_of(&compiler).contains(&error_codes::CONSTRAINT_NOT_SATISFIED.to_string()),
        "{:?}",
        error_codes_of(&compiler)
    );
}

#[test]
fn wrong_generic_argument_count_is_reported() {
    let compiler = check(
        "T identity<T>(T x) { return x; }
         int main() { return identity<int, bool>(1); }",
    );
    assert!(error_codes_of(&compiler).contains(&error_codes::GENERIC_ARG_COUNT.to_string()));
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let compiler = check("int main() { break; return 0; }");
    assert!(error_codes_of(&compiler).contains(&error_codes::BREAK_OUTSIDE_LOOP.to_string()));
}

#[test]
fn missing_return_on_a_non_void_path() {
    let compiler = check("int f(bool b) { if (b) return 1; }");
    assert!(error_codes_of(&compiler).contains(&error_codes::MISSING_RETURN.to_string()));
}

#[test]
fn redefinition_reports_the_previous_definition() {
    let compiler = check(
        "int f(int a) { return a; }
         int f(int a) { return a; }",
    );
    let diagnostics = compiler.diagnostics.diagnostics();
    assert!(diagnostics
        .iter()
        .any(|d| d.code == error_codes::REDEFINITION && !d.notes.is_empty()));
}

#[test]
fn undefined_identifier_suggests_a_near_miss() {
    let compiler = check(
        "int counter = 0;
         int main() { return countr; }",
    );
    let diagnostics = compiler.diagnostics.diagnostics();
    let undefined = diagnostics
        .iter()
        .find(|d| d.code == error_codes::UNDEFINED_IDENTIFIER)
        .expect("no undefined-identifier diagnostic");
    assert!(
        undefined.help.as_deref().unwrap_or("").contains("counter"),
        "no suggestion in {:?}",
        undefined
    );
}

#[test]
fn import_std_is_idempotent() {
    let compiler = check(
        "import std;
         import std;
         int main() { var r = 0..3; return r.value(); }",
    );
    assert!(!compiler.has_errors(), "{:?}", error_codes_of(&compiler));
}

#[test]
fn header_imports_are_reported_as_unsupported() {
    let compiler = check("import \"stdio.h\";\nint main() { return 0; }");
    assert!(error_codes_of(&compiler).contains(&error_codes::UNSUPPORTED_IMPORT.to_string()));
}

#[test]
fn mutating_a_const_binding_is_rejected() {
    let compiler = check("int main() { const x = 1; x = 2; return x; }");
    assert!(error_codes_of(&compiler).contains(&error_codes::TYPE_MISMATCH.to_string()));
}
