// End-to-end scenarios: compile, JIT-execute `main`, check the exit value.

use sable_compiler::Compiler;

fn run(source: &str) -> i32 {
    let mut compiler = Compiler::new().expect("prelude failed to load");
    let module = compiler
        .compile_source(source, "test.sb")
        .expect("parse failed");
    assert!(
        !compiler.has_errors(),
        "typecheck failed: {:?}",
        compiler
            .diagnostics
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect::<Vec<_>>()
    );
    let ir = compiler.generate_ir(&module).expect("IR generation failed");
    ir.verify().expect("IR verification failed");

    let context = inkwell::context::Context::create();
    let mut compiled = compiler
        .compile_to_llvm(&context, &ir)
        .expect("LLVM lowering failed");
    compiled.run_main().expect("JIT execution failed")
}

#[test]
fn factorial_returns_120() {
    let result = run(
        "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }
         int main() { return fact(5); }",
    );
    assert_eq!(result, 120);
}

#[test]
fn generic_identity_returns_its_argument() {
    let result = run(
        "T identity<T>(T x) { return x; }
         int main() { return identity<int>(7); }",
    );
    assert_eq!(result, 7);
}

#[test]
fn optional_unwrap_returns_the_value() {
    let result = run(
        "int main() {
             var x: int? = 3;
             if (x) return x!;
             return -1;
         }",
    );
    assert_eq!(result, 3);
}

#[test]
fn empty_optional_takes_the_else_path() {
    let result = run(
        "int main() {
             var x: int? = null;
             if (x) return x!;
             return -1;
         }",
    );
    assert_eq!(result, -1);
}

#[test]
fn destructors_run_in_reverse_declaration_order() {
    // Two locals declared `a` then `b` log `deinit b, deinit a`:
    // 0*10+2 = 2, then 2*10+1 = 21.
    let result = run(
        "int log = 0;
         struct Tracer {
             int id;
             Tracer(int id) { this.id = id; }
             ~Tracer() { log = log * 10 + this.id; }
         }
         int main() {
             {
                 var a = Tracer(1);
                 var b = Tracer(2);
             }
             return log;
         }",
    );
    assert_eq!(result, 21);
}

#[test]
fn for_in_sums_the_range() {
    let result = run(
        "int main() {
             var sum = 0;
             for x in 0..3 { sum = sum + x; }
             return sum;
         }",
    );
    assert_eq!(result, 3);
}

#[test]
fn closed_ranges_include_the_end() {
    let result = run(
        "int main() {
             var sum = 0;
             for x in 1...3 { sum = sum + x; }
             return sum;
         }",
    );
    assert_eq!(result, 6);
}

#[test]
fn defer_runs_before_the_function_exits() {
    let result = run(
        "int log = 0;
         void bump() { log = log + 1; }
         int probe() {
             defer bump();
             defer bump();
             return 0;
         }
         int main() {
             probe();
             return log;
         }",
    );
    assert_eq!(result, 2);
}

#[test]
fn methods_dispatch_through_the_receiver() {
    let result = run(
        "struct Counter {
             int value;
             Counter(int start) { this.value = start; }
             void bump() { this.value = this.value + 1; }
             int get() { return this.value; }
         }
         int main() {
             var c = Counter(40);
             c.bump();
             c.bump();
             return c.get();
         }",
    );
    assert_eq!(result, 42);
}

#[test]
fn large_returns_go_through_sret() {
    // 3 * int64 = 24 bytes, past the 16-byte hidden-pointer threshold.
    let result = run(
        "struct Triple {
             int64 a;
             int64 b;
             int64 c;
             Triple(int64 a, int64 b, int64 c) {
                 this.a = a;
                 this.b = b;
                 this.c = c;
             }
         }
         Triple make() { return Triple(7, 9, 26); }
         int main() {
             var t = make();
             return (t.a + t.b + t.c) as int;
         }",
    );
    assert_eq!(result, 42);
}

#[test]
fn enum_switch_binds_the_associated_value() {
    let result = run(
        "enum Shape { circle(int), square }
         int area(Shape s) {
             switch (s) {
                 case circle(var r): return r * r;
                 case square: return 1;
                 default: return 0;
             }
         }
         int main() { return area(Shape.circle(6)) + area(Shape.square); }",
    );
    assert_eq!(result, 37);
}

#[test]
fn while_loops_run() {
    let result = run(
        "int main() {
             var n = 0;
             while (n < 10) { n = n + 2; }
             return n;
         }",
    );
    assert_eq!(result, 10);
}

#[test]
fn break_and_continue_respect_scopes() {
    let result = run(
        "int main() {
             var sum = 0;
             for (var i = 0; i < 10; i++) {
                 if (i == 5) { break; }
                 if (i % 2 == 1) { continue; }
                 sum = sum + i;
             }
             return sum;
         }",
    );
    assert_eq!(result, 6); // 0 + 2 + 4
}

#[test]
fn generic_struct_instantiation_shares_one_type() {
    let result = run(
        "struct Box<T> {
             T value;
             Box(T value) { this.value = value; }
             T get() { return this.value; }
         }
         int main() {
             var a = Box<int>(20);
             var b = Box<int>(22);
             return a.get() + b.get();
         }",
    );
    assert_eq!(result, 42);
}

#[test]
fn logical_operators_short_circuit() {
    let result = run(
        "int calls = 0;
         bool tick(bool value) { calls = calls + 1; return value; }
         int main() {
             if (tick(false) && tick(true)) { return 100; }
             if (tick(true) || tick(true)) { return calls; }
             return -1;
         }",
    );
    // tick runs once for the `&&` (short-circuited) and once for the `||`.
    assert_eq!(result, 2);
}

#[test]
fn move_semantics_pass_ownership_without_copying() {
    let result = run(
        "struct Buffer {
             int size;
             Buffer(int size) { this.size = size; }
         }
         int consume(Buffer b) { return b.size; }
         int main() {
             var b = Buffer(42);
             return consume(b);
         }",
    );
    assert_eq!(result, 42);
}

#[test]
fn exit_codes_flow_from_main() {
    let result = run("int main() { return 0; }");
    assert_eq!(result, 0);
}
