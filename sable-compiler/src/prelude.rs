//! The embedded standard-library prelude, compiled into the binary and
//! parsed into the `std` module at startup. Every user module imports it
//! implicitly; `import std;` is idempotent.

/// Sable source of the `std` module.
pub const PRELUDE_SOURCE: &str = r#"
// Marker interface consulted by implicit copying.
interface Copyable {
}

interface Iterator<Element> {
    bool hasValue();
    Element value();
    void increment();
}

// `a..b`, end exclusive.
struct Range: Copyable, Iterator<int> {
    int start;
    int end;

    Range(int start, int end) {
        this.start = start;
        this.end = end;
    }

    bool hasValue() {
        return this.start < this.end;
    }

    int value() {
        return this.start;
    }

    void increment() {
        this.start = this.start + 1;
    }
}

// `a...b`, end inclusive.
struct ClosedRange: Copyable, Iterator<int> {
    int start;
    int end;

    ClosedRange(int start, int end) {
        this.start = start;
        this.end = end;
    }

    bool hasValue() {
        return this.start <= this.end;
    }

    int value() {
        return this.start;
    }

    void increment() {
        this.start = this.start + 1;
    }
}
"#;

pub const PRELUDE_FILE_NAME: &str = "<prelude>";
