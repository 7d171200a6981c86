//! The Sable compiler core: semantic analysis, IR generation, and the
//! LLVM backend, threaded through a single [`Compiler`] context.

pub mod error;
pub mod ir;
pub mod irgen;
pub mod llvm;
pub mod prelude;
pub mod sema;

pub use error::{CompileError, CompileResult};
pub use ir::{IrModule, IrType};
pub use irgen::IrGenerator;
pub use llvm::{CompiledModule, LlvmGenerator};
pub use sema::Typechecker;

use sable_ast::{Module, ModuleRef, ModuleRegistry, SourceFile, STDLIB_MODULE_NAME};
use sable_diagnostics::DiagnosticEngine;
use sable_parser::Parser;

/// Compilation context: the module registry and the diagnostics engine.
/// Process-wide in spirit, but owned so embedders can run independent
/// compilations.
pub struct Compiler {
    pub registry: ModuleRegistry,
    pub diagnostics: DiagnosticEngine,
}

impl Compiler {
    /// Creates a compiler with the `std` module loaded from the embedded
    /// prelude.
    pub fn new() -> CompileResult<Self> {
        let mut compiler = Self {
            registry: ModuleRegistry::new(),
            diagnostics: DiagnosticEngine::new(),
        };
        compiler.load_prelude()?;
        Ok(compiler)
    }

    fn load_prelude(&mut self) -> CompileResult<()> {
        let module = self.parse_into_module(
            prelude::PRELUDE_SOURCE,
            prelude::PRELUDE_FILE_NAME,
            STDLIB_MODULE_NAME,
        )?;
        self.typecheck(&module);

        if self.diagnostics.has_errors() {
            // The prelude is shipped with the compiler; failing to check it
            // is a compiler bug.
            let first = self
                .diagnostics
                .diagnostics()
                .first()
                .map(|d| d.message.clone())
                .unwrap_or_default();
            return Err(CompileError::internal(
                format!("the embedded prelude failed to typecheck: {}", first),
                sable_diagnostics::Span::unknown(),
            ));
        }
        Ok(())
    }

    /// Parses a source file into the named module, creating the module on
    /// first use.
    pub fn parse_into_module(
        &mut self,
        source: &str,
        file_path: &str,
        module_name: &str,
    ) -> CompileResult<ModuleRef> {
        let decls = Parser::new(source, file_path, module_name)
            .and_then(|mut parser| parser.parse_file())
            .map_err(|error| CompileError::Diagnostic(error.to_diagnostic()))?;

        let module = match self.registry.get(module_name) {
            Some(module) => module,
            None => self.registry.insert(Module::new(module_name)),
        };

        let mut file = SourceFile::new(file_path, source);
        file.decls = decls;
        module.borrow_mut().source_files.push(file);
        Ok(module)
    }

    /// Runs the typechecker over a module; diagnostics accumulate on the
    /// engine.
    pub fn typecheck(&mut self, module: &ModuleRef) {
        let mut typechecker =
            Typechecker::new(&self.registry, module.clone(), &mut self.diagnostics);
        typechecker.typecheck_module();
    }

    /// Parse + typecheck in one step. This is the `check` surface; errors
    /// are reported through the diagnostics engine.
    pub fn compile_source(&mut self, source: &str, file_path: &str) -> CompileResult<ModuleRef> {
        let module = self.parse_into_module(source, file_path, "main")?;
        self.typecheck(&module);
        Ok(module)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// Lowers a typechecked module to IR. Refuses to run when any error
    /// diagnostic was emitted.
    pub fn generate_ir(&mut self, module: &ModuleRef) -> CompileResult<IrModule> {
        if self.diagnostics.has_errors() {
            return Err(CompileError::error(
                sable_diagnostics::error_codes::INTERNAL,
                "IR generation skipped: compilation has errors".to_string(),
                sable_diagnostics::Span::unknown(),
            ));
        }
        let generator = IrGenerator::new(&self.registry, module.clone());
        generator.emit_module()
    }

    /// Lowers IR to an LLVM module ready for object emission or JIT
    /// execution.
    pub fn compile_to_llvm<'ctx>(
        &self,
        context: &'ctx inkwell::context::Context,
        ir: &IrModule,
    ) -> Result<CompiledModule<'ctx>, String> {
        let mut generator = LlvmGenerator::new(context, ir)?;
        generator.codegen_module()?;
        Ok(generator.into_compiled())
    }
}
