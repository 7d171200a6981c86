//! Modules, source files, and the scoped symbol table.

use crate::decl::{Decl, DeclRef, FunctionDecl};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ModuleRef = Rc<RefCell<Module>>;

/// The standard library module is recognized by this literal name.
pub const STDLIB_MODULE_NAME: &str = "std";

#[derive(Debug)]
pub struct SourceFile {
    pub file_path: String,
    pub text: String,
    pub decls: Vec<DeclRef>,
}

impl SourceFile {
    pub fn new(file_path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            text: text.into(),
            decls: Vec::new(),
        }
    }
}

/// A redefinition, with the previous definitions for diagnostic notes.
#[derive(Debug)]
pub struct RedefinitionError {
    pub name: String,
    pub previous: Vec<DeclRef>,
}

/// Stack of lexical scopes; the bottom scope holds the module's globals.
/// Functions are keyed by qualified name, then disambiguated by signature.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Vec<DeclRef>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn add(&mut self, name: impl Into<String>, decl: DeclRef) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.entry(name.into()).or_default().push(decl);
        }
    }

    pub fn add_global(&mut self, name: impl Into<String>, decl: DeclRef) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.entry(name.into()).or_default().push(decl);
        }
    }

    /// Walks scopes inner-to-outer; the first scope with a binding wins.
    /// Overload sets come back as a list.
    pub fn find(&self, name: &str) -> Vec<DeclRef> {
        for scope in self.scopes.iter().rev() {
            if let Some(decls) = scope.get(name) {
                if !decls.is_empty() {
                    return decls.clone();
                }
            }
        }
        Vec::new()
    }

    pub fn find_in_current_scope(&self, name: &str) -> Vec<DeclRef> {
        self.scopes
            .last()
            .and_then(|scope| scope.get(name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_global(&self, name: &str) -> Vec<DeclRef> {
        self.scopes
            .first()
            .and_then(|scope| scope.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Names of every global binding; used for "did you mean" suggestions.
    pub fn global_names(&self) -> Vec<String> {
        self.scopes
            .first()
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Finds a function with a signature matching `decl`, including the
    /// receiver; this is the redefinition probe.
    pub fn find_with_matching_prototype(&self, decl: &FunctionDecl) -> Option<DeclRef> {
        for existing in self.find_global(&decl.qualified_name()) {
            let matches = match &*existing.borrow() {
                Decl::Function(function) => function.signature_matches(decl, true),
                Decl::FunctionTemplate(template) => match &*template.function_decl.borrow() {
                    Decl::Function(function) => function.signature_matches(decl, true),
                    _ => false,
                },
                _ => false,
            };
            if matches {
                return Some(existing);
            }
        }
        None
    }
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub source_files: Vec<SourceFile>,
    pub symbol_table: SymbolTable,
    /// Names of imported modules, deduplicated; imports are idempotent.
    pub imports: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_files: Vec::new(),
            symbol_table: SymbolTable::new(),
            imports: Vec::new(),
        }
    }

    pub fn is_stdlib(&self) -> bool {
        self.name == STDLIB_MODULE_NAME
    }

    pub fn add_import(&mut self, module_name: &str) {
        if !self.imports.iter().any(|name| name == module_name) {
            self.imports.push(module_name.to_string());
        }
    }

    /// All top-level declarations across the module's source files.
    pub fn top_level_decls(&self) -> Vec<DeclRef> {
        self.source_files
            .iter()
            .flat_map(|file| file.decls.iter().cloned())
            .collect()
    }

    pub fn source_text_for(&self, file_path: &str) -> Option<&str> {
        self.source_files
            .iter()
            .find(|file| file.file_path == file_path)
            .map(|file| file.text.as_str())
    }

    /// Adds a declaration to the global scope under `name`, detecting
    /// redefinitions within the current scope.
    pub fn add_to_symbol_table_with_name(
        &mut self,
        decl: DeclRef,
        name: &str,
    ) -> Result<(), RedefinitionError> {
        let existing = self.symbol_table.find_in_current_scope(name);
        // Re-binding the same declaration is a no-op, so repeated binding
        // passes (and repeated imports) stay idempotent.
        if existing.iter().any(|previous| Rc::ptr_eq(previous, &decl)) {
            return Ok(());
        }
        if !existing.is_empty() {
            return Err(RedefinitionError {
                name: name.to_string(),
                previous: existing,
            });
        }
        self.symbol_table.add_global(name, decl);
        Ok(())
    }

    /// Adds a declaration under its natural key. Functions are keyed by
    /// qualified name and redefinition-checked against full signatures,
    /// receiver included.
    pub fn add_to_symbol_table(&mut self, decl: DeclRef) -> Result<(), RedefinitionError> {
        enum Keyed {
            Function(String),
            Named(String),
            Methods(Vec<DeclRef>, String),
            Skip,
        }

        let keyed = match &*decl.borrow() {
            Decl::Function(function) => {
                if let Some(previous) = self.symbol_table.find_with_matching_prototype(function) {
                    if Rc::ptr_eq(&previous, &decl) {
                        return Ok(());
                    }
                    return Err(RedefinitionError {
                        name: function.qualified_name(),
                        previous: vec![previous],
                    });
                }
                Keyed::Function(function.qualified_name())
            }
            Decl::FunctionTemplate(template) => match &*template.function_decl.borrow() {
                Decl::Function(function) => {
                    if let Some(previous) = self.symbol_table.find_with_matching_prototype(function)
                    {
                        if Rc::ptr_eq(&previous, &decl) {
                            return Ok(());
                        }
                        return Err(RedefinitionError {
                            name: function.qualified_name(),
                            previous: vec![previous],
                        });
                    }
                    Keyed::Function(function.qualified_name())
                }
                _ => Keyed::Skip,
            },
            Decl::Type(type_decl) => {
                Keyed::Methods(type_decl.methods.clone(), type_decl.qualified_name())
            }
            Decl::TypeTemplate(template) => Keyed::Named(template.name()),
            Decl::Enum(enum_decl) => Keyed::Named(enum_decl.name.clone()),
            Decl::Var(var) => Keyed::Named(var.name.clone()),
            Decl::Import(_) => Keyed::Skip,
            other => Keyed::Named(other.name()),
        };

        match keyed {
            Keyed::Function(name) => {
                self.symbol_table.add_global(&name, decl);
                Ok(())
            }
            Keyed::Named(name) => self.add_to_symbol_table_with_name(decl, &name),
            Keyed::Methods(methods, name) => {
                self.add_to_symbol_table_with_name(decl, &name)?;
                for method in methods {
                    self.add_to_symbol_table(method)?;
                }
                Ok(())
            }
            Keyed::Skip => Ok(()),
        }
    }

    /// Looks up a type or enum declaration by qualified name in the global
    /// scope.
    pub fn find_type_decl(&self, qualified_name: &str) -> Option<DeclRef> {
        self.symbol_table
            .find_global(qualified_name)
            .into_iter()
            .find(|decl| matches!(&*decl.borrow(), Decl::Type(_) | Decl::Enum(_)))
    }
}

/// Maps module names to modules so imports are deduplicated. Threaded
/// through the compilation driver rather than process-global: declaration
/// handles are single-threaded by design.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleRef>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ModuleRef> {
        self.modules.get(name).cloned()
    }

    pub fn insert(&mut self, module: Module) -> ModuleRef {
        let name = module.name.clone();
        let module = Rc::new(RefCell::new(module));
        self.modules.insert(name, module.clone());
        module
    }

    pub fn stdlib(&self) -> Option<ModuleRef> {
        self.get(STDLIB_MODULE_NAME)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values()
    }
}
