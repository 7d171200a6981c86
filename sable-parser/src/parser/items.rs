// Top-level declarations and type members.

use super::Parser;
use crate::ParseError;
use sable_ast::*;
use sable_lexer::Token;
use std::rc::Rc;

impl<'a> Parser<'a> {
    pub(crate) fn parse_top_level_decl(&mut self) -> Result<DeclRef, ParseError> {
        let access = self.parse_access_level();

        if self.check(&Token::Import) {
            self.parse_import()
        } else if self.check(&Token::Struct) {
            self.parse_type_decl(TypeTag::Struct, access)
        } else if self.check(&Token::Interface) {
            self.parse_type_decl(TypeTag::Interface, access)
        } else if self.check(&Token::Enum) {
            self.parse_enum(access)
        } else if self.check(&Token::Extern) {
            self.parse_extern()
        } else if self.check(&Token::Var) || self.check(&Token::Const) {
            self.parse_var_decl(true, access)
        } else {
            // C-style: `ReturnType name(params) { ... }` or `Type name = init;`
            let location = self.current_span();
            let ty = self.parse_type()?;
            let name = self.consume_identifier("expected a declaration name")?;

            if self.check(&Token::LeftParen) || self.check(&Token::Less) {
                self.parse_function(ty, name, access, false, None)
            } else {
                self.parse_typed_global(ty, name, access, location)
            }
        }
    }

    fn parse_access_level(&mut self) -> AccessLevel {
        if self.match_token(&Token::Public) {
            AccessLevel::Public
        } else if self.match_token(&Token::Private) {
            AccessLevel::Private
        } else {
            AccessLevel::Default
        }
    }

    fn parse_import(&mut self) -> Result<DeclRef, ParseError> {
        let location = self.current_span();
        self.consume(&Token::Import, "expected `import`")?;

        let target = match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                ImportTarget::Module(name)
            }
            Token::StringLiteral(path) => {
                self.advance();
                ImportTarget::Header(path)
            }
            _ => return Err(self.error("expected a module name after `import`")),
        };

        self.consume(&Token::Semicolon, "expected `;` after import")?;
        Ok(decl_ref(Decl::Import(ImportDecl { target, location })))
    }

    /// `extern int printf(char* format, ...);`
    fn parse_extern(&mut self) -> Result<DeclRef, ParseError> {
        self.consume(&Token::Extern, "expected `extern`")?;
        let ty = self.parse_type()?;
        let name = self.consume_identifier("expected a function name")?;
        self.parse_function(ty, name, AccessLevel::Default, true, None)
    }

    /// Parses generic parameters, parameters, and body of a function whose
    /// return type and name were already consumed. Wraps generic functions
    /// in a template.
    pub(crate) fn parse_function(
        &mut self,
        return_type: Type,
        name: String,
        access: AccessLevel,
        is_extern: bool,
        receiver: Option<&DeclRef>,
    ) -> Result<DeclRef, ParseError> {
        let location = self.current_span();
        let generic_params = if self.check(&Token::Less) {
            self.parse_generic_params()?
        } else {
            Vec::new()
        };

        let (params, is_variadic) = self.parse_params()?;

        let body = if is_extern {
            self.consume(&Token::Semicolon, "expected `;` after extern declaration")?;
            None
        } else if self.match_token(&Token::Semicolon) {
            // Interface requirement or forward prototype.
            None
        } else {
            Some(self.parse_block()?)
        };

        let kind = if receiver.is_some() {
            FunctionKind::Method
        } else {
            FunctionKind::Free
        };

        let function = decl_ref(Decl::Function(FunctionDecl {
            kind,
            proto: FunctionProto {
                name,
                params,
                return_type,
                is_variadic,
                is_extern,
            },
            generic_args: Vec::new(),
            body,
            receiver: receiver.map(Rc::downgrade),
            mutating: false,
            access,
            module: self.module_name.clone(),
            location,
        state: CheckState::Declared,
        }));

        if generic_params.is_empty() {
            Ok(function)
        } else {
            Ok(decl_ref(Decl::FunctionTemplate(FunctionTemplate::new(
                generic_params,
                function,
            ))))
        }
    }

    /// `<T, U: Iterator>`
    fn parse_generic_params(&mut self) -> Result<Vec<GenericParamDecl>, ParseError> {
        self.consume(&Token::Less, "expected `<`")?;
        let mut params = Vec::new();

        loop {
            let location = self.current_span();
            let name = self.consume_identifier("expected a generic parameter name")?;
            let mut constraints = Vec::new();
            if self.match_token(&Token::Colon) {
                constraints.push(self.consume_identifier("expected a constraint name")?);
            }
            params.push(GenericParamDecl {
                name,
                constraints,
                location,
            });

            if !self.match_token(&Token::Comma) {
                break;
            }
        }

        self.consume(&Token::Greater, "expected `>` after generic parameters")?;
        Ok(params)
    }

    fn parse_params(&mut self) -> Result<(Vec<DeclRef>, bool), ParseError> {
        self.consume(&Token::LeftParen, "expected `(`")?;
        let mut params = Vec::new();
        let mut is_variadic = false;

        if !self.check(&Token::RightParen) {
            loop {
                if self.match_token(&Token::DotDotDot) {
                    is_variadic = true;
                    break;
                }
                let location = self.current_span();
                let ty = self.parse_type()?;
                let name = self.consume_identifier("expected a parameter name")?;
                params.push(decl_ref(Decl::Param(ParamDecl::new(ty, name, location))));

                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }

        self.consume(&Token::RightParen, "expected `)` after parameters")?;
        Ok((params, is_variadic))
    }

    fn parse_typed_global(
        &mut self,
        ty: Type,
        name: String,
        access: AccessLevel,
        location: sable_diagnostics::Span,
    ) -> Result<DeclRef, ParseError> {
        let initializer = if self.match_token(&Token::Assignment) {
            if self.match_token(&Token::Undefined) {
                None
            } else {
                Some(self.parse_expr()?)
            }
        } else {
            None
        };
        self.consume(&Token::Semicolon, "expected `;` after variable declaration")?;

        Ok(decl_ref(Decl::Var(VarDecl {
            ty: Some(ty),
            is_const: false,
            name,
            initializer,
            moved: false,
            is_global: true,
            access,
            module: self.module_name.clone(),
            location,
            state: CheckState::Declared,
        })))
    }

    /// `var x = e;`, `const x = e;`, `var x: T = e;`
    pub(crate) fn parse_var_decl(
        &mut self,
        is_global: bool,
        access: AccessLevel,
    ) -> Result<DeclRef, ParseError> {
        let location = self.current_span();
        let is_const = if self.match_token(&Token::Const) {
            true
        } else {
            self.consume(&Token::Var, "expected `var` or `const`")?;
            false
        };

        let name = self.consume_identifier("expected a variable name")?;
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let initializer = if self.match_token(&Token::Assignment) {
            if self.match_token(&Token::Undefined) {
                None
            } else {
                Some(self.parse_expr()?)
            }
        } else {
            None
        };
        self.consume(&Token::Semicolon, "expected `;` after variable declaration")?;

        Ok(decl_ref(Decl::Var(VarDecl {
            ty,
            is_const,
            name,
            initializer,
            moved: false,
            is_global,
            access,
            module: self.module_name.clone(),
            location,
            state: CheckState::Declared,
        })))
    }

    /// `struct Name<T>: Interface1, Interface2 { fields; methods }` and
    /// `interface Name<T> { requirements }`.
    fn parse_type_decl(&mut self, tag: TypeTag, access: AccessLevel) -> Result<DeclRef, ParseError> {
        let location = self.current_span();
        self.advance(); // struct / interface

        let name = self.consume_identifier("expected a type name")?;
        let generic_params = if self.check(&Token::Less) {
            self.parse_generic_params()?
        } else {
            Vec::new()
        };

        let mut interfaces = Vec::new();
        if self.match_token(&Token::Colon) {
            loop {
                interfaces.push(self.parse_type()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }

        let type_decl = decl_ref(Decl::Type(TypeDecl {
            tag,
            name: name.clone(),
            generic_args: Vec::new(),
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            access,
            module: self.module_name.clone(),
            location,
            state: CheckState::Declared,
        }));

        self.consume(&Token::LeftBrace, "expected `{` in type declaration")?;
        while !self.check(&Token::RightBrace) && !self.is_at_end() {
            self.parse_type_member(&type_decl, &name)?;
        }
        self.consume(&Token::RightBrace, "expected `}` after type body")?;

        if generic_params.is_empty() {
            Ok(type_decl)
        } else {
            Ok(decl_ref(Decl::TypeTemplate(TypeTemplate::new(
                generic_params,
                type_decl,
            ))))
        }
    }

    fn parse_type_member(
        &mut self,
        type_decl: &DeclRef,
        type_name: &str,
    ) -> Result<(), ParseError> {
        let access = self.parse_access_level();

        // `~Name() { ... }` destructor
        if self.check(&Token::Tilde) {
            let location = self.current_span();
            self.advance();
            let name = self.consume_identifier("expected the type name after `~`")?;
            if name != type_name {
                return Err(ParseError::unexpected(
                    format!("destructor must be named `~{}`", type_name),
                    location,
                ));
            }
            self.consume(&Token::LeftParen, "expected `(` after destructor name")?;
            self.consume(&Token::RightParen, "destructors take no parameters")?;
            let body = self.parse_block()?;

            let dtor = decl_ref(Decl::Function(FunctionDecl {
                kind: FunctionKind::Destructor,
                proto: FunctionProto {
                    name: "deinit".to_string(),
                    params: Vec::new(),
                    return_type: Type::void(location.clone()),
                    is_variadic: false,
                    is_extern: false,
                },
                generic_args: Vec::new(),
                body: Some(body),
                receiver: Some(Rc::downgrade(type_decl)),
                mutating: true,
                access,
                module: self.module_name.clone(),
                location,
                state: CheckState::Declared,
            }));
            push_method(type_decl, dtor);
            return Ok(());
        }

        // `Name(params) { ... }` constructor
        if self.check_identifier(type_name) && self.check_ahead(1, &Token::LeftParen) {
            let location = self.current_span();
            self.advance();
            let (params, _) = self.parse_params()?;
            let body = self.parse_block()?;

            let ctor = decl_ref(Decl::Function(FunctionDecl {
                kind: FunctionKind::Constructor,
                proto: FunctionProto {
                    name: "init".to_string(),
                    params,
                    return_type: Type::void(location.clone()),
                    is_variadic: false,
                    is_extern: false,
                },
                generic_args: Vec::new(),
                body: Some(body),
                receiver: Some(Rc::downgrade(type_decl)),
                mutating: true,
                access,
                module: self.module_name.clone(),
                location,
                state: CheckState::Declared,
            }));
            push_method(type_decl, ctor);
            return Ok(());
        }

        // `Type name;` field or `Type name(params) {...}` method
        let location = self.current_span();
        let ty = self.parse_type()?;
        let name = self.consume_identifier("expected a member name")?;

        if self.check(&Token::LeftParen) || self.check(&Token::Less) {
            let method = self.parse_function(ty, name, access, false, Some(type_decl))?;
            if matches!(&*method.borrow(), Decl::FunctionTemplate(_)) {
                return Err(ParseError::unexpected(
                    "generic methods are not supported; make the type generic instead",
                    location,
                ));
            }
            push_method(type_decl, method);
        } else {
            self.consume(&Token::Semicolon, "expected `;` after field")?;
            if let Decl::Type(decl) = &mut *type_decl.borrow_mut() {
                decl.fields.push(FieldDecl { ty, name, location });
            }
        }
        Ok(())
    }

    /// `enum Shape { circle(float), square }`
    fn parse_enum(&mut self, access: AccessLevel) -> Result<DeclRef, ParseError> {
        let location = self.current_span();
        self.consume(&Token::Enum, "expected `enum`")?;
        let name = self.consume_identifier("expected an enum name")?;

        let enum_decl = decl_ref(Decl::Enum(EnumDecl {
            name,
            cases: Vec::new(),
            access,
            module: self.module_name.clone(),
            location,
            state: CheckState::Declared,
        }));

        self.consume(&Token::LeftBrace, "expected `{` in enum declaration")?;
        let mut cases = Vec::new();
        if !self.check(&Token::RightBrace) {
            loop {
                let case_location = self.current_span();
                let case_name = self.consume_identifier("expected an enum case name")?;
                let associated_type = if self.match_token(&Token::LeftParen) {
                    let ty = self.parse_type()?;
                    self.consume(&Token::RightParen, "expected `)` after associated value type")?;
                    Some(ty)
                } else {
                    None
                };

                cases.push(decl_ref(Decl::EnumCase(EnumCaseDecl {
                    name: case_name,
                    associated_type,
                    tag_value: cases.len() as i64,
                    parent_enum: Some(Rc::downgrade(&enum_decl)),
                    location: case_location,
                })));

                if !self.match_token(&Token::Comma) {
                    break;
                }
                if self.check(&Token::RightBrace) {
                    break; // trailing comma
                }
            }
        }
        self.consume(&Token::RightBrace, "expected `}` after enum cases")?;

        if let Decl::Enum(decl) = &mut *enum_decl.borrow_mut() {
            decl.cases = cases;
        }
        Ok(enum_decl)
    }
}

fn push_method(type_decl: &DeclRef, method: DeclRef) {
    if let Decl::Type(decl) = &mut *type_decl.borrow_mut() {
        decl.methods.push(method);
    }
}
