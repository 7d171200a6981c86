use sable_ast::*;
use sable_diagnostics::Span;
use std::rc::Rc;

fn span() -> Span {
    Span::unknown()
}

fn generic_param(name: &str) -> GenericParamDecl {
    GenericParamDecl {
        name: name.to_string(),
        constraints: Vec::new(),
        location: span(),
    }
}

fn identity_template() -> FunctionTemplate {
    // T identity<T>(T x) { return x; }
    let t = Type::basic("T", Vec::new(), Mutability::Mutable, span());
    let param = decl_ref(Decl::Param(ParamDecl::new(t.clone(), "x", span())));
    let body = vec![Stmt::new(
        StmtKind::Return(Some(Expr::new(
            ExprKind::Var {
                name: "x".to_string(),
                decl: None,
            },
            span(),
        ))),
        span(),
    )];

    let function = decl_ref(Decl::Function(FunctionDecl {
        kind: FunctionKind::Free,
        proto: FunctionProto {
            name: "identity".to_string(),
            params: vec![param],
            return_type: t,
            is_variadic: false,
            is_extern: false,
        },
        generic_args: Vec::new(),
        body: Some(body),
        receiver: None,
        mutating: false,
        access: AccessLevel::Default,
        module: "main".to_string(),
        location: span(),
        state: CheckState::Declared,
    }));

    FunctionTemplate::new(vec![generic_param("T")], function)
}

#[test]
fn instantiation_is_memoized_by_interned_args() {
    let mut template = identity_template();

    let first = template.instantiate(&[Type::int(span())]);
    let second = template.instantiate(&[Type::int(span())]);
    assert!(Rc::ptr_eq(&first, &second));

    let other = template.instantiate(&[Type::bool_(span())]);
    assert!(!Rc::ptr_eq(&first, &other));
    assert_eq!(template.instantiations().count(), 2);
}

#[test]
fn instantiation_resolves_signature_types() {
    let mut template = identity_template();
    let instantiation = template.instantiate(&[Type::int(span())]);

    match &*instantiation.borrow() {
        Decl::Function(function) => {
            assert!(function.return_type().is_int());
            assert_eq!(function.proto.param_decls().len(), 1);
            assert!(function.proto.param_decls()[0].ty.is_int());
            assert_eq!(function.generic_args, vec![Type::int(span())]);
            assert_eq!(function.qualified_name(), "identity<int>");
            // The clone starts untyped; each instantiation is checked on
            // its own.
            assert_eq!(function.state, CheckState::Declared);
        }
        _ => panic!("instantiation is not a function"),
    };
}

#[test]
fn type_template_instantiation_rebinds_method_receivers() {
    // struct Box<T> { T value; T get() { return this.value; } }
    let t = Type::basic("T", Vec::new(), Mutability::Mutable, span());

    let type_decl = decl_ref(Decl::Type(TypeDecl {
        tag: TypeTag::Struct,
        name: "Box".to_string(),
        generic_args: Vec::new(),
        interfaces: Vec::new(),
        fields: vec![FieldDecl {
            ty: t.clone(),
            name: "value".to_string(),
            location: span(),
        }],
        methods: Vec::new(),
        access: AccessLevel::Default,
        module: "main".to_string(),
        location: span(),
        state: CheckState::Declared,
    }));

    let method = decl_ref(Decl::Function(FunctionDecl {
        kind: FunctionKind::Method,
        proto: FunctionProto {
            name: "get".to_string(),
            params: Vec::new(),
            return_type: t,
            is_variadic: false,
            is_extern: false,
        },
        generic_args: Vec::new(),
        body: Some(Vec::new()),
        receiver: Some(Rc::downgrade(&type_decl)),
        mutating: false,
        access: AccessLevel::Default,
        module: "main".to_string(),
        location: span(),
        state: CheckState::Declared,
    }));

    if let Decl::Type(decl) = &mut *type_decl.borrow_mut() {
        decl.methods.push(method);
    }

    let mut template = TypeTemplate::new(vec![generic_param("T")], type_decl);
    let instantiation = template.instantiate(&[Type::int(span())]);
    let again = template.instantiate(&[Type::int(span())]);
    assert!(Rc::ptr_eq(&instantiation, &again));

    match &*instantiation.borrow() {
        Decl::Type(type_decl) => {
            assert_eq!(type_decl.qualified_name(), "Box<int>");
            assert!(type_decl.fields[0].ty.is_int());

            let get = &type_decl.methods[0];
            match &*get.borrow() {
                Decl::Function(function) => {
                    assert!(function.return_type().is_int());
                    let receiver = function.receiver_type_decl().expect("receiver dropped");
                    assert!(Rc::ptr_eq(&receiver, &instantiation));
                }
                _ => panic!("method is not a function"),
            };
        }
        _ => panic!("instantiation is not a type declaration"),
    };
}

#[test]
fn destructors_have_empty_parameter_lists() {
    let type_decl = decl_ref(Decl::Type(TypeDecl {
        tag: TypeTag::Struct,
        name: "Resource".to_string(),
        generic_args: Vec::new(),
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
        access: AccessLevel::Default,
        module: "main".to_string(),
        location: span(),
        state: CheckState::Declared,
    }));

    let dtor = decl_ref(Decl::Function(FunctionDecl {
        kind: FunctionKind::Destructor,
        proto: FunctionProto {
            name: "deinit".to_string(),
            params: Vec::new(),
            return_type: Type::void(span()),
            is_variadic: false,
            is_extern: false,
        },
        generic_args: Vec::new(),
        body: Some(Vec::new()),
        receiver: Some(Rc::downgrade(&type_decl)),
        mutating: true,
        access: AccessLevel::Default,
        module: "main".to_string(),
        location: span(),
        state: CheckState::Declared,
    }));

    if let Decl::Type(decl) = &mut *type_decl.borrow_mut() {
        decl.methods.push(dtor);
    }

    let found = match &*type_decl.borrow() {
        Decl::Type(decl) => decl.destructor().expect("destructor not found"),
        _ => unreachable!(),
    };
    match &*found.borrow() {
        Decl::Function(function) => assert!(function.proto.params.is_empty()),
        _ => panic!("destructor is not a function"),
    };
}
