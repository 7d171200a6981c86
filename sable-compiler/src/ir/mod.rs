//! The typed SSA-style intermediate representation.
//!
//! Values have a single defining position; block parameters act as phi
//! nodes, fed by the branch arguments of predecessor terminators.

mod print;
mod verify;

pub use print::print_function;

use sable_ast::{BinaryOp, UnaryOp};
use sable_diagnostics::Span;
use std::collections::HashMap;

/// Handle of a value inside its owning [`IrModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// IR types are structural; named structs and unions carry only their name,
/// with bodies registered on the module. That keeps recursive types (a
/// struct holding a pointer to itself) finite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Primitive, by name ("int32", "bool", "void", ...).
    Basic(String),
    Pointer(Box<IrType>),
    Function {
        return_type: Box<IrType>,
        param_types: Vec<IrType>,
        is_variadic: bool,
    },
    Array {
        element: Box<IrType>,
        size: u32,
    },
    /// Anonymous aggregate (tuples, optionals).
    Struct {
        fields: Vec<IrType>,
    },
    /// Named struct; body in [`IrModule::struct_bodies`].
    NamedStruct {
        name: String,
    },
    /// Named union; sized as its largest field by the backend.
    Union {
        name: String,
    },
}

impl IrType {
    pub fn basic(name: &str) -> IrType {
        IrType::Basic(name.to_string())
    }

    pub fn void() -> IrType {
        IrType::basic("void")
    }

    pub fn bool_() -> IrType {
        IrType::basic("bool")
    }

    pub fn pointer_to(self) -> IrType {
        IrType::Pointer(Box::new(self))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Basic(name) if name == "void")
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, IrType::Function { .. })
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            IrType::Basic(name) if matches!(name.as_str(), "int" | "int8" | "int16" | "int32" | "int64")
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            IrType::Basic(name)
                if matches!(name.as_str(), "uint" | "uint8" | "uint16" | "uint32" | "uint64")
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_char(&self) -> bool {
        matches!(self, IrType::Basic(name) if name == "char")
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, IrType::Basic(name) if name == "bool")
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(
            self,
            IrType::Basic(name) if matches!(name.as_str(), "float" | "float32" | "float64")
        )
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }

    pub fn return_type(&self) -> Option<&IrType> {
        match self {
            IrType::Function { return_type, .. } => Some(return_type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Inst {
    Alloca {
        allocated: IrType,
        name: String,
    },
    Return {
        value: Option<ValueId>,
    },
    Branch {
        destination: ValueId,
        /// Incoming value for the destination's block parameter.
        argument: Option<ValueId>,
    },
    CondBranch {
        condition: ValueId,
        true_block: ValueId,
        false_block: ValueId,
    },
    Switch {
        condition: ValueId,
        default_block: ValueId,
        cases: Vec<(ValueId, ValueId)>,
    },
    Load {
        pointer: ValueId,
        name: String,
    },
    Store {
        value: ValueId,
        pointer: ValueId,
    },
    Insert {
        aggregate: ValueId,
        value: ValueId,
        index: u32,
        name: String,
    },
    Extract {
        aggregate: ValueId,
        index: u32,
        name: String,
    },
    Call {
        function: ValueId,
        args: Vec<ValueId>,
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: ValueId,
        name: String,
    },
    Gep {
        pointer: ValueId,
        indexes: Vec<ValueId>,
        name: String,
    },
    ConstGep {
        pointer: ValueId,
        index: u32,
        name: String,
    },
    Cast {
        value: ValueId,
        target: IrType,
        name: String,
    },
    Unreachable,
    Sizeof {
        ty: IrType,
        name: String,
    },
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Return { .. }
                | Inst::Branch { .. }
                | Inst::CondBranch { .. }
                | Inst::Switch { .. }
                | Inst::Unreachable
        )
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub parent: ValueId,
    pub insts: Vec<ValueId>,
    /// Acts as a phi node; fed by predecessor branch arguments.
    pub parameter: Option<ValueId>,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub mangled_name: String,
    pub return_type: IrType,
    pub params: Vec<ValueId>,
    pub blocks: Vec<ValueId>,
    pub is_extern: bool,
    pub is_variadic: bool,
    pub location: Span,
}

impl IrFunction {
    pub fn function_type(&self, module: &IrModule) -> IrType {
        IrType::Function {
            return_type: Box::new(self.return_type.clone()),
            param_types: self
                .params
                .iter()
                .map(|param| module.type_of(*param))
                .collect(),
            is_variadic: self.is_variadic,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Instruction(Inst),
    Block(Block),
    Parameter { ty: IrType, name: String },
    Function(IrFunction),
    Global {
        /// Type of the stored value; the global itself is a pointer to it.
        ty: IrType,
        initializer: Option<ValueId>,
        name: String,
    },
    ConstantInt { ty: IrType, value: i128 },
    ConstantFp { ty: IrType, value: f64 },
    ConstantBool(bool),
    ConstantString(String),
    ConstantNull { ty: IrType },
    Undefined { ty: IrType },
}

#[derive(Debug, Default)]
pub struct IrModule {
    pub name: String,
    values: Vec<Value>,
    pub functions: Vec<ValueId>,
    pub globals: Vec<ValueId>,
    /// Bodies of named structs and unions: name -> (is_union, field types).
    struct_bodies: HashMap<String, (bool, Vec<IrType>)>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn push_value(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(value);
        id
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.index()]
    }

    pub fn block(&self, id: ValueId) -> &Block {
        match self.value(id) {
            Value::Block(block) => block,
            _ => unreachable!("value {} is not a block", id),
        }
    }

    pub fn block_mut(&mut self, id: ValueId) -> &mut Block {
        match self.value_mut(id) {
            Value::Block(block) => block,
            other => unreachable!("value is not a block: {:?}", other),
        }
    }

    pub fn function(&self, id: ValueId) -> &IrFunction {
        match self.value(id) {
            Value::Function(function) => function,
            _ => unreachable!("value {} is not a function", id),
        }
    }

    pub fn function_mut(&mut self, id: ValueId) -> &mut IrFunction {
        match self.value_mut(id) {
            Value::Function(function) => function,
            other => unreachable!("value is not a function: {:?}", other),
        }
    }

    pub fn find_function(&self, mangled_name: &str) -> Option<ValueId> {
        self.functions
            .iter()
            .copied()
            .find(|id| self.function(*id).mangled_name == mangled_name)
    }

    pub fn register_struct_body(&mut self, name: &str, is_union: bool, fields: Vec<IrType>) {
        self.struct_bodies
            .entry(name.to_string())
            .or_insert((is_union, fields));
    }

    pub fn struct_body(&self, name: &str) -> Option<&(bool, Vec<IrType>)> {
        self.struct_bodies.get(name)
    }

    /// Replaces a body reserved earlier; recursive types reserve their
    /// name before lowering their fields.
    pub fn overwrite_struct_body(&mut self, name: &str, is_union: bool, fields: Vec<IrType>) {
        self.struct_bodies
            .insert(name.to_string(), (is_union, fields));
    }

    /// Field types of a named or anonymous aggregate.
    pub fn aggregate_fields(&self, ty: &IrType) -> Vec<IrType> {
        match ty {
            IrType::Struct { fields } => fields.clone(),
            IrType::NamedStruct { name } | IrType::Union { name } => self
                .struct_body(name)
                .map(|(_, fields)| fields.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// The type of any value. GEP pointee types are computed from the
    /// pointer's declared pointee.
    pub fn type_of(&self, id: ValueId) -> IrType {
        match self.value(id) {
            Value::Instruction(inst) => self.type_of_inst(inst),
            Value::Block(_) => IrType::void(),
            Value::Parameter { ty, .. } => ty.clone(),
            Value::Function(function) => function.function_type(self),
            Value::Global { ty, .. } => ty.clone().pointer_to(),
            Value::ConstantInt { ty, .. } => ty.clone(),
            Value::ConstantFp { ty, .. } => ty.clone(),
            Value::ConstantBool(_) => IrType::bool_(),
            Value::ConstantString(_) => IrType::basic("char").pointer_to(),
            Value::ConstantNull { ty } => ty.clone(),
            Value::Undefined { ty } => ty.clone(),
        }
    }

    fn type_of_inst(&self, inst: &Inst) -> IrType {
        match inst {
            Inst::Alloca { allocated, .. } => allocated.clone().pointer_to(),
            Inst::Return { .. }
            | Inst::Branch { .. }
            | Inst::CondBranch { .. }
            | Inst::Switch { .. }
            | Inst::Store { .. }
            | Inst::Unreachable => IrType::void(),
            Inst::Load { pointer, .. } => self
                .type_of(*pointer)
                .pointee()
                .cloned()
                .unwrap_or_else(IrType::void),
            Inst::Insert { aggregate, .. } => self.type_of(*aggregate),
            Inst::Extract { aggregate, index, .. } => {
                let fields = self.aggregate_fields(&self.type_of(*aggregate));
                fields.get(*index as usize).cloned().unwrap_or_else(IrType::void)
            }
            Inst::Call { function, .. } => {
                let mut ty = self.type_of(*function);
                if let IrType::Pointer(pointee) = ty {
                    ty = *pointee;
                }
                ty.return_type().cloned().unwrap_or_else(IrType::void)
            }
            Inst::Binary { op, left, .. } => {
                if op.is_comparison() || op.is_logical() {
                    IrType::bool_()
                } else {
                    self.type_of(*left)
                }
            }
            Inst::Unary { operand, .. } => self.type_of(*operand),
            Inst::Gep {
                pointer, indexes, ..
            } => {
                let mut ty = match self.type_of(*pointer).pointee() {
                    Some(pointee) => pointee.clone(),
                    None => return IrType::void().pointer_to(),
                };
                // The first index strides the pointer itself.
                for index in indexes.iter().skip(1) {
                    ty = match &ty {
                        IrType::Array { element, .. } => (**element).clone(),
                        IrType::Struct { .. } | IrType::NamedStruct { .. } | IrType::Union { .. } => {
                            let position = match self.value(*index) {
                                Value::ConstantInt { value, .. } => *value as usize,
                                _ => 0,
                            };
                            self.aggregate_fields(&ty)
                                .get(position)
                                .cloned()
                                .unwrap_or_else(IrType::void)
                        }
                        other => other.clone(),
                    };
                }
                ty.pointer_to()
            }
            Inst::ConstGep { pointer, index, .. } => {
                let pointee = match self.type_of(*pointer).pointee() {
                    Some(pointee) => pointee.clone(),
                    None => return IrType::void().pointer_to(),
                };
                self.aggregate_fields(&pointee)
                    .get(*index as usize)
                    .cloned()
                    .unwrap_or_else(IrType::void)
                    .pointer_to()
            }
            Inst::Cast { target, .. } => target.clone(),
            Inst::Sizeof { .. } => IrType::basic("uint64"),
        }
    }

    /// Predecessor blocks of `block`, in function block order.
    pub fn predecessors(&self, function: ValueId, block: ValueId) -> Vec<ValueId> {
        let mut result = Vec::new();
        for candidate in &self.function(function).blocks {
            let Some(last) = self.block(*candidate).insts.last() else {
                continue;
            };
            let targets: Vec<ValueId> = match self.value(*last) {
                Value::Instruction(Inst::Branch { destination, .. }) => vec![*destination],
                Value::Instruction(Inst::CondBranch {
                    true_block,
                    false_block,
                    ..
                }) => vec![*true_block, *false_block],
                Value::Instruction(Inst::Switch {
                    default_block,
                    cases,
                    ..
                }) => {
                    let mut targets = vec![*default_block];
                    targets.extend(cases.iter().map(|(_, block)| *block));
                    targets
                }
                _ => Vec::new(),
            };
            if targets.contains(&block) {
                result.push(*candidate);
            }
        }
        result
    }

    /// The branch argument a predecessor terminator passes into `block`.
    pub fn branch_argument(&self, predecessor: ValueId) -> Option<ValueId> {
        let last = self.block(predecessor).insts.last()?;
        match self.value(*last) {
            Value::Instruction(Inst::Branch { argument, .. }) => *argument,
            _ => None,
        }
    }
}
