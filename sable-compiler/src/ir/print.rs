//! Deterministic textual form of the IR, used by `--emit-ir` and tests.

use super::{Inst, IrModule, IrType, Value, ValueId};
use std::collections::HashMap;
use std::fmt::Write;

impl std::fmt::Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::Basic(name) => write!(f, "{}", name),
            IrType::Pointer(pointee) => write!(f, "{}*", pointee),
            IrType::Function {
                return_type,
                param_types,
                is_variadic,
            } => {
                write!(f, "(")?;
                for (i, param) in param_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if *is_variadic {
                    if !param_types.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ") -> {}", return_type)
            }
            IrType::Array { element, size } => write!(f, "{}[{}]", element, size),
            IrType::Struct { fields } => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            IrType::NamedStruct { name } => write!(f, "%{}", name),
            IrType::Union { name } => write!(f, "%union.{}", name),
        }
    }
}

struct Printer<'m> {
    module: &'m IrModule,
    numbers: HashMap<ValueId, usize>,
    block_labels: HashMap<ValueId, String>,
    next: usize,
}

impl<'m> Printer<'m> {
    fn number(&mut self, id: ValueId) -> usize {
        if let Some(n) = self.numbers.get(&id) {
            return *n;
        }
        let n = self.next;
        self.next += 1;
        self.numbers.insert(id, n);
        n
    }

    fn operand(&mut self, id: ValueId) -> String {
        match self.module.value(id) {
            Value::ConstantInt { value, .. } => format!("{}", value),
            Value::ConstantFp { value, .. } => format!("{}", value),
            Value::ConstantBool(value) => format!("{}", value),
            Value::ConstantNull { .. } => "null".to_string(),
            Value::ConstantString(value) => format!("{:?}", value),
            Value::Undefined { .. } => "undefined".to_string(),
            Value::Global { name, .. } => format!("@{}", name),
            Value::Function(function) => format!("@{}", function.mangled_name),
            Value::Block(_) => self
                .block_labels
                .get(&id)
                .cloned()
                .unwrap_or_else(|| "<block>".to_string()),
            _ => format!("%{}", self.number(id)),
        }
    }
}

/// Prints one function; value numbering restarts per function, and block
/// labels are `<name>.<ordinal>` so output is stable across runs.
pub fn print_function(module: &IrModule, function_id: ValueId) -> String {
    let function = module.function(function_id);
    let mut printer = Printer {
        module,
        numbers: HashMap::new(),
        block_labels: HashMap::new(),
        next: 0,
    };

    for (i, block) in function.blocks.iter().enumerate() {
        let name = &module.block(*block).name;
        printer.block_labels.insert(*block, format!("{}.{}", name, i));
    }

    let mut out = String::new();
    let _ = write!(out, "define {} @{}(", function.return_type, function.mangled_name);
    for (i, param) in function.params.iter().enumerate() {
        if i > 0 {
            let _ = write!(out, ", ");
        }
        let n = printer.number(*param);
        let _ = write!(out, "{} %{}", module.type_of(*param), n);
    }
    let _ = writeln!(out, ") {{");

    for block_id in &function.blocks {
        let block = module.block(*block_id);
        let label = printer.block_labels[block_id].clone();
        match block.parameter {
            Some(parameter) => {
                let n = printer.number(parameter);
                let ty = module.type_of(parameter);
                let _ = writeln!(out, "{}(%{} {}):", label, n, ty);
            }
            None => {
                let _ = writeln!(out, "{}:", label);
            }
        }

        for inst_id in &block.insts {
            let line = print_inst(&mut printer, *inst_id);
            let _ = writeln!(out, "  {}", line);
        }
    }

    let _ = writeln!(out, "}}");
    out
}

fn print_inst(printer: &mut Printer, id: ValueId) -> String {
    let inst = match printer.module.value(id) {
        Value::Instruction(inst) => inst.clone(),
        other => return format!("<non-instruction {:?}>", other),
    };

    match inst {
        Inst::Alloca { allocated, .. } => {
            format!("%{} = alloca {}", printer.number(id), allocated)
        }
        Inst::Return { value } => match value {
            Some(value) => format!("return {}", printer.operand(value)),
            None => "return void".to_string(),
        },
        Inst::Branch {
            destination,
            argument,
        } => {
            let target = printer.operand(destination);
            match argument {
                Some(argument) => format!("goto {}({})", target, printer.operand(argument)),
                None => format!("goto {}", target),
            }
        }
        Inst::CondBranch {
            condition,
            true_block,
            false_block,
        } => format!(
            "goto {} ? {} : {}",
            printer.operand(condition),
            printer.operand(true_block),
            printer.operand(false_block)
        ),
        Inst::Switch {
            condition,
            default_block,
            cases,
        } => {
            let mut out = format!("switch {} [", printer.operand(condition));
            for (value, block) in cases {
                out.push_str(&format!("{} -> {}, ", printer.operand(value), printer.operand(block)));
            }
            out.push_str(&format!("default -> {}]", printer.operand(default_block)));
            out
        }
        Inst::Load { pointer, .. } => {
            let operand = printer.operand(pointer);
            format!("%{} = load {}", printer.number(id), operand)
        }
        Inst::Store { value, pointer } => {
            format!("store {}, {}", printer.operand(value), printer.operand(pointer))
        }
        Inst::Insert {
            aggregate,
            value,
            index,
            ..
        } => format!(
            "%{} = insert {}, {}, {}",
            printer.number(id),
            printer.operand(aggregate),
            printer.operand(value),
            index
        ),
        Inst::Extract { aggregate, index, .. } => format!(
            "%{} = extract {}, {}",
            printer.number(id),
            printer.operand(aggregate),
            index
        ),
        Inst::Call { function, args, .. } => {
            let callee = printer.operand(function);
            let args: Vec<String> = args.iter().map(|arg| printer.operand(*arg)).collect();
            let call = format!("call {}({})", callee, args.join(", "));
            let returns_void = printer
                .module
                .type_of(id)
                .is_void();
            if returns_void {
                call
            } else {
                format!("%{} = {}", printer.number(id), call)
            }
        }
        Inst::Binary { op, left, right, .. } => format!(
            "%{} = {} {} {}",
            printer.number(id),
            printer.operand(left),
            op.symbol(),
            printer.operand(right)
        ),
        Inst::Unary { op, operand, .. } => format!(
            "%{} = {:?} {}",
            printer.number(id),
            op,
            printer.operand(operand)
        ),
        Inst::Gep { pointer, indexes, .. } => {
            let indexes: Vec<String> = indexes.iter().map(|i| printer.operand(*i)).collect();
            format!(
                "%{} = gep {}, [{}]",
                printer.number(id),
                printer.operand(pointer),
                indexes.join(", ")
            )
        }
        Inst::ConstGep { pointer, index, .. } => format!(
            "%{} = gep {}, 0, {}",
            printer.number(id),
            printer.operand(pointer),
            index
        ),
        Inst::Cast { value, target, .. } => format!(
            "%{} = cast {} to {}",
            printer.number(id),
            printer.operand(value),
            target
        ),
        Inst::Unreachable => "unreachable".to_string(),
        Inst::Sizeof { ty, .. } => format!("%{} = sizeof {}", printer.number(id), ty),
    }
}

impl std::fmt::Display for IrModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for global in &self.globals {
            if let Value::Global { ty, name, .. } = self.value(*global) {
                writeln!(f, "global {} @{}", ty, name)?;
            }
        }
        for function in &self.functions {
            if self.function(*function).is_extern {
                writeln!(f, "declare @{}", self.function(*function).mangled_name)?;
            } else {
                writeln!(f, "{}", print_function(self, *function))?;
            }
        }
        Ok(())
    }
}
