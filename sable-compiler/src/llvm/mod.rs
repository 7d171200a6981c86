//! IR to LLVM lowering via inkwell, plus the JIT / object-code surface.
//!
//! A pure translation: IR types map to LLVM types (named structs cached by
//! struct identity), each instruction maps to the corresponding builder
//! call, and block parameters become phi nodes fed from predecessor
//! terminators. Each emitted function is verified.

use crate::ir::{Inst, IrFunction, IrModule, IrType, Value, ValueId};
use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetData, TargetMachine,
};
use inkwell::types::{
    AnyType, BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, StructType,
};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, PhiValue, PointerValue,
};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate, OptimizationLevel};
use sable_ast::{BinaryOp, UnaryOp};
use std::collections::HashMap;

/// Hidden-pointer return threshold, measured on the target's data layout.
const SRET_MAX_RETURN_SIZE: u64 = 16;

pub struct LlvmGenerator<'ctx, 'ir> {
    context: &'ctx Context,
    pub module: Module<'ctx>,
    builder: Builder<'ctx>,
    target_machine: TargetMachine,
    target_data: TargetData,
    ir: &'ir IrModule,

    values: HashMap<ValueId, BasicValueEnum<'ctx>>,
    functions: HashMap<ValueId, FunctionValue<'ctx>>,
    blocks: HashMap<ValueId, BasicBlock<'ctx>>,
    phis: HashMap<ValueId, PhiValue<'ctx>>,
    structs: HashMap<String, StructType<'ctx>>,
    strings: HashMap<String, PointerValue<'ctx>>,
    is_current_function_sret: bool,
}

impl<'ctx, 'ir> LlvmGenerator<'ctx, 'ir> {
    pub fn new(context: &'ctx Context, ir: &'ir IrModule) -> Result<Self, String> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(|e| format!("failed to initialize native target: {}", e))?;

        let triple = TargetMachine::get_default_triple();
        let target =
            Target::from_triple(&triple).map_err(|e| format!("invalid target triple: {}", e))?;
        let target_machine = target
            .create_target_machine(
                &triple,
                "generic",
                "",
                OptimizationLevel::Default,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .ok_or_else(|| "failed to create a target machine".to_string())?;
        let target_data = target_machine.get_target_data();

        let module = context.create_module(&ir.name);
        module.set_triple(&triple);
        let builder = context.create_builder();

        Ok(Self {
            context,
            module,
            builder,
            target_machine,
            target_data,
            ir,
            values: HashMap::new(),
            functions: HashMap::new(),
            blocks: HashMap::new(),
            phis: HashMap::new(),
            structs: HashMap::new(),
            strings: HashMap::new(),
            is_current_function_sret: false,
        })
    }

    pub fn codegen_module(&mut self) -> Result<(), String> {
        log::debug!("lowering IR module `{}` to LLVM", self.ir.name);
        for global in &self.ir.globals {
            self.codegen_global(*global)?;
        }
        for function in self.ir.functions.clone() {
            self.codegen_function(function)?;
        }
        Ok(())
    }

    // ==================== Types ====================

    fn builtin_type(&self, name: &str) -> Option<BasicTypeEnum<'ctx>> {
        let ty = match name {
            "bool" => self.context.bool_type().into(),
            "char" | "int8" | "uint8" => self.context.i8_type().into(),
            "int16" | "uint16" => self.context.i16_type().into(),
            "int" | "int32" | "uint" | "uint32" => self.context.i32_type().into(),
            "int64" | "uint64" => self.context.i64_type().into(),
            "float" | "float32" => self.context.f32_type().into(),
            "float64" => self.context.f64_type().into(),
            _ => return None,
        };
        Some(ty)
    }

    fn get_struct_type(&mut self, name: &str) -> Result<StructType<'ctx>, String> {
        if let Some(existing) = self.structs.get(name) {
            return Ok(*existing);
        }

        let (is_union, fields) = self
            .ir
            .struct_body(name)
            .cloned()
            .ok_or_else(|| format!("unknown struct `{}`", name))?;

        let llvm_struct = self.context.opaque_struct_type(name);
        self.structs.insert(name.to_string(), llvm_struct);

        if is_union {
            // Unions become a single-field struct sized by the largest
            // variant.
            let mut largest: Option<BasicTypeEnum> = None;
            let mut largest_size = 0;
            for field in &fields {
                let field_type = self.basic_type(field)?;
                let size = self.target_data.get_store_size(&field_type);
                if size > largest_size || largest.is_none() {
                    largest = Some(field_type);
                    largest_size = size;
                }
            }
            match largest {
                Some(field) => llvm_struct.set_body(&[field], false),
                None => llvm_struct.set_body(&[], false),
            };
        } else {
            let mut lowered = Vec::with_capacity(fields.len());
            for field in &fields {
                lowered.push(self.basic_type(field)?);
            }
            llvm_struct.set_body(&lowered, false);
        }
        Ok(llvm_struct)
    }

    /// Value types. `void` has no basic lowering and is handled at
    /// function boundaries.
    fn basic_type(&mut self, ty: &IrType) -> Result<BasicTypeEnum<'ctx>, String> {
        match ty {
            IrType::Basic(name) => self
                .builtin_type(name)
                .ok_or_else(|| format!("type `{}` has no value representation", name)),
            IrType::Pointer(pointee) => {
                // Opaque pointers: `void*` decays to `i8*`.
                let pointee_ty = if pointee.is_void() || pointee.is_function() {
                    self.context.i8_type().into()
                } else {
                    self.basic_type(pointee)?
                };
                Ok(pointee_ty.ptr_type(AddressSpace::default()).into())
            }
            IrType::Array { element, size } => {
                let element = self.basic_type(element)?;
                Ok(element.array_type(*size).into())
            }
            IrType::Struct { fields } => {
                let mut lowered = Vec::with_capacity(fields.len());
                for field in fields {
                    lowered.push(self.basic_type(field)?);
                }
                Ok(self.context.struct_type(&lowered, false).into())
            }
            IrType::NamedStruct { name } | IrType::Union { name } => {
                Ok(self.get_struct_type(name)?.into())
            }
            IrType::Function { .. } => {
                // Function values are used through pointers.
                Ok(self
                    .context
                    .i8_type()
                    .ptr_type(AddressSpace::default())
                    .into())
            }
        }
    }

    fn should_use_sret(&mut self, return_type: &IrType) -> Result<bool, String> {
        if return_type.is_void() {
            return Ok(false);
        }
        let llvm_ty = self.basic_type(return_type)?;
        Ok(self.target_data.get_store_size(&llvm_ty) > SRET_MAX_RETURN_SIZE)
    }

    /// Use a hidden sret pointer parameter to return larger aggregates,
    /// staying compatible with the C calling convention.
    fn function_type(
        &mut self,
        function: &IrFunction,
    ) -> Result<(FunctionType<'ctx>, bool), String> {
        let mut param_types: Vec<BasicMetadataTypeEnum> = Vec::new();

        let is_sret = self.should_use_sret(&function.return_type)?;
        if is_sret {
            let return_ty = self.basic_type(&function.return_type)?;
            param_types.push(return_ty.ptr_type(AddressSpace::default()).into());
        }

        for param in &function.params {
            let ty = self.ir.type_of(*param);
            param_types.push(self.basic_type(&ty)?.into());
        }

        let fn_type = if is_sret || function.return_type.is_void() {
            self.context
                .void_type()
                .fn_type(&param_types, function.is_variadic)
        } else {
            self.basic_type(&function.return_type)?
                .fn_type(&param_types, function.is_variadic)
        };
        Ok((fn_type, is_sret))
    }

    // ==================== Functions ====================

    fn get_function(&mut self, id: ValueId) -> Result<FunctionValue<'ctx>, String> {
        if let Some(existing) = self.functions.get(&id) {
            return Ok(*existing);
        }

        let function = self.ir.function(id);
        if let Some(existing) = self.module.get_function(&function.mangled_name) {
            self.functions.insert(id, existing);
            return Ok(existing);
        }

        let (fn_type, is_sret) = self.function_type(function)?;
        let llvm_function = self
            .module
            .add_function(&function.mangled_name, fn_type, None);

        let mut arg_offset = 0;
        if is_sret {
            let sret_ty = self.basic_type(&function.return_type)?;
            let kind_id = Attribute::get_named_enum_kind_id("sret");
            let attribute = self
                .context
                .create_type_attribute(kind_id, sret_ty.as_any_type_enum());
            llvm_function.add_attribute(AttributeLoc::Param(0), attribute);
            if let Some(arg) = llvm_function.get_nth_param(0) {
                arg.set_name("sret.arg");
            }
            arg_offset = 1;
        }

        for (i, param) in function.params.iter().enumerate() {
            if let Some(arg) = llvm_function.get_nth_param((i + arg_offset) as u32) {
                if let Value::Parameter { name, .. } = self.ir.value(*param) {
                    arg.set_name(name);
                }
            }
        }

        self.functions.insert(id, llvm_function);
        Ok(llvm_function)
    }

    fn codegen_function(&mut self, id: ValueId) -> Result<(), String> {
        let llvm_function = self.get_function(id)?;
        let function = self.ir.function(id);

        if function.is_extern || function.blocks.is_empty() {
            return Ok(());
        }
        if llvm_function.count_basic_blocks() > 0 {
            return Ok(());
        }

        self.codegen_function_body(id, llvm_function)?;

        if !llvm_function.verify(true) {
            return Err(format!(
                "LLVM function verification failed for `{}`",
                function.mangled_name
            ));
        }
        Ok(())
    }

    fn codegen_function_body(
        &mut self,
        id: ValueId,
        llvm_function: FunctionValue<'ctx>,
    ) -> Result<(), String> {
        let function = self.ir.function(id);
        self.is_current_function_sret = self.should_use_sret(&function.return_type)?;

        // Bind parameters, shifted past the hidden sret slot.
        let offset = if self.is_current_function_sret { 1 } else { 0 };
        for (i, param) in function.params.iter().enumerate() {
            if let Some(arg) = llvm_function.get_nth_param((i + offset) as u32) {
                self.values.insert(*param, arg);
            }
        }

        // Create every block first; forward branches need targets.
        for block_id in &function.blocks {
            let block = self.ir.block(*block_id);
            let llvm_block = self.context.append_basic_block(llvm_function, &block.name);
            self.blocks.insert(*block_id, llvm_block);
        }

        for block_id in &function.blocks {
            let llvm_block = self.blocks[block_id];
            self.builder.position_at_end(llvm_block);

            // A block parameter becomes a phi; incoming edges are filled
            // in once every predecessor has been generated.
            if let Some(parameter) = self.ir.block(*block_id).parameter {
                let ty = self.ir.type_of(parameter);
                let llvm_ty = self.basic_type(&ty)?;
                let phi = self
                    .builder
                    .build_phi(llvm_ty, "phi")
                    .map_err(|e| format!("failed to build phi: {}", e))?;
                self.phis.insert(*block_id, phi);
                self.values.insert(parameter, phi.as_basic_value());
            }

            for inst_id in self.ir.block(*block_id).insts.clone() {
                if let Some(value) = self.codegen_inst(inst_id)? {
                    self.values.insert(inst_id, value);
                }
            }
        }

        // Install phi incomings by scanning predecessor terminators.
        for block_id in &function.blocks {
            let Some(phi) = self.phis.get(block_id).copied() else {
                continue;
            };
            for predecessor in self.ir.predecessors(id, *block_id) {
                let Some(argument) = self.ir.branch_argument(predecessor) else {
                    continue;
                };
                let value = self.get_value(argument)?;
                let llvm_block = self.blocks[&predecessor];
                phi.add_incoming(&[(&value as &dyn BasicValue, llvm_block)]);
            }
        }

        Ok(())
    }

    // ==================== Values ====================

    fn string_pointer(&mut self, text: &str) -> Result<PointerValue<'ctx>, String> {
        if let Some(existing) = self.strings.get(text) {
            return Ok(*existing);
        }
        let name = format!("str.{}", self.strings.len());
        let initializer = self.context.const_string(text.as_bytes(), true);
        let global = self.module.add_global(initializer.get_type(), None, &name);
        global.set_initializer(&initializer);
        global.set_linkage(Linkage::Private);
        global.set_constant(true);
        let pointer = global.as_pointer_value();
        self.strings.insert(text.to_string(), pointer);
        Ok(pointer)
    }

    fn get_value(&mut self, id: ValueId) -> Result<BasicValueEnum<'ctx>, String> {
        if let Some(existing) = self.values.get(&id) {
            return Ok(*existing);
        }

        let value = match self.ir.value(id) {
            Value::ConstantInt { ty, value } => {
                let llvm_ty = self.basic_type(ty)?.into_int_type();
                llvm_ty
                    .const_int(*value as u64, ty.is_signed_integer())
                    .into()
            }
            Value::ConstantFp { ty, value } => {
                let llvm_ty = self.basic_type(ty)?.into_float_type();
                llvm_ty.const_float(*value).into()
            }
            Value::ConstantBool(value) => self
                .context
                .bool_type()
                .const_int(u64::from(*value), false)
                .into(),
            Value::ConstantString(text) => {
                let text = text.clone();
                self.string_pointer(&text)?.into()
            }
            Value::ConstantNull { ty } => {
                let llvm_ty = self.basic_type(ty)?;
                match llvm_ty {
                    BasicTypeEnum::PointerType(ptr) => ptr.const_null().into(),
                    other => other.const_zero(),
                }
            }
            Value::Undefined { ty } => {
                let llvm_ty = self.basic_type(ty)?;
                undef_of(llvm_ty)
            }
            Value::Function(_) => {
                let function = self.get_function(id)?;
                function.as_global_value().as_pointer_value().into()
            }
            Value::Global { .. } => {
                return Err("global referenced before emission".to_string());
            }
            other => {
                return Err(format!("value has no LLVM lowering: {:?}", other));
            }
        };

        self.values.insert(id, value);
        Ok(value)
    }

    fn get_basic_block(&self, id: ValueId) -> Result<BasicBlock<'ctx>, String> {
        self.blocks
            .get(&id)
            .copied()
            .ok_or_else(|| "branch to an unknown block".to_string())
    }

    fn codegen_global(&mut self, id: ValueId) -> Result<(), String> {
        let (ty, initializer, name) = match self.ir.value(id) {
            Value::Global {
                ty,
                initializer,
                name,
            } => (ty.clone(), *initializer, name.clone()),
            _ => return Err("not a global".to_string()),
        };

        let llvm_ty = self.basic_type(&ty)?;
        let global = self.module.add_global(llvm_ty, None, &name);

        match initializer {
            Some(initializer) => {
                let value = self.get_value(initializer)?;
                global.set_initializer(&value);
                global.set_linkage(Linkage::Private);
            }
            None => {
                global.set_initializer(&llvm_ty.const_zero());
            }
        }

        self.values.insert(id, global.as_pointer_value().into());
        Ok(())
    }

    // ==================== Instructions ====================

    fn codegen_inst(&mut self, id: ValueId) -> Result<Option<BasicValueEnum<'ctx>>, String> {
        let inst = match self.ir.value(id) {
            Value::Instruction(inst) => inst.clone(),
            _ => return Err("not an instruction".to_string()),
        };

        let err = |e| format!("builder error: {}", e);

        match inst {
            Inst::Alloca { allocated, name } => {
                let ty = self.basic_type(&allocated)?;
                let value = self.builder.build_alloca(ty, &name).map_err(err)?;
                Ok(Some(value.into()))
            }
            Inst::Return { value } => {
                if self.is_current_function_sret {
                    let current = self
                        .builder
                        .get_insert_block()
                        .and_then(|b| b.get_parent())
                        .ok_or_else(|| "return outside a function".to_string())?;
                    if let Some(value) = value {
                        let value = self.get_value(value)?;
                        let sret = current
                            .get_nth_param(0)
                            .ok_or_else(|| "missing sret parameter".to_string())?;
                        self.builder
                            .build_store(sret.into_pointer_value(), value)
                            .map_err(err)?;
                    }
                    self.builder.build_return(None).map_err(err)?;
                    return Ok(None);
                }
                match value {
                    Some(value) => {
                        let value = self.get_value(value)?;
                        self.builder.build_return(Some(&value)).map_err(err)?;
                    }
                    None => {
                        self.builder.build_return(None).map_err(err)?;
                    }
                }
                Ok(None)
            }
            Inst::Branch { destination, .. } => {
                let block = self.get_basic_block(destination)?;
                self.builder.build_unconditional_branch(block).map_err(err)?;
                Ok(None)
            }
            Inst::CondBranch {
                condition,
                true_block,
                false_block,
            } => {
                let condition = self.get_value(condition)?.into_int_value();
                let true_block = self.get_basic_block(true_block)?;
                let false_block = self.get_basic_block(false_block)?;
                self.builder
                    .build_conditional_branch(condition, true_block, false_block)
                    .map_err(err)?;
                Ok(None)
            }
            Inst::Switch {
                condition,
                default_block,
                cases,
            } => {
                let condition = self.get_value(condition)?.into_int_value();
                let default_block = self.get_basic_block(default_block)?;
                let mut llvm_cases = Vec::with_capacity(cases.len());
                for (value, block) in cases {
                    let value = self.get_value(value)?.into_int_value();
                    let block = self.get_basic_block(block)?;
                    llvm_cases.push((value, block));
                }
                self.builder
                    .build_switch(condition, default_block, &llvm_cases)
                    .map_err(err)?;
                Ok(None)
            }
            Inst::Load { pointer, name } => {
                let loaded_ty = self.ir.type_of(id);
                let llvm_ty = self.basic_type(&loaded_ty)?;
                let pointer = self.get_value(pointer)?.into_pointer_value();
                let value = self.builder.build_load(llvm_ty, pointer, &name).map_err(err)?;
                Ok(Some(value))
            }
            Inst::Store { value, pointer } => {
                let value = self.get_value(value)?;
                let pointer = self.get_value(pointer)?.into_pointer_value();
                self.builder.build_store(pointer, value).map_err(err)?;
                Ok(None)
            }
            Inst::Insert {
                aggregate,
                value,
                index,
                name,
            } => {
                let aggregate = self.get_value(aggregate)?.into_struct_value();
                let value = self.get_value(value)?;
                let result = self
                    .builder
                    .build_insert_value(aggregate, value, index, &name)
                    .map_err(err)?;
                Ok(Some(result.as_basic_value_enum()))
            }
            Inst::Extract {
                aggregate,
                index,
                name,
            } => {
                let aggregate = self.get_value(aggregate)?.into_struct_value();
                let value = self
                    .builder
                    .build_extract_value(aggregate, index, &name)
                    .map_err(err)?;
                Ok(Some(value))
            }
            Inst::Call {
                function,
                args,
                name,
            } => self.codegen_call(id, function, &args, &name),
            Inst::Binary {
                op,
                left,
                right,
                name,
            } => {
                let value = self.codegen_binary(op, left, right, &name)?;
                Ok(Some(value))
            }
            Inst::Unary { op, operand, name } => {
                let operand_ty = self.ir.type_of(operand);
                let operand = self.get_value(operand)?;
                let value = match op {
                    UnaryOp::Negate => {
                        if operand_ty.is_floating_point() {
                            self.builder
                                .build_float_neg(operand.into_float_value(), &name)
                                .map_err(err)?
                                .into()
                        } else {
                            self.builder
                                .build_int_neg(operand.into_int_value(), &name)
                                .map_err(err)?
                                .into()
                        }
                    }
                    UnaryOp::Not | UnaryOp::BitwiseNot => self
                        .builder
                        .build_not(operand.into_int_value(), &name)
                        .map_err(err)?
                        .into(),
                    UnaryOp::Deref | UnaryOp::AddressOf => {
                        return Err("deref/addrof should be lowered before LLVM".to_string())
                    }
                };
                Ok(Some(value))
            }
            Inst::Gep {
                pointer, indexes, ..
            } => {
                let pointee = self
                    .ir
                    .type_of(pointer)
                    .pointee()
                    .cloned()
                    .ok_or_else(|| "GEP through a non-pointer".to_string())?;
                let pointee_ty = self.basic_type(&pointee)?;
                let pointer = self.get_value(pointer)?.into_pointer_value();
                let mut llvm_indexes = Vec::with_capacity(indexes.len());
                for index in indexes {
                    llvm_indexes.push(self.get_value(index)?.into_int_value());
                }
                let value = unsafe {
                    self.builder
                        .build_in_bounds_gep(pointee_ty, pointer, &llvm_indexes, "gep")
                        .map_err(err)?
                };
                Ok(Some(value.into()))
            }
            Inst::ConstGep {
                pointer,
                index,
                name,
            } => {
                let pointee = self
                    .ir
                    .type_of(pointer)
                    .pointee()
                    .cloned()
                    .ok_or_else(|| "GEP through a non-pointer".to_string())?;
                let pointee_ty = self.basic_type(&pointee)?.into_struct_type();
                let pointer = self.get_value(pointer)?.into_pointer_value();
                let value = self
                    .builder
                    .build_struct_gep(pointee_ty, pointer, index, &name)
                    .map_err(|e| format!("struct gep failed: {:?}", e))?;
                Ok(Some(value.into()))
            }
            Inst::Cast {
                value,
                target,
                name,
            } => {
                let source_ty = self.ir.type_of(value);
                let value = self.get_value(value)?;
                let result = self.codegen_cast(value, &source_ty, &target, &name)?;
                Ok(Some(result))
            }
            Inst::Unreachable => {
                self.builder.build_unreachable().map_err(err)?;
                Ok(None)
            }
            Inst::Sizeof { ty, .. } => {
                let llvm_ty = self.basic_type(&ty)?;
                let size = self.target_data.get_store_size(&llvm_ty);
                Ok(Some(self.context.i64_type().const_int(size, false).into()))
            }
        }
    }

    fn codegen_call(
        &mut self,
        _id: ValueId,
        function: ValueId,
        args: &[ValueId],
        name: &str,
    ) -> Result<Option<BasicValueEnum<'ctx>>, String> {
        let err = |e| format!("builder error: {}", e);

        let mut callee_ty = self.ir.type_of(function);
        if let IrType::Pointer(pointee) = &callee_ty {
            if pointee.is_function() {
                callee_ty = (**pointee).clone();
            }
        }
        let return_type = callee_ty
            .return_type()
            .cloned()
            .ok_or_else(|| "call through a non-function".to_string())?;
        let is_sret = self.should_use_sret(&return_type)?;

        let mut llvm_args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len() + 1);

        // Large returns go through a caller-allocated slot and a reload.
        let sret_slot = if is_sret {
            let sret_ty = self.basic_type(&return_type)?;
            let slot = self
                .builder
                .build_alloca(sret_ty, "sret.alloca")
                .map_err(err)?;
            llvm_args.push(slot.into());
            Some((slot, sret_ty))
        } else {
            None
        };

        for arg in args {
            llvm_args.push(self.get_value(*arg)?.into());
        }

        let call_site = match self.ir.value(function) {
            Value::Function(_) => {
                let callee = self.get_function(function)?;
                self.builder
                    .build_call(callee, &llvm_args, name)
                    .map_err(err)?
            }
            _ => {
                // Indirect call through a function pointer.
                let (param_types, is_variadic) = match &callee_ty {
                    IrType::Function {
                        param_types,
                        is_variadic,
                        ..
                    } => (param_types.clone(), *is_variadic),
                    _ => return Err("call through a non-function".to_string()),
                };
                let mut llvm_params: Vec<BasicMetadataTypeEnum> = Vec::new();
                for param in &param_types {
                    llvm_params.push(self.basic_type(param)?.into());
                }
                let fn_type = if return_type.is_void() {
                    self.context.void_type().fn_type(&llvm_params, is_variadic)
                } else {
                    self.basic_type(&return_type)?.fn_type(&llvm_params, is_variadic)
                };
                let pointer = self.get_value(function)?.into_pointer_value();
                self.builder
                    .build_indirect_call(fn_type, pointer, &llvm_args, name)
                    .map_err(err)?
            }
        };

        if let Some((slot, sret_ty)) = sret_slot {
            let value = self
                .builder
                .build_load(sret_ty, slot, "sret.load")
                .map_err(err)?;
            return Ok(Some(value));
        }

        Ok(call_site.try_as_basic_value().left())
    }

    fn codegen_binary(
        &mut self,
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
        name: &str,
    ) -> Result<BasicValueEnum<'ctx>, String> {
        let err = |e| format!("builder error: {}", e);
        let operand_ty = self.ir.type_of(left);
        let is_float = operand_ty.is_floating_point();
        let is_signed = operand_ty.is_signed_integer();

        let lhs = self.get_value(left)?;
        let rhs = self.get_value(right)?;

        if is_float {
            let l = lhs.into_float_value();
            let r = rhs.into_float_value();
            let value: BasicValueEnum = match op {
                BinaryOp::Add => self.builder.build_float_add(l, r, name).map_err(err)?.into(),
                BinaryOp::Sub => self.builder.build_float_sub(l, r, name).map_err(err)?.into(),
                BinaryOp::Mul => self.builder.build_float_mul(l, r, name).map_err(err)?.into(),
                BinaryOp::Div => self.builder.build_float_div(l, r, name).map_err(err)?.into(),
                BinaryOp::Mod => self.builder.build_float_rem(l, r, name).map_err(err)?.into(),
                BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessOrEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterOrEqual => {
                    let predicate = match op {
                        BinaryOp::Equal => FloatPredicate::OEQ,
                        BinaryOp::NotEqual => FloatPredicate::ONE,
                        BinaryOp::Less => FloatPredicate::OLT,
                        BinaryOp::LessOrEqual => FloatPredicate::OLE,
                        BinaryOp::Greater => FloatPredicate::OGT,
                        _ => FloatPredicate::OGE,
                    };
                    self.builder
                        .build_float_compare(predicate, l, r, name)
                        .map_err(err)?
                        .into()
                }
                other => return Err(format!("operator `{}` on floats", other.symbol())),
            };
            return Ok(value);
        }

        // Pointer comparisons go through pointer-int casts.
        if matches!(self.ir.type_of(left), IrType::Pointer(_)) && op.is_comparison() {
            let l = self
                .builder
                .build_ptr_to_int(lhs.into_pointer_value(), self.context.i64_type(), "ptr.l")
                .map_err(err)?;
            let r = self
                .builder
                .build_ptr_to_int(rhs.into_pointer_value(), self.context.i64_type(), "ptr.r")
                .map_err(err)?;
            let predicate = int_predicate(op, false);
            return Ok(self
                .builder
                .build_int_compare(predicate, l, r, name)
                .map_err(err)?
                .into());
        }

        let l = lhs.into_int_value();
        let r = rhs.into_int_value();
        let value: BasicValueEnum = match op {
            BinaryOp::Add => self.builder.build_int_add(l, r, name).map_err(err)?.into(),
            BinaryOp::Sub => self.builder.build_int_sub(l, r, name).map_err(err)?.into(),
            BinaryOp::Mul => self.builder.build_int_mul(l, r, name).map_err(err)?.into(),
            BinaryOp::Div => {
                if is_signed {
                    self.builder
                        .build_int_signed_div(l, r, name)
                        .map_err(err)?
                        .into()
                } else {
                    self.builder
                        .build_int_unsigned_div(l, r, name)
                        .map_err(err)?
                        .into()
                }
            }
            BinaryOp::Mod => {
                if is_signed {
                    self.builder
                        .build_int_signed_rem(l, r, name)
                        .map_err(err)?
                        .into()
                } else {
                    self.builder
                        .build_int_unsigned_rem(l, r, name)
                        .map_err(err)?
                        .into()
                }
            }
            BinaryOp::BitAnd | BinaryOp::LogicalAnd => {
                self.builder.build_and(l, r, name).map_err(err)?.into()
            }
            BinaryOp::BitOr | BinaryOp::LogicalOr => {
                self.builder.build_or(l, r, name).map_err(err)?.into()
            }
            BinaryOp::BitXor => self.builder.build_xor(l, r, name).map_err(err)?.into(),
            BinaryOp::Shl => self.builder.build_left_shift(l, r, name).map_err(err)?.into(),
            BinaryOp::Shr => self
                .builder
                .build_right_shift(l, r, is_signed, name)
                .map_err(err)?
                .into(),
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessOrEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterOrEqual => {
                let predicate = int_predicate(op, is_signed);
                self.builder
                    .build_int_compare(predicate, l, r, name)
                    .map_err(err)?
                    .into()
            }
        };
        Ok(value)
    }

    /// Casts specialize on source and target kind: integer resize with the
    /// source's signedness, int<->float, and bit/pointer reinterpretation.
    fn codegen_cast(
        &mut self,
        value: BasicValueEnum<'ctx>,
        source: &IrType,
        target: &IrType,
        name: &str,
    ) -> Result<BasicValueEnum<'ctx>, String> {
        let err = |e| format!("builder error: {}", e);
        let target_llvm = self.basic_type(target)?;

        if (source.is_integer() || source.is_char() || source.is_bool()) && target.is_integer() {
            return Ok(self
                .builder
                .build_int_cast_sign_flag(
                    value.into_int_value(),
                    target_llvm.into_int_type(),
                    source.is_signed_integer(),
                    name,
                )
                .map_err(err)?
                .into());
        }
        if source.is_integer() && (target.is_char() || target.is_bool()) {
            return Ok(self
                .builder
                .build_int_cast_sign_flag(
                    value.into_int_value(),
                    target_llvm.into_int_type(),
                    source.is_signed_integer(),
                    name,
                )
                .map_err(err)?
                .into());
        }
        if source.is_floating_point() {
            if target.is_signed_integer() {
                return Ok(self
                    .builder
                    .build_float_to_signed_int(
                        value.into_float_value(),
                        target_llvm.into_int_type(),
                        name,
                    )
                    .map_err(err)?
                    .into());
            }
            if target.is_unsigned_integer() {
                return Ok(self
                    .builder
                    .build_float_to_unsigned_int(
                        value.into_float_value(),
                        target_llvm.into_int_type(),
                        name,
                    )
                    .map_err(err)?
                    .into());
            }
            if target.is_floating_point() {
                return Ok(self
                    .builder
                    .build_float_cast(
                        value.into_float_value(),
                        target_llvm.into_float_type(),
                        name,
                    )
                    .map_err(err)?
                    .into());
            }
        }
        if target.is_floating_point() && source.is_integer() {
            if source.is_signed_integer() {
                return Ok(self
                    .builder
                    .build_signed_int_to_float(
                        value.into_int_value(),
                        target_llvm.into_float_type(),
                        name,
                    )
                    .map_err(err)?
                    .into());
            }
            return Ok(self
                .builder
                .build_unsigned_int_to_float(
                    value.into_int_value(),
                    target_llvm.into_float_type(),
                    name,
                )
                .map_err(err)?
                .into());
        }
        if source.is_pointer() && target.is_integer() {
            return Ok(self
                .builder
                .build_ptr_to_int(value.into_pointer_value(), target_llvm.into_int_type(), name)
                .map_err(err)?
                .into());
        }
        if source.is_integer() && target.is_pointer() {
            return Ok(self
                .builder
                .build_int_to_ptr(
                    value.into_int_value(),
                    target_llvm.into_pointer_type(),
                    name,
                )
                .map_err(err)?
                .into());
        }
        if source.is_pointer() && target.is_pointer() {
            return Ok(self
                .builder
                .build_pointer_cast(
                    value.into_pointer_value(),
                    target_llvm.into_pointer_type(),
                    name,
                )
                .map_err(err)?
                .into());
        }

        self.builder
            .build_bit_cast(value, target_llvm, name)
            .map_err(err)
    }

    // ==================== Output ====================

    pub fn write_object_file(&self, output_path: &std::path::Path) -> Result<(), String> {
        self.target_machine
            .write_to_file(&self.module, FileType::Object, output_path)
            .map_err(|e| format!("failed to write object file: {}", e))
    }

    pub fn print_to_string(&self) -> String {
        self.module.print_to_string().to_string()
    }
}

fn int_predicate(op: BinaryOp, is_signed: bool) -> IntPredicate {
    match op {
        BinaryOp::Equal => IntPredicate::EQ,
        BinaryOp::NotEqual => IntPredicate::NE,
        BinaryOp::Less => {
            if is_signed {
                IntPredicate::SLT
            } else {
                IntPredicate::ULT
            }
        }
        BinaryOp::LessOrEqual => {
            if is_signed {
                IntPredicate::SLE
            } else {
                IntPredicate::ULE
            }
        }
        BinaryOp::Greater => {
            if is_signed {
                IntPredicate::SGT
            } else {
                IntPredicate::UGT
            }
        }
        _ => {
            if is_signed {
                IntPredicate::SGE
            } else {
                IntPredicate::UGE
            }
        }
    }
}

fn undef_of(ty: BasicTypeEnum) -> BasicValueEnum {
    match ty {
        BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
        BasicTypeEnum::FloatType(t) => t.get_undef().into(),
        BasicTypeEnum::IntType(t) => t.get_undef().into(),
        BasicTypeEnum::PointerType(t) => t.get_undef().into(),
        BasicTypeEnum::StructType(t) => t.get_undef().into(),
        BasicTypeEnum::VectorType(t) => t.get_undef().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.get_undef().into(),
    }
}

/// A compiled module: object-code emission and JIT execution, the
/// embedding surface of the compiler.
pub struct CompiledModule<'ctx> {
    pub module: Module<'ctx>,
    target_machine: TargetMachine,
    engine: Option<inkwell::execution_engine::ExecutionEngine<'ctx>>,
}

impl<'ctx> CompiledModule<'ctx> {
    pub(crate) fn new(module: Module<'ctx>, target_machine: TargetMachine) -> Self {
        Self {
            module,
            target_machine,
            engine: None,
        }
    }

    pub fn write_object_file(&self, output_path: &std::path::Path) -> Result<(), String> {
        self.target_machine
            .write_to_file(&self.module, FileType::Object, output_path)
            .map_err(|e| format!("failed to write object file: {}", e))
    }

    pub fn print_llvm_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    fn engine(
        &mut self,
    ) -> Result<&inkwell::execution_engine::ExecutionEngine<'ctx>, String> {
        if self.engine.is_none() {
            let engine = self
                .module
                .create_jit_execution_engine(OptimizationLevel::None)
                .map_err(|e| format!("failed to create JIT engine: {}", e))?;
            self.engine = Some(engine);
        }
        match &self.engine {
            Some(engine) => Ok(engine),
            None => Err("JIT engine unavailable".to_string()),
        }
    }

    /// Opaque function pointer for a compiled function, suitable for
    /// invocation by the embedder.
    pub fn function_address(&mut self, name: &str) -> Result<usize, String> {
        let engine = self.engine()?;
        engine
            .get_function_address(name)
            .map_err(|e| format!("function `{}` not found: {}", name, e))
    }

    /// JIT-executes `main` and returns its exit value.
    pub fn run_main(&mut self) -> Result<i32, String> {
        let engine = self.engine()?;
        let main = unsafe {
            engine
                .get_function::<unsafe extern "C" fn() -> i32>("main")
                .map_err(|e| format!("`main` not found: {}", e))?
        };
        Ok(unsafe { main.call() })
    }
}

impl<'ctx, 'ir> LlvmGenerator<'ctx, 'ir> {
    pub fn into_compiled(self) -> CompiledModule<'ctx> {
        CompiledModule::new(self.module, self.target_machine)
    }
}
