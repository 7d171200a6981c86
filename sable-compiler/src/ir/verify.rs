//! Structural checks over emitted functions: exactly one terminator per
//! block, placed last, and every block reachable from entry.

use super::{Inst, IrModule, Value, ValueId};
use std::collections::HashSet;

impl IrModule {
    pub fn verify(&self) -> Result<(), String> {
        for function in &self.functions {
            if !self.function(*function).is_extern {
                self.verify_function(*function)?;
            }
        }
        Ok(())
    }

    pub fn verify_function(&self, function_id: ValueId) -> Result<(), String> {
        let function = self.function(function_id);

        for block_id in &function.blocks {
            let block = self.block(*block_id);
            let terminators = block
                .insts
                .iter()
                .filter(|inst| {
                    matches!(self.value(**inst), Value::Instruction(inst) if inst.is_terminator())
                })
                .count();

            if terminators != 1 {
                return Err(format!(
                    "block `{}` of `{}` has {} terminators",
                    block.name, function.mangled_name, terminators
                ));
            }

            let last_is_terminator = block
                .insts
                .last()
                .map(|inst| {
                    matches!(self.value(*inst), Value::Instruction(inst) if inst.is_terminator())
                })
                .unwrap_or(false);
            if !last_is_terminator {
                return Err(format!(
                    "block `{}` of `{}` does not end in a terminator",
                    block.name, function.mangled_name
                ));
            }
        }

        // Reachability from entry.
        let Some(entry) = function.blocks.first() else {
            return Err(format!("function `{}` has no blocks", function.mangled_name));
        };
        let mut reachable: HashSet<ValueId> = HashSet::new();
        let mut worklist = vec![*entry];
        while let Some(block_id) = worklist.pop() {
            if !reachable.insert(block_id) {
                continue;
            }
            let block = self.block(block_id);
            if let Some(last) = block.insts.last() {
                if let Value::Instruction(inst) = self.value(*last) {
                    for target in terminator_targets(inst) {
                        worklist.push(target);
                    }
                }
            }
        }

        for block_id in &function.blocks {
            if !reachable.contains(block_id) {
                return Err(format!(
                    "block `{}` of `{}` is unreachable from entry",
                    self.block(*block_id).name,
                    function.mangled_name
                ));
            }
        }

        Ok(())
    }
}

fn terminator_targets(inst: &Inst) -> Vec<ValueId> {
    match inst {
        Inst::Branch { destination, .. } => vec![*destination],
        Inst::CondBranch {
            true_block,
            false_block,
            ..
        } => vec![*true_block, *false_block],
        Inst::Switch {
            default_block,
            cases,
            ..
        } => {
            let mut targets = vec![*default_block];
            targets.extend(cases.iter().map(|(_, block)| *block));
            targets
        }
        _ => Vec::new(),
    }
}
