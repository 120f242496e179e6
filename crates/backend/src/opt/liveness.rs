//! Liveness of shared-memory symbols.

use std::collections::BTreeSet;

use crate::instructions::Instruction;
use crate::ir::Ir;
use crate::symbol::{SymbolId, SymbolKind};

/// Backward sweep over the program.
///
/// A gemm uses its shared-memory operands; a loader or a register-to-shared
/// store defines its destination. Entry `i` of the result is the set of
/// shared-memory symbols live just before program position `i`; the extra
/// trailing entry is the (empty) set after the last instruction.
#[must_use]
pub fn analyze(ir: &Ir) -> Vec<BTreeSet<SymbolId>> {
    let num_instrs = ir.program.len();
    let mut live_map = vec![BTreeSet::new(); num_instrs + 1];

    for index in (0..num_instrs).rev() {
        let mut live = live_map[index + 1].clone();
        match ir.instr(ir.program[index]) {
            Instruction::Gemm(gemm) => {
                for operand in [gemm.op1, gemm.op2] {
                    if ir.symbols[operand].kind == SymbolKind::SharedMem {
                        live.insert(operand);
                    }
                }
            }
            Instruction::LoadToShared(load) => {
                live.remove(&load.dest);
            }
            Instruction::StoreRegToShr(store) => {
                live.remove(&store.dest);
            }
            _ => {}
        }
        live_map[index] = live;
    }
    live_map
}
