//! Dead-instruction removal.

use crate::instructions::Instruction;
use crate::ir::Ir;

/// Drop instructions that cannot affect the result.
///
/// Everything after the last global store is dead (the trailing register
/// clear and barriers of the final gemm). A register clear directly after
/// a zero-initializing allocation of the same tile is dead as well.
pub fn remove_redundancy(ir: &mut Ir) {
    remove_dead_tail(ir);
    remove_clear_after_zero_alloc(ir);
}

fn remove_dead_tail(ir: &mut Ir) {
    let last_store = ir
        .program
        .iter()
        .rposition(|&id| matches!(ir.instrs[id.index()], Instruction::StoreRegToGlb(_)));
    if let Some(position) = last_store {
        ir.program.truncate(position + 1);
    }
}

fn remove_clear_after_zero_alloc(ir: &mut Ir) {
    let mut position = 1;
    while position < ir.program.len() {
        let dead = match (
            ir.instr(ir.program[position - 1]),
            ir.instr(ir.program[position]),
        ) {
            (Instruction::RegisterAlloc(alloc), Instruction::ClearRegisters(clear)) => {
                alloc.dest == clear.src && alloc.init_value == Some(0.0)
            }
            _ => false,
        };
        if dead {
            ir.program.remove(position);
        } else {
            position += 1;
        }
    }
}
