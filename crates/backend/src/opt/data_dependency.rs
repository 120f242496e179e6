//! Write-after-read collapse of the final store.

use chainforge_common::{Result, Scalar};

use crate::instructions::store::LoadGlbToReg;
use crate::instructions::Instruction;
use crate::ir::Ir;

/// Remove the read-modify-write of the final global store.
///
/// When `C = alpha * A x B + beta * C` closes a fused chain with a numeric
/// `beta != 0`, the store rereads `C` while the registers sit idle after
/// the preceding clear. The rewrite sets the store's `beta` to zero and
/// replaces that clear with a preload of `beta * C` into the accumulator,
/// so the product lands on top of the scaled previous result.
pub fn collapse_war(ir: &mut Ir, num_threads: usize) -> Result<()> {
    let mut store_position = None;
    let mut clear_position = None;
    for position in (0..ir.program.len()).rev() {
        match ir.instr(ir.program[position]) {
            Instruction::StoreRegToGlb(_) => store_position = Some(position),
            Instruction::ClearRegisters(_) => {
                clear_position = Some(position);
                break;
            }
            _ => {}
        }
    }
    let (Some(store_position), Some(clear_position)) = (store_position, clear_position) else {
        return Ok(());
    };
    if store_position < clear_position {
        return Ok(());
    }

    let (store_dest, store_beta, glb_view, reg_view) = {
        let Instruction::StoreRegToGlb(store) = ir.instr(ir.program[store_position]) else {
            return Ok(());
        };
        (
            store.dest,
            store.beta.clone(),
            store.dest_view().clone(),
            store.src_view().clone(),
        )
    };
    match store_beta.literal() {
        Some(value) if value != 0.0 => {}
        _ => return Ok(()),
    }

    let clear_src = {
        let Instruction::ClearRegisters(clear) = ir.instr(ir.program[clear_position]) else {
            return Ok(());
        };
        clear.src
    };

    if let Instruction::StoreRegToGlb(store) = ir.instr_mut(ir.program[store_position]) {
        store.beta = Scalar::Literal(0.0);
    }
    let preload = LoadGlbToReg::build(
        ir,
        store_dest,
        clear_src,
        store_beta,
        num_threads,
        glb_view,
        reg_view,
    )?;
    ir.program[clear_position] = preload;
    Ok(())
}
