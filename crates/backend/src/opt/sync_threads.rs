//! Synchronization minimization.

use crate::instructions::{Instruction, SyncThreads};
use crate::ir::Ir;
use crate::symbol::SymbolKind;

use super::mem_region::{region_of, Region};

/// Replace the conservative builder barriers with the minimal set.
///
/// All existing barriers are dropped. A barrier is inserted before any gemm
/// consuming a pending shared-memory write (read-after-write), and before
/// any write into a region that was read since the last barrier
/// (write-after-read).
pub fn minimize_syncs(ir: &mut Ir, regions: &[Region], num_threads: usize) {
    remove_all_syncs(ir);
    insert_sync_before_use(ir, num_threads);
    insert_sync_after_use(ir, regions, num_threads);
}

fn remove_all_syncs(ir: &mut Ir) {
    let program = std::mem::take(&mut ir.program);
    ir.program = program
        .into_iter()
        .filter(|&id| !matches!(ir.instrs[id.index()], Instruction::SyncThreads(_)))
        .collect();
}

fn insert_sync_before_use(ir: &mut Ir, num_threads: usize) {
    let mut pending_writes = Vec::new();
    let mut selected = Vec::new();
    for (position, &id) in ir.program.iter().enumerate() {
        let instr = ir.instr(id);
        if let Some(dest) = instr.shr_mem_write_dest() {
            pending_writes.push(dest);
        }
        if let Instruction::Gemm(gemm) = instr {
            if pending_writes.contains(&gemm.op1) || pending_writes.contains(&gemm.op2) {
                selected.push(position);
                pending_writes.clear();
            }
        }
    }
    insert_syncs_at(ir, &selected, num_threads);
}

fn insert_sync_after_use(ir: &mut Ir, regions: &[Region], num_threads: usize) {
    let mut read_since_sync = vec![false; regions.len()];
    let mut selected = Vec::new();
    for (position, &id) in ir.program.iter().enumerate() {
        match ir.instr(id) {
            Instruction::Gemm(gemm) => {
                for operand in [gemm.op1, gemm.op2] {
                    if ir.symbols[operand].kind == SymbolKind::SharedMem {
                        if let Some(region) = region_of(regions, operand) {
                            read_since_sync[region] = true;
                        }
                    }
                }
            }
            Instruction::SyncThreads(_) => {
                read_since_sync.iter_mut().for_each(|flag| *flag = false);
            }
            instr => {
                if let Some(dest) = instr.shr_mem_write_dest() {
                    if region_of(regions, dest)
                        .is_some_and(|region| read_since_sync[region])
                    {
                        selected.push(position);
                        read_since_sync.iter_mut().for_each(|flag| *flag = false);
                    }
                }
            }
        }
    }
    insert_syncs_at(ir, &selected, num_threads);
}

fn insert_syncs_at(ir: &mut Ir, positions: &[usize], num_threads: usize) {
    for &position in positions.iter().rev() {
        let sync = ir.push_instr(Instruction::SyncThreads(SyncThreads { num_threads }));
        ir.program.insert(position, sync);
    }
}
